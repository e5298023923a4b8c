//! VTY adapter: the child's pseudo-terminal
//!
//! When VTY mode is on, all stdio mode choices are overridden: the child
//! gets the slave side of a PTY as its controlling terminal, master-side
//! reads feed the log file, the terminal emulator and client fan-out
//! under the stdout stream id, and STDIN frames write to the master.

use std::io::{Read, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use bgrun_protocol::stream;
use bgrun_termemu::Terminal;
use bgrun_utils::{BgrunError, Result};

use crate::registry::ClientRegistry;
use crate::stdio::{write_log, SharedLog};

fn pty_size(rows: u16, cols: u16) -> PtySize {
    PtySize {
        rows,
        cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

/// Handle to the PTY master and the child running on its slave side
pub(crate) struct VtyHandle {
    master: Mutex<Option<Box<dyn MasterPty + Send>>>,
    writer: Mutex<Option<Box<dyn Write + Send>>>,
    child: Mutex<Box<dyn Child + Send + Sync>>,
}

impl VtyHandle {
    /// Spawn the command on a fresh PTY of the given size.
    ///
    /// Returns the handle, the child PID, and the master-side reader for
    /// the output pump.
    pub(crate) fn spawn(
        command: &[String],
        rows: u16,
        cols: u16,
    ) -> Result<(Self, i32, Box<dyn Read + Send>)> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(pty_size(rows, cols))
            .map_err(|e| BgrunError::pty(format!("failed to open PTY: {}", e)))?;

        let mut cmd = CommandBuilder::new(&command[0]);
        cmd.args(&command[1..]);

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| BgrunError::ProcessSpawn(e.to_string()))?;
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| BgrunError::pty(format!("failed to clone reader: {}", e)))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| BgrunError::pty(format!("failed to take writer: {}", e)))?;

        let pid = child
            .process_id()
            .ok_or_else(|| BgrunError::internal("child PID unavailable"))? as i32;

        Ok((
            Self {
                master: Mutex::new(Some(pair.master)),
                writer: Mutex::new(Some(writer)),
                child: Mutex::new(child),
            },
            pid,
            reader,
        ))
    }

    /// Write client input to the master side
    pub(crate) fn write_all(&self, data: &[u8]) -> Result<()> {
        match self.writer.lock().as_mut() {
            Some(writer) => writer
                .write_all(data)
                .map_err(|e| BgrunError::pty(format!("write failed: {}", e))),
            None => Err(BgrunError::pty("VTY is closed")),
        }
    }

    pub(crate) fn resize(&self, rows: u16, cols: u16) -> Result<()> {
        match self.master.lock().as_ref() {
            Some(master) => master
                .resize(pty_size(rows, cols))
                .map_err(|e| BgrunError::pty(format!("resize failed: {}", e))),
            None => Err(BgrunError::pty("VTY is closed")),
        }
    }

    /// The PTY's current foreground process group, if retrievable
    pub(crate) fn foreground_pgrp(&self) -> Option<i32> {
        self.master
            .lock()
            .as_ref()
            .and_then(|master| master.process_group_leader())
    }

    /// Block until the child exits; -1 when the wait itself fails
    pub(crate) fn wait_child(&self) -> i32 {
        match self.child.lock().wait() {
            Ok(status) => status.exit_code() as i32,
            Err(_) => -1,
        }
    }

    /// Release the master side; pending reads unblock with an error
    pub(crate) fn close(&self) {
        self.writer.lock().take();
        self.master.lock().take();
    }
}

/// Output pump for the PTY master.
///
/// Master reads are blocking, so a dedicated blocking task feeds chunks
/// over a channel; the async side updates the emulator, appends to the
/// log and fans out to clients.
pub(crate) fn spawn_vty_reader(
    reader: Box<dyn Read + Send>,
    terminal: Arc<Terminal>,
    log: Arc<SharedLog>,
    registry: Arc<ClientRegistry>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(16);

        tokio::task::spawn_blocking(move || {
            let mut reader = reader;
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.blocking_send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        // The master returns EIO once the slave side closes
                        debug!("PTY read ended: {}", e);
                        break;
                    }
                }
            }
        });

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                chunk = rx.recv() => match chunk {
                    Some(data) => {
                        terminal.feed(&data);
                        write_log(&log, &data);
                        registry.broadcast_output(stream::STDOUT, &data).await;
                    }
                    None => break,
                }
            }
        }
    })
}
