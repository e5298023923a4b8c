//! Supervisor core: child lifecycle, state record, waits and tombstone
//!
//! The state record sits behind a reader/writer lock: the reap watcher is
//! the only writer after spawn, status snapshots and broadcast iteration
//! take it shared and copy what they need.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use bgrun_protocol::{
    stream, ExportFormat, ExportRequest, ExportResult, ScreenSnapshot, StatusReport, WaitStatus,
    WaitType,
};
use bgrun_termemu::{ExportOptions, Terminal};
use bgrun_utils::{paths, BgrunError, Result};

use crate::config::{Config, StdinMode};
use crate::endpoint;
use crate::pty::{self, VtyHandle};
use crate::registry::ClientRegistry;
use crate::stdio::{self, SharedLog};

/// Initial VTY dimensions
const VTY_ROWS: u16 = 24;
const VTY_COLS: u16 = 80;

/// Largest terminal dimension accepted by RESIZE
const MAX_TERM_DIM: u16 = 500;

/// Poll interval for WAIT conditions
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long the reap watcher waits for the output readers to hit EOF
/// before publishing the exit
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Mutable process state, guarded by the supervisor lock
struct ProcState {
    pid: i32,
    running: bool,
    exit_code: Option<i32>,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    stdin_closed: bool,
}

/// The blocking child wait, run by the reap watcher
enum ChildWaiter {
    Pipe(tokio::process::Child),
    Vty(Arc<VtyHandle>),
}

impl ChildWaiter {
    async fn wait(self) -> i32 {
        match self {
            Self::Pipe(mut child) => match child.wait().await {
                Ok(status) => status.code().unwrap_or(-1),
                Err(e) => {
                    warn!("error waiting for child: {}", e);
                    -1
                }
            },
            Self::Vty(vty) => tokio::task::spawn_blocking(move || vty.wait_child())
                .await
                .unwrap_or(-1),
        }
    }
}

/// A per-process supervisor bound to one runtime directory
pub struct Supervisor {
    config: Config,
    runtime_dir: PathBuf,
    socket_path: PathBuf,
    state: RwLock<ProcState>,
    pub(crate) registry: Arc<ClientRegistry>,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    log_file: Arc<SharedLog>,
    vty: Option<Arc<VtyHandle>>,
    terminal: Option<Arc<Terminal>>,
    pub(crate) shutdown: CancellationToken,
    done: CancellationToken,
    stopped: AtomicBool,
}

impl Supervisor {
    /// Create the runtime directory, spawn the child in its own process
    /// group, start the output readers, the reap watcher and the control
    /// endpoint.
    pub async fn start(config: Config) -> Result<Arc<Self>> {
        config.validate()?;

        let runtime_dir = config
            .runtime_dir
            .clone()
            .unwrap_or_else(|| paths::runtime_dir(std::process::id() as i32));
        create_runtime_dir(&runtime_dir)?;

        let socket_path = paths::socket_path(&runtime_dir);
        let log_file = Arc::new(SharedLog::new(if config.needs_log() {
            Some(stdio::open_log(&paths::log_path(&runtime_dir))?)
        } else {
            None
        }));

        let registry = Arc::new(ClientRegistry::new());
        let shutdown = CancellationToken::new();
        let started_at = Utc::now();

        let mut reader_handles: Vec<JoinHandle<()>> = Vec::new();
        let pid;
        let waiter;
        let mut vty = None;
        let mut terminal = None;
        let mut stdin_sink = None;

        if config.use_vty {
            let (handle, child_pid, reader) =
                VtyHandle::spawn(&config.command, VTY_ROWS, VTY_COLS)?;
            let handle = Arc::new(handle);
            let term = Arc::new(Terminal::new(VTY_ROWS as usize, VTY_COLS as usize));

            reader_handles.push(pty::spawn_vty_reader(
                reader,
                term.clone(),
                log_file.clone(),
                registry.clone(),
                shutdown.clone(),
            ));

            pid = child_pid;
            waiter = ChildWaiter::Vty(handle.clone());
            vty = Some(handle);
            terminal = Some(term);
        } else {
            let mut cmd = std::process::Command::new(&config.command[0]);
            cmd.args(&config.command[1..]);
            {
                use std::os::unix::process::CommandExt;
                cmd.process_group(0);
            }
            stdio::configure_stdio(&mut cmd, &config)?;

            let mut child = tokio::process::Command::from(cmd)
                .spawn()
                .map_err(|e| BgrunError::ProcessSpawn(e.to_string()))?;

            pid = child
                .id()
                .ok_or_else(|| BgrunError::internal("child PID unavailable"))?
                as i32;

            if config.stdin == StdinMode::Stream {
                stdin_sink = child.stdin.take();
            }
            if let Some(stdout) = child.stdout.take() {
                reader_handles.push(stdio::spawn_pipe_reader(
                    stdout,
                    stream::STDOUT,
                    log_file.clone(),
                    registry.clone(),
                    shutdown.clone(),
                ));
            }
            if let Some(stderr) = child.stderr.take() {
                reader_handles.push(stdio::spawn_pipe_reader(
                    stderr,
                    stream::STDERR,
                    log_file.clone(),
                    registry.clone(),
                    shutdown.clone(),
                ));
            }

            waiter = ChildWaiter::Pipe(child);
        }

        info!(pid, command = ?config.command, vty = config.use_vty, "started process");

        let supervisor = Arc::new(Self {
            config,
            runtime_dir,
            socket_path,
            state: RwLock::new(ProcState {
                pid,
                running: true,
                exit_code: None,
                started_at,
                ended_at: None,
                stdin_closed: false,
            }),
            registry,
            stdin: tokio::sync::Mutex::new(stdin_sink),
            log_file,
            vty,
            terminal,
            shutdown,
            done: CancellationToken::new(),
            stopped: AtomicBool::new(false),
        });

        spawn_reap_watcher(supervisor.clone(), waiter, reader_handles);

        if let Err(e) = endpoint::start(&supervisor) {
            supervisor.stop().await;
            return Err(e);
        }

        Ok(supervisor)
    }

    pub fn runtime_dir(&self) -> &Path {
        &self.runtime_dir
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Resolves once the child has been reaped
    pub async fn done(&self) {
        self.done.cancelled().await;
    }

    /// Consistent snapshot of the process state
    pub async fn status(&self) -> StatusReport {
        let state = self.state.read().await;
        StatusReport {
            pid: state.pid,
            running: state.running,
            exit_code: state.exit_code,
            started_at: rfc3339(state.started_at),
            ended_at: state.ended_at.map(rfc3339),
            command: self.config.command.clone(),
            has_vty: self.config.use_vty,
        }
    }

    /// Stream client bytes into the child's stdin (or the PTY master)
    pub async fn write_stdin(&self, data: &[u8]) -> Result<()> {
        if let Some(vty) = &self.vty {
            return vty.write_all(data);
        }

        let mut sink = self.stdin.lock().await;
        match sink.as_mut() {
            Some(handle) => handle
                .write_all(data)
                .await
                .map_err(|e| BgrunError::internal(format!("failed to write to stdin: {}", e))),
            None => Err(BgrunError::StdinUnavailable),
        }
    }

    /// Close the streamed stdin sink exactly once
    pub async fn close_stdin(&self) -> Result<()> {
        if self.state.read().await.stdin_closed {
            return Err(BgrunError::StdinUnavailable);
        }

        let mut sink = self.stdin.lock().await;
        match sink.take() {
            Some(handle) => {
                drop(handle);
                self.state.write().await.stdin_closed = true;
                info!("stdin closed by client");
                Ok(())
            }
            None => Err(BgrunError::StdinUnavailable),
        }
    }

    /// Forward a raw signal number to the child PID
    pub async fn send_signal(&self, signum: u8) -> Result<()> {
        let (pid, running) = {
            let state = self.state.read().await;
            (state.pid, state.running)
        };
        if !running {
            return Err(BgrunError::ProcessNotRunning);
        }

        // SAFETY: kill is always safe to call with a valid pid and signal number
        let rc = unsafe { libc::kill(pid, signum as libc::c_int) };
        if rc != 0 {
            return Err(BgrunError::internal(format!(
                "failed to send signal: {}",
                std::io::Error::last_os_error()
            )));
        }
        Ok(())
    }

    /// Resize the PTY and the emulator, then nudge the foreground process
    /// group with SIGWINCH
    pub async fn resize(&self, rows: u16, cols: u16) -> Result<()> {
        if rows == 0 || cols == 0 || rows > MAX_TERM_DIM || cols > MAX_TERM_DIM {
            return Err(BgrunError::invalid_payload(format!(
                "invalid terminal size: {}x{}",
                rows, cols
            )));
        }
        let vty = self.vty.as_ref().ok_or(BgrunError::VtyNotEnabled)?;
        vty.resize(rows, cols)?;

        if let Some(terminal) = &self.terminal {
            terminal.resize(rows as usize, cols as usize);
        }

        if self.state.read().await.running {
            if let Some(pgrp) = vty.foreground_pgrp() {
                if pgrp > 0 {
                    if let Err(e) = killpg(Pid::from_raw(pgrp), Signal::SIGWINCH) {
                        warn!("failed to send SIGWINCH to pgrp {}: {}", pgrp, e);
                    }
                }
            }
        }

        info!(rows, cols, "PTY resized");
        Ok(())
    }

    /// Block until the requested condition holds, the timeout elapses or
    /// the supervisor shuts down
    pub async fn wait_for(&self, timeout_secs: u32, wait_type: WaitType) -> WaitStatus {
        match wait_type {
            WaitType::Exit => self.wait_for_exit(timeout_secs).await,
            WaitType::Foreground => match &self.vty {
                Some(vty) => self.wait_for_foreground(vty, timeout_secs).await,
                None => WaitStatus::NotApplicable,
            },
        }
    }

    async fn wait_for_exit(&self, timeout_secs: u32) -> WaitStatus {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout_secs as u64);
        loop {
            if !self.state.read().await.running {
                return WaitStatus::Completed;
            }
            if timeout_secs == 0 || tokio::time::Instant::now() >= deadline {
                return WaitStatus::Timeout;
            }
            tokio::select! {
                _ = self.shutdown.cancelled() => return WaitStatus::Completed,
                _ = self.done.cancelled() => return WaitStatus::Completed,
                _ = tokio::time::sleep(WAIT_POLL_INTERVAL) => {}
            }
        }
    }

    async fn wait_for_foreground(&self, vty: &Arc<VtyHandle>, timeout_secs: u32) -> WaitStatus {
        let target = self.state.read().await.pid;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout_secs as u64);
        loop {
            if vty.foreground_pgrp() == Some(target) {
                return WaitStatus::Completed;
            }
            if timeout_secs == 0 || tokio::time::Instant::now() >= deadline {
                return WaitStatus::Timeout;
            }
            tokio::select! {
                _ = self.shutdown.cancelled() => return WaitStatus::Completed,
                _ = tokio::time::sleep(WAIT_POLL_INTERVAL) => {}
            }
        }
    }

    /// Rendered viewport for GET_SCREEN
    pub fn screen_snapshot(&self) -> Result<ScreenSnapshot> {
        let terminal = self.terminal.as_ref().ok_or(BgrunError::VtyNotEnabled)?;
        let snap = terminal.snapshot();
        Ok(ScreenSnapshot {
            rows: snap.rows,
            cols: snap.cols,
            cursor_row: snap.cursor_row,
            cursor_col: snap.cursor_col,
            lines: snap.lines,
        })
    }

    /// Export terminal content for EXPORT
    pub fn export(&self, req: &ExportRequest) -> Result<ExportResult> {
        let terminal = self.terminal.as_ref().ok_or(BgrunError::VtyNotEnabled)?;

        let format = match req.format {
            ExportFormat::Text => bgrun_termemu::ExportFormat::Text,
            ExportFormat::Markdown => bgrun_termemu::ExportFormat::Markdown,
            ExportFormat::Html => bgrun_termemu::ExportFormat::Html,
        };
        let content = terminal.export(&ExportOptions {
            format,
            include_scrollback: req.include_scrollback,
            start_line: req.start_line,
            end_line: req.end_line,
            preserve_trailing_spaces: req.preserve_trailing_spaces,
        });

        Ok(ExportResult {
            format: req.format,
            content,
        })
    }

    /// Stop the supervisor: close the endpoint, client connections, the
    /// stdin sink, the log file and the PTY master. The child is not
    /// signaled.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("supervisor stopping");

        self.shutdown.cancel();
        self.stdin.lock().await.take();
        self.log_file.lock().take();
        if let Some(vty) = &self.vty {
            vty.close();
        }
        let _ = std::fs::remove_file(&self.socket_path);
    }

    /// Write the tombstone atomically into the runtime directory
    async fn write_tombstone(&self) -> Result<()> {
        let status = self.status().await;
        let data = serde_json::to_vec_pretty(&status)
            .map_err(|e| BgrunError::internal(format!("failed to encode status: {}", e)))?;

        let path = paths::status_path(&self.runtime_dir);
        let tmp = self.runtime_dir.join("status.json.tmp");
        std::fs::write(&tmp, &data).map_err(|e| BgrunError::FileWrite {
            path: tmp.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp, &path).map_err(|e| BgrunError::FileWrite { path, source: e })?;
        Ok(())
    }
}

fn rfc3339(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn create_runtime_dir(dir: &Path) -> Result<()> {
    use std::os::unix::fs::{DirBuilderExt, PermissionsExt};

    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true).mode(0o700);
    builder
        .create(dir)
        .map_err(|e| BgrunError::startup(format!("failed to create runtime directory: {}", e)))?;

    // Recursive create leaves pre-existing directories untouched
    std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| BgrunError::startup(format!("failed to set runtime directory mode: {}", e)))?;
    Ok(())
}

/// Wait for the child, drain the output readers so every OUTPUT frame
/// precedes PROCESS_EXIT, publish the final state and the tombstone, and
/// unlink the socket so further connects fail.
fn spawn_reap_watcher(
    supervisor: Arc<Supervisor>,
    waiter: ChildWaiter,
    reader_handles: Vec<JoinHandle<()>>,
) {
    tokio::spawn(async move {
        let exit_code = waiter.wait().await;

        // A grandchild holding the conduit open must not stall the reap
        let drain = async {
            for handle in reader_handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(READER_DRAIN_TIMEOUT, drain).await.is_err() {
            warn!("output readers still open after child exit");
        }

        {
            let mut state = supervisor.state.write().await;
            state.running = false;
            state.exit_code = Some(exit_code);
            state.ended_at = Some(Utc::now());
            info!(pid = state.pid, exit_code, "process exited");
        }

        supervisor.registry.broadcast_exit(exit_code).await;

        let _ = std::fs::remove_file(&supervisor.socket_path);

        if let Err(e) = supervisor.write_tombstone().await {
            warn!("failed to write final status: {}", e);
        }

        supervisor.done.cancel();
    });
}
