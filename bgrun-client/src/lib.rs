//! bgrun-client: control-protocol client with tombstone awareness
//!
//! A [`Client`] is constructed from a supervisor PID. While the
//! supervisor is alive it speaks the framed protocol over the control
//! socket; after the child has exited it reads the tombstone
//! (`status.json` plus the retained `output.log` handle) left in the
//! runtime directory.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use futures::{SinkExt, StreamExt};
use tokio::net::UnixStream;
use tokio_util::codec::Framed;
use tracing::debug;

use bgrun_protocol::{
    tag, ClientMessage, ExportRequest, ExportResult, Frame, FrameCodec, ScreenSnapshot,
    ServerMessage, StatusReport, WaitStatus, WaitType,
};
use bgrun_utils::{paths, BgrunError, Result};

enum Mode {
    Live {
        transport: Framed<UnixStream, FrameCodec>,
    },
    Tombstone {
        status: StatusReport,
        // Held open so the inode survives runtime-directory removal
        output_log: Option<File>,
    },
}

/// Client connection to a bgrun supervisor
pub struct Client {
    pid: i32,
    runtime_dir: PathBuf,
    mode: Mode,
}

impl Client {
    /// Connect to the supervisor for `pid`.
    ///
    /// Enters live mode when the control socket exists, tombstone mode
    /// when only `status.json` remains, and fails otherwise.
    pub async fn new(pid: i32) -> Result<Self> {
        let runtime_dir = paths::find_runtime_dir(pid).ok_or(BgrunError::ProcessNotFound {
            pid,
            dir: paths::runtime_dir(pid),
        })?;
        Self::open_runtime_dir(pid, runtime_dir).await
    }

    /// Connect through an explicit runtime directory.
    ///
    /// Useful for tests and embedders that manage directory placement
    /// themselves; [`Client::new`] resolves the directory from the PID.
    pub async fn open_runtime_dir(pid: i32, runtime_dir: impl Into<PathBuf>) -> Result<Self> {
        let runtime_dir = runtime_dir.into();
        let socket_path = paths::socket_path(&runtime_dir);
        let status_path = paths::status_path(&runtime_dir);

        if socket_path.exists() {
            let socket = UnixStream::connect(&socket_path)
                .await
                .map_err(|e| BgrunError::connection(format!("failed to connect: {}", e)))?;
            debug!(pid, "connected to live supervisor");
            return Ok(Self {
                pid,
                runtime_dir,
                mode: Mode::Live {
                    transport: Framed::new(socket, FrameCodec::new()),
                },
            });
        }

        if status_path.exists() {
            let status = read_tombstone(&status_path)?;
            let log_path = paths::log_path(&runtime_dir);
            let output_log = if log_path.exists() {
                Some(File::open(&log_path).map_err(|e| BgrunError::FileRead {
                    path: log_path,
                    source: e,
                })?)
            } else {
                None
            };
            debug!(pid, "supervisor has terminated, using tombstone");
            return Ok(Self {
                pid,
                runtime_dir,
                mode: Mode::Tombstone { status, output_log },
            });
        }

        Err(BgrunError::ProcessNotFound {
            pid,
            dir: runtime_dir,
        })
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    pub fn runtime_dir(&self) -> &Path {
        &self.runtime_dir
    }

    /// Whether the supervisor was still accepting connections at
    /// construction time
    pub fn is_live(&self) -> bool {
        matches!(self.mode, Mode::Live { .. })
    }

    /// Send a request and await the typed response, discarding any
    /// OUTPUT or PROCESS_EXIT events racing ahead of it.
    async fn request(&mut self, msg: ClientMessage, expect: u8) -> Result<Frame> {
        let transport = self.live_transport()?;
        let frame = msg
            .to_frame()
            .map_err(|e| BgrunError::protocol(e.to_string()))?;
        transport
            .send(frame)
            .await
            .map_err(|e| BgrunError::connection(e.to_string()))?;

        loop {
            let frame = match transport.next().await {
                None => return Err(BgrunError::ConnectionClosed),
                Some(Err(e)) => return Err(BgrunError::protocol(e.to_string())),
                Some(Ok(frame)) => frame,
            };

            match frame.tag {
                tag::ERROR => {
                    return Err(BgrunError::Server(
                        String::from_utf8_lossy(&frame.payload).into_owned(),
                    ))
                }
                tag::OUTPUT | tag::PROCESS_EXIT => continue,
                t if t == expect => return Ok(frame),
                t => return Err(BgrunError::UnexpectedResponse(t)),
            }
        }
    }

    /// Send a request that has no reply frame
    async fn send_only(&mut self, msg: ClientMessage) -> Result<()> {
        let transport = self.live_transport()?;
        let frame = msg
            .to_frame()
            .map_err(|e| BgrunError::protocol(e.to_string()))?;
        transport
            .send(frame)
            .await
            .map_err(|e| BgrunError::connection(e.to_string()))
    }

    fn live_transport(&mut self) -> Result<&mut Framed<UnixStream, FrameCodec>> {
        match &mut self.mode {
            Mode::Live { transport } => Ok(transport),
            Mode::Tombstone { .. } => Err(BgrunError::ProcessTerminated),
        }
    }

    /// Current process status (cached in tombstone mode)
    pub async fn status(&mut self) -> Result<StatusReport> {
        if let Mode::Tombstone { status, .. } = &self.mode {
            return Ok(status.clone());
        }

        let frame = self
            .request(ClientMessage::Status, tag::STATUS_RESPONSE)
            .await?;
        serde_json::from_slice(&frame.payload)
            .map_err(|e| BgrunError::protocol(format!("failed to parse status: {}", e)))
    }

    /// Stream bytes into the child's stdin
    pub async fn write_stdin(&mut self, data: &[u8]) -> Result<()> {
        self.send_only(ClientMessage::Stdin(data.to_vec())).await
    }

    /// Close the child's stdin; awaits and discards the server ack
    pub async fn close_stdin(&mut self) -> Result<()> {
        self.request(ClientMessage::CloseStdin, tag::STATUS_RESPONSE)
            .await?;
        Ok(())
    }

    /// Send a raw signal number to the child
    pub async fn signal(&mut self, signum: u8) -> Result<()> {
        self.request(ClientMessage::Signal(signum), tag::SIGNAL_RESPONSE)
            .await?;
        Ok(())
    }

    /// Resize the PTY (VTY mode only)
    pub async fn resize(&mut self, rows: u16, cols: u16) -> Result<()> {
        self.request(ClientMessage::Resize { rows, cols }, tag::RESIZE_RESPONSE)
            .await?;
        Ok(())
    }

    /// Start receiving OUTPUT frames for the selected streams
    pub async fn attach(&mut self, streams: u8) -> Result<()> {
        self.send_only(ClientMessage::Attach { streams }).await
    }

    /// Stop receiving OUTPUT frames
    pub async fn detach(&mut self) -> Result<()> {
        self.send_only(ClientMessage::Detach).await
    }

    /// Wait for a lifecycle condition.
    ///
    /// In tombstone mode an exit wait completes immediately and reaps the
    /// runtime directory; the retained log handle keeps
    /// [`read_output`](Self::read_output) working afterwards.
    pub async fn wait(&mut self, wait_type: WaitType, timeout_secs: u32) -> Result<WaitStatus> {
        if let Mode::Tombstone { .. } = &self.mode {
            return match wait_type {
                WaitType::Exit => {
                    if let Err(e) = std::fs::remove_dir_all(&self.runtime_dir) {
                        if e.kind() != std::io::ErrorKind::NotFound {
                            return Err(BgrunError::internal(format!(
                                "failed to reap runtime directory: {}",
                                e
                            )));
                        }
                    }
                    Ok(WaitStatus::Completed)
                }
                WaitType::Foreground => Ok(WaitStatus::NotApplicable),
            };
        }

        let frame = self
            .request(
                ClientMessage::Wait {
                    timeout_secs,
                    wait_type,
                },
                tag::WAIT_RESPONSE,
            )
            .await?;
        if frame.payload.len() != 1 {
            return Err(BgrunError::protocol("invalid wait response payload"));
        }
        WaitStatus::from_byte(frame.payload[0]).map_err(|e| BgrunError::protocol(e.to_string()))
    }

    /// Fetch the rendered terminal screen (VTY mode only)
    pub async fn get_screen(&mut self) -> Result<ScreenSnapshot> {
        let frame = self
            .request(ClientMessage::GetScreen, tag::SCREEN_RESPONSE)
            .await?;
        serde_json::from_slice(&frame.payload)
            .map_err(|e| BgrunError::protocol(format!("failed to parse screen: {}", e)))
    }

    /// Export terminal content (VTY mode only)
    pub async fn export(&mut self, req: ExportRequest) -> Result<ExportResult> {
        let frame = self
            .request(ClientMessage::Export(req), tag::EXPORT_RESPONSE)
            .await?;
        serde_json::from_slice(&frame.payload)
            .map_err(|e| BgrunError::protocol(format!("failed to parse export: {}", e)))
    }

    /// Ask the supervisor to stop; tolerates the connection closing
    /// before the ack arrives
    pub async fn shutdown(&mut self) -> Result<()> {
        self.send_only(ClientMessage::Shutdown).await?;
        let transport = self.live_transport()?;
        // Drain until the ack or EOF; either means the shutdown landed
        loop {
            match transport.next().await {
                None | Some(Err(_)) => return Ok(()),
                Some(Ok(frame)) if frame.tag == tag::STATUS_RESPONSE => return Ok(()),
                Some(Ok(frame)) if frame.tag == tag::ERROR => {
                    return Err(BgrunError::Server(
                        String::from_utf8_lossy(&frame.payload).into_owned(),
                    ))
                }
                Some(Ok(_)) => continue,
            }
        }
    }

    /// Read events after [`attach`](Self::attach): output chunks are
    /// passed to `on_output`, and the loop returns once PROCESS_EXIT
    /// arrives (passed to `on_exit`) or the connection closes.
    pub async fn read_events<F, G>(&mut self, mut on_output: F, mut on_exit: G) -> Result<()>
    where
        F: FnMut(u8, &[u8]) -> Result<()>,
        G: FnMut(i32),
    {
        let transport = self.live_transport()?;
        loop {
            let frame = match transport.next().await {
                None => return Ok(()),
                Some(Err(e)) => return Err(BgrunError::protocol(e.to_string())),
                Some(Ok(frame)) => frame,
            };

            match ServerMessage::from_frame(&frame) {
                Ok(ServerMessage::Output { stream, data }) => on_output(stream, &data)?,
                Ok(ServerMessage::ProcessExit(code)) => {
                    on_exit(code);
                    return Ok(());
                }
                Ok(ServerMessage::Error(message)) => return Err(BgrunError::Server(message)),
                Ok(_) | Err(_) => continue,
            }
        }
    }

    /// Full captured output of a terminated process (tombstone mode only)
    pub fn read_output(&mut self) -> Result<Vec<u8>> {
        match &mut self.mode {
            Mode::Live { .. } => Err(BgrunError::internal(
                "read_output is only available after the process has terminated",
            )),
            Mode::Tombstone { output_log, .. } => match output_log {
                None => Ok(Vec::new()),
                Some(file) => {
                    file.seek(SeekFrom::Start(0))?;
                    let mut data = Vec::new();
                    file.read_to_end(&mut data)?;
                    Ok(data)
                }
            },
        }
    }
}

fn read_tombstone(path: &Path) -> Result<StatusReport> {
    let data = std::fs::read(path).map_err(|e| BgrunError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_slice(&data)
        .map_err(|e| BgrunError::protocol(format!("failed to parse status.json: {}", e)))
}
