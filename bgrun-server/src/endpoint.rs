//! Control endpoint: Unix socket listener and per-connection dispatcher
//!
//! One frame at a time per connection: handler errors come back as ERROR
//! frames and the connection continues; only framing errors, peer close
//! and SHUTDOWN tear a connection down.

use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;

use futures::StreamExt;
use tokio::net::{UnixListener, UnixStream};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

use bgrun_protocol::{stream, tag, ClientMessage, Frame, FrameCodec, ProtocolError, ServerMessage};
use bgrun_utils::{BgrunError, Result};

use crate::registry::ClientSession;
use crate::supervisor::Supervisor;

const STDIN_CLOSED_ACK: &[u8] = br#"{"status":"stdin closed"}"#;
const SHUTTING_DOWN_ACK: &[u8] = br#"{"status":"shutting down"}"#;

/// Bind the control socket (owner-only) and start the accept loop
pub(crate) fn start(supervisor: &Arc<Supervisor>) -> Result<()> {
    let socket_path = supervisor.socket_path().to_path_buf();
    let _ = std::fs::remove_file(&socket_path);

    let listener = UnixListener::bind(&socket_path)
        .map_err(|e| BgrunError::startup(format!("failed to create socket listener: {}", e)))?;
    std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| BgrunError::startup(format!("failed to set socket permissions: {}", e)))?;

    info!("control socket listening on {}", socket_path.display());

    tokio::spawn(accept_loop(supervisor.clone(), listener));
    Ok(())
}

async fn accept_loop(supervisor: Arc<Supervisor>, listener: UnixListener) {
    loop {
        tokio::select! {
            _ = supervisor.shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    tokio::spawn(handle_connection(supervisor.clone(), stream));
                }
                Err(e) => {
                    warn!("accept error: {}", e);
                }
            }
        }
    }
}

enum Flow {
    Continue,
    Shutdown,
}

async fn handle_connection(supervisor: Arc<Supervisor>, stream: UnixStream) {
    let (read_half, write_half) = stream.into_split();
    let mut reader = FramedRead::new(read_half, FrameCodec::new());
    let session = supervisor
        .registry
        .register(FramedWrite::new(write_half, FrameCodec::new()));
    let session_id = session.id();
    debug!(client = %session_id, "client connected");

    loop {
        let next = tokio::select! {
            _ = supervisor.shutdown.cancelled() => break,
            next = reader.next() => next,
        };

        let frame = match next {
            None => break,
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                // Framing errors are fatal to the connection
                warn!(client = %session_id, "framing error: {}", e);
                break;
            }
        };

        match dispatch(&supervisor, &session, frame).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Shutdown) => {
                let stopping = supervisor.clone();
                tokio::spawn(async move { stopping.stop().await });
                break;
            }
            Err(e) => {
                warn!(client = %session_id, "error handling message: {}", e);
                if session
                    .send(&ServerMessage::Error(e.to_string()))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        }
    }

    supervisor.registry.remove(session_id);
    debug!(client = %session_id, "client disconnected");
}

async fn dispatch(
    supervisor: &Arc<Supervisor>,
    session: &Arc<ClientSession>,
    frame: Frame,
) -> Result<Flow> {
    let msg = match ClientMessage::from_frame(&frame) {
        Ok(msg) => msg,
        Err(ProtocolError::UnknownType(t)) => return Err(BgrunError::UnsupportedMessage(t)),
        Err(e) => return Err(BgrunError::invalid_payload(e.to_string())),
    };

    match msg {
        ClientMessage::Status => {
            let status = supervisor.status().await;
            session.send(&ServerMessage::Status(status)).await?;
        }
        ClientMessage::Stdin(data) => {
            supervisor.write_stdin(&data).await?;
        }
        ClientMessage::Signal(signum) => {
            supervisor.send_signal(signum).await?;
            session.send(&ServerMessage::SignalOk).await?;
        }
        ClientMessage::Resize { rows, cols } => {
            supervisor.resize(rows, cols).await?;
            session.send(&ServerMessage::ResizeOk).await?;
        }
        ClientMessage::Attach { streams } => {
            if streams == 0 || streams > stream::BOTH {
                return Err(BgrunError::invalid_payload(format!(
                    "invalid stream selector: 0x{:02X}",
                    streams
                )));
            }
            session.set_attached(streams);
            debug!(client = %session.id(), streams, "client attached");
        }
        ClientMessage::Detach => {
            session.set_detached();
            debug!(client = %session.id(), "client detached");
        }
        ClientMessage::CloseStdin => {
            supervisor.close_stdin().await?;
            session
                .send_frame(Frame::new(tag::STATUS_RESPONSE, STDIN_CLOSED_ACK.to_vec()))
                .await?;
        }
        ClientMessage::Wait {
            timeout_secs,
            wait_type,
        } => {
            let status = supervisor.wait_for(timeout_secs, wait_type).await;
            session.send(&ServerMessage::WaitResult(status)).await?;
        }
        ClientMessage::GetScreen => {
            let snap = supervisor.screen_snapshot()?;
            session.send(&ServerMessage::Screen(snap)).await?;
        }
        ClientMessage::Export(req) => {
            let result = supervisor.export(&req)?;
            session.send(&ServerMessage::Export(result)).await?;
        }
        ClientMessage::Shutdown => {
            info!("shutdown requested by client");
            let _ = session
                .send_frame(Frame::new(tag::STATUS_RESPONSE, SHUTTING_DOWN_ACK.to_vec()))
                .await;
            return Ok(Flow::Shutdown);
        }
    }

    Ok(Flow::Continue)
}
