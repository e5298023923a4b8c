//! Client session registry and output fan-out
//!
//! The supervisor owns session records by id; each session serializes its
//! own socket writes behind a per-session lock, so broadcast writes,
//! reply writes and the process-exit write never interleave on the wire.

use std::collections::HashMap;
use std::sync::Arc;

use futures::SinkExt;
use parking_lot::{Mutex, RwLock};
use tokio::net::unix::OwnedWriteHalf;
use tokio_util::codec::FramedWrite;
use tracing::warn;
use uuid::Uuid;

use bgrun_protocol::{Frame, FrameCodec, ServerMessage};
use bgrun_utils::{BgrunError, Result};

#[derive(Default)]
struct AttachState {
    attached: bool,
    streams: u8,
}

/// One accepted control connection
pub(crate) struct ClientSession {
    id: Uuid,
    writer: tokio::sync::Mutex<FramedWrite<OwnedWriteHalf, FrameCodec>>,
    attach: Mutex<AttachState>,
}

impl ClientSession {
    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn set_attached(&self, streams: u8) {
        let mut state = self.attach.lock();
        state.attached = true;
        state.streams = streams;
    }

    pub(crate) fn set_detached(&self) {
        self.attach.lock().attached = false;
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.attach.lock().attached
    }

    pub(crate) fn wants_stream(&self, stream: u8) -> bool {
        let state = self.attach.lock();
        state.attached && state.streams & stream != 0
    }

    /// Write a typed message under the session write lock
    pub(crate) async fn send(&self, msg: &ServerMessage) -> Result<()> {
        let frame = msg
            .to_frame()
            .map_err(|e| BgrunError::protocol(e.to_string()))?;
        self.send_frame(frame).await
    }

    /// Write a raw frame under the session write lock
    pub(crate) async fn send_frame(&self, frame: Frame) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer
            .send(frame)
            .await
            .map_err(|e| BgrunError::connection(e.to_string()))
    }
}

/// All live control connections, keyed by session id
pub(crate) struct ClientRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<ClientSession>>>,
}

impl ClientRegistry {
    pub(crate) fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn register(
        &self,
        writer: FramedWrite<OwnedWriteHalf, FrameCodec>,
    ) -> Arc<ClientSession> {
        let session = Arc::new(ClientSession {
            id: Uuid::new_v4(),
            writer: tokio::sync::Mutex::new(writer),
            attach: Mutex::new(AttachState::default()),
        });
        self.sessions.write().insert(session.id, session.clone());
        session
    }

    pub(crate) fn remove(&self, id: Uuid) {
        self.sessions.write().remove(&id);
    }

    pub(crate) fn len(&self) -> usize {
        self.sessions.read().len()
    }

    fn snapshot(&self) -> Vec<Arc<ClientSession>> {
        self.sessions.read().values().cloned().collect()
    }

    /// Fan out child output to every attached session selecting this
    /// stream; one client's write failure never affects the others.
    pub(crate) async fn broadcast_output(&self, stream: u8, data: &[u8]) {
        for session in self.snapshot() {
            if !session.wants_stream(stream) {
                continue;
            }
            let msg = ServerMessage::Output {
                stream,
                data: data.to_vec(),
            };
            if let Err(e) = session.send(&msg).await {
                warn!(client = %session.id(), "error writing output to client: {}", e);
            }
        }
    }

    /// Deliver the process-exit event to every attached session
    pub(crate) async fn broadcast_exit(&self, exit_code: i32) {
        for session in self.snapshot() {
            if !session.is_attached() {
                continue;
            }
            if let Err(e) = session.send(&ServerMessage::ProcessExit(exit_code)).await {
                warn!(client = %session.id(), "error broadcasting exit to client: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bgrun_protocol::{stream, tag};
    use futures::StreamExt;
    use tokio::net::UnixStream;
    use tokio_util::codec::FramedRead;

    async fn session_pair(
        registry: &ClientRegistry,
    ) -> (
        Arc<ClientSession>,
        FramedRead<tokio::net::unix::OwnedReadHalf, FrameCodec>,
    ) {
        let (server_side, client_side) = UnixStream::pair().unwrap();
        let (_, write_half) = server_side.into_split();
        let (read_half, _client_write) = client_side.into_split();
        // Leak the unused client write half so the pair stays open
        std::mem::forget(_client_write);

        let session = registry.register(FramedWrite::new(write_half, FrameCodec::new()));
        (session, FramedRead::new(read_half, FrameCodec::new()))
    }

    #[tokio::test]
    async fn test_attach_detach_mask() {
        let registry = ClientRegistry::new();
        let (session, _reader) = session_pair(&registry).await;

        assert!(!session.wants_stream(stream::STDOUT));

        session.set_attached(stream::STDOUT);
        assert!(session.wants_stream(stream::STDOUT));
        assert!(!session.wants_stream(stream::STDERR));

        session.set_attached(stream::BOTH);
        assert!(session.wants_stream(stream::STDERR));

        session.set_detached();
        assert!(!session.wants_stream(stream::STDOUT));
    }

    #[tokio::test]
    async fn test_broadcast_respects_stream_mask() {
        let registry = ClientRegistry::new();
        let (stdout_session, mut stdout_reader) = session_pair(&registry).await;
        let (stderr_session, mut stderr_reader) = session_pair(&registry).await;

        stdout_session.set_attached(stream::STDOUT);
        stderr_session.set_attached(stream::STDERR);

        registry.broadcast_output(stream::STDOUT, b"out").await;
        registry.broadcast_output(stream::STDERR, b"err").await;

        let frame = stdout_reader.next().await.unwrap().unwrap();
        assert_eq!(frame.tag, tag::OUTPUT);
        assert_eq!(frame.payload, b"\x01out");

        let frame = stderr_reader.next().await.unwrap().unwrap();
        assert_eq!(frame.payload, b"\x02err");
    }

    #[tokio::test]
    async fn test_broadcast_exit_only_to_attached() {
        let registry = ClientRegistry::new();
        let (attached, mut attached_reader) = session_pair(&registry).await;
        let (_detached, mut detached_reader) = session_pair(&registry).await;

        attached.set_attached(stream::BOTH);
        registry.broadcast_exit(0).await;

        let frame = attached_reader.next().await.unwrap().unwrap();
        assert_eq!(frame.tag, tag::PROCESS_EXIT);
        assert_eq!(frame.payload, vec![0, 0, 0, 0]);

        // The detached session got nothing
        let pending = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            detached_reader.next(),
        )
        .await;
        assert!(pending.is_err());
    }

    #[tokio::test]
    async fn test_register_and_remove() {
        let registry = ClientRegistry::new();
        let (session, _reader) = session_pair(&registry).await;
        assert_eq!(registry.len(), 1);
        registry.remove(session.id());
        assert_eq!(registry.len(), 0);
    }
}
