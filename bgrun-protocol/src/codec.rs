//! Frame codec for control-socket IPC
//!
//! Every message on the wire is a 4-byte big-endian length N, a 1-byte
//! type tag, and N-1 bytes of payload. The codec carries no semantics:
//! payload bytes pass through unmodified.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Maximum frame size (10 MB), counting the tag byte
pub const MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Frame codec error
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid frame length: {0}")]
    InvalidLength(u32),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },
}

/// A raw frame: type tag plus opaque payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub tag: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(tag: u8, payload: Vec<u8>) -> Self {
        Self { tag, payload }
    }

    /// A frame with an empty payload (tag-only messages)
    pub fn empty(tag: u8) -> Self {
        Self {
            tag,
            payload: Vec::new(),
        }
    }
}

/// Codec used by both sides of the control socket
pub struct FrameCodec;

impl FrameCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, CodecError> {
        // Need at least 4 bytes for the length prefix
        if src.len() < 4 {
            return Ok(None);
        }

        // Peek at length without consuming
        let declared = u32::from_be_bytes([src[0], src[1], src[2], src[3]]);
        if declared < 1 {
            return Err(CodecError::InvalidLength(declared));
        }

        let len = declared as usize;
        if len > MAX_FRAME_SIZE {
            return Err(CodecError::FrameTooLarge {
                size: len,
                max: MAX_FRAME_SIZE,
            });
        }

        // Wait for the full frame
        if src.len() < 4 + len {
            src.reserve(4 + len - src.len());
            return Ok(None);
        }

        src.advance(4);
        let tag = src.get_u8();
        let payload = src.split_to(len - 1).to_vec();

        Ok(Some(Frame { tag, payload }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), CodecError> {
        let len = 1 + item.payload.len();
        if len > MAX_FRAME_SIZE {
            return Err(CodecError::FrameTooLarge {
                size: len,
                max: MAX_FRAME_SIZE,
            });
        }

        dst.reserve(4 + len);
        dst.put_u32(len as u32);
        dst.put_u8(item.tag);
        dst.put_slice(&item.payload);
        Ok(())
    }
}
