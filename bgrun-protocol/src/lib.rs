//! bgrun-protocol: shared wire definitions for the bgrun control socket
//!
//! This crate defines the framed message layout spoken between the bgrun
//! supervisor and its control clients over a Unix socket, plus the JSON
//! value types carried by status, screen and export messages.

pub mod codec;
pub mod messages;
pub mod types;

// Re-export main types at crate root
pub use codec::{CodecError, Frame, FrameCodec, MAX_FRAME_SIZE};
pub use messages::{stream, tag, ClientMessage, ProtocolError, ServerMessage, WaitStatus, WaitType};
pub use types::{ExportFormat, ExportRequest, ExportResult, ScreenSnapshot, StatusReport};
