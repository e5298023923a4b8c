//! Message taxonomy for the control protocol
//!
//! Typed views over [`Frame`](crate::codec::Frame): each variant knows its
//! tag and its payload encoding. Payload-shape validation (length and
//! enum-range checks on fixed fields) happens here on decode; range checks
//! that depend on supervisor state (stream masks, terminal dimensions)
//! happen in the dispatcher.

use crate::codec::Frame;
use crate::types::{ExportRequest, ExportResult, ScreenSnapshot, StatusReport};

/// Message type tags
pub mod tag {
    // Client -> server
    pub const STATUS: u8 = 0x01;
    pub const STDIN: u8 = 0x02;
    pub const SIGNAL: u8 = 0x03;
    pub const RESIZE: u8 = 0x04;
    pub const ATTACH: u8 = 0x05;
    pub const DETACH: u8 = 0x06;
    pub const CLOSE_STDIN: u8 = 0x07;
    pub const WAIT: u8 = 0x08;
    pub const GET_SCREEN: u8 = 0x09;
    pub const EXPORT: u8 = 0x0A;
    pub const SHUTDOWN: u8 = 0x10;

    // Server -> client
    pub const STATUS_RESPONSE: u8 = 0x80;
    pub const OUTPUT: u8 = 0x81;
    pub const SIGNAL_RESPONSE: u8 = 0x82;
    pub const RESIZE_RESPONSE: u8 = 0x83;
    pub const WAIT_RESPONSE: u8 = 0x88;
    pub const SCREEN_RESPONSE: u8 = 0x89;
    pub const EXPORT_RESPONSE: u8 = 0x8A;
    pub const ERROR: u8 = 0x8F;
    pub const PROCESS_EXIT: u8 = 0x90;
}

/// Stream identifiers for output fan-out
pub mod stream {
    pub const STDOUT: u8 = 0x01;
    pub const STDERR: u8 = 0x02;
    pub const BOTH: u8 = 0x03;
}

/// Protocol-level decode error
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("unknown message type: 0x{0:02X}")]
    UnknownType(u8),

    #[error("invalid {what} payload length: {len}")]
    InvalidPayload { what: &'static str, len: usize },

    #[error("unknown wait type: 0x{0:02X}")]
    UnknownWaitType(u8),

    #[error("unknown wait status: 0x{0:02X}")]
    UnknownWaitStatus(u8),

    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Condition a WAIT request waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitType {
    Exit,
    Foreground,
}

impl WaitType {
    pub fn from_byte(b: u8) -> Result<Self, ProtocolError> {
        match b {
            0x00 => Ok(Self::Exit),
            0x01 => Ok(Self::Foreground),
            other => Err(ProtocolError::UnknownWaitType(other)),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::Exit => 0x00,
            Self::Foreground => 0x01,
        }
    }
}

/// Outcome of a WAIT request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    Completed,
    Timeout,
    NotApplicable,
}

impl WaitStatus {
    pub fn from_byte(b: u8) -> Result<Self, ProtocolError> {
        match b {
            0x00 => Ok(Self::Completed),
            0x01 => Ok(Self::Timeout),
            0x02 => Ok(Self::NotApplicable),
            other => Err(ProtocolError::UnknownWaitStatus(other)),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::Completed => 0x00,
            Self::Timeout => 0x01,
            Self::NotApplicable => 0x02,
        }
    }
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Status,
    Stdin(Vec<u8>),
    Signal(u8),
    Resize { rows: u16, cols: u16 },
    Attach { streams: u8 },
    Detach,
    CloseStdin,
    Wait { timeout_secs: u32, wait_type: WaitType },
    GetScreen,
    Export(ExportRequest),
    Shutdown,
}

impl ClientMessage {
    pub fn to_frame(&self) -> Result<Frame, ProtocolError> {
        Ok(match self {
            Self::Status => Frame::empty(tag::STATUS),
            Self::Stdin(data) => Frame::new(tag::STDIN, data.clone()),
            Self::Signal(signum) => Frame::new(tag::SIGNAL, vec![*signum]),
            Self::Resize { rows, cols } => {
                let mut payload = Vec::with_capacity(4);
                payload.extend_from_slice(&rows.to_be_bytes());
                payload.extend_from_slice(&cols.to_be_bytes());
                Frame::new(tag::RESIZE, payload)
            }
            Self::Attach { streams } => Frame::new(tag::ATTACH, vec![*streams]),
            Self::Detach => Frame::empty(tag::DETACH),
            Self::CloseStdin => Frame::empty(tag::CLOSE_STDIN),
            Self::Wait {
                timeout_secs,
                wait_type,
            } => {
                let mut payload = Vec::with_capacity(5);
                payload.extend_from_slice(&timeout_secs.to_be_bytes());
                payload.push(wait_type.as_byte());
                Frame::new(tag::WAIT, payload)
            }
            Self::GetScreen => Frame::empty(tag::GET_SCREEN),
            Self::Export(req) => Frame::new(tag::EXPORT, serde_json::to_vec(req)?),
            Self::Shutdown => Frame::empty(tag::SHUTDOWN),
        })
    }

    pub fn from_frame(frame: &Frame) -> Result<Self, ProtocolError> {
        let payload = &frame.payload;
        match frame.tag {
            tag::STATUS => Ok(Self::Status),
            tag::STDIN => Ok(Self::Stdin(payload.clone())),
            tag::SIGNAL => {
                if payload.len() != 1 {
                    return Err(ProtocolError::InvalidPayload {
                        what: "signal",
                        len: payload.len(),
                    });
                }
                Ok(Self::Signal(payload[0]))
            }
            tag::RESIZE => {
                if payload.len() != 4 {
                    return Err(ProtocolError::InvalidPayload {
                        what: "resize",
                        len: payload.len(),
                    });
                }
                Ok(Self::Resize {
                    rows: u16::from_be_bytes([payload[0], payload[1]]),
                    cols: u16::from_be_bytes([payload[2], payload[3]]),
                })
            }
            tag::ATTACH => {
                if payload.len() != 1 {
                    return Err(ProtocolError::InvalidPayload {
                        what: "attach",
                        len: payload.len(),
                    });
                }
                Ok(Self::Attach {
                    streams: payload[0],
                })
            }
            tag::DETACH => Ok(Self::Detach),
            tag::CLOSE_STDIN => Ok(Self::CloseStdin),
            tag::WAIT => {
                if payload.len() != 5 {
                    return Err(ProtocolError::InvalidPayload {
                        what: "wait",
                        len: payload.len(),
                    });
                }
                Ok(Self::Wait {
                    timeout_secs: u32::from_be_bytes([
                        payload[0], payload[1], payload[2], payload[3],
                    ]),
                    wait_type: WaitType::from_byte(payload[4])?,
                })
            }
            tag::GET_SCREEN => Ok(Self::GetScreen),
            tag::EXPORT => Ok(Self::Export(serde_json::from_slice(payload)?)),
            tag::SHUTDOWN => Ok(Self::Shutdown),
            other => Err(ProtocolError::UnknownType(other)),
        }
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Status(StatusReport),
    Output { stream: u8, data: Vec<u8> },
    SignalOk,
    ResizeOk,
    WaitResult(WaitStatus),
    Screen(ScreenSnapshot),
    Export(ExportResult),
    Error(String),
    ProcessExit(i32),
}

impl ServerMessage {
    pub fn to_frame(&self) -> Result<Frame, ProtocolError> {
        Ok(match self {
            Self::Status(status) => Frame::new(tag::STATUS_RESPONSE, serde_json::to_vec(status)?),
            Self::Output { stream, data } => {
                let mut payload = Vec::with_capacity(1 + data.len());
                payload.push(*stream);
                payload.extend_from_slice(data);
                Frame::new(tag::OUTPUT, payload)
            }
            Self::SignalOk => Frame::empty(tag::SIGNAL_RESPONSE),
            Self::ResizeOk => Frame::empty(tag::RESIZE_RESPONSE),
            Self::WaitResult(status) => Frame::new(tag::WAIT_RESPONSE, vec![status.as_byte()]),
            Self::Screen(snap) => Frame::new(tag::SCREEN_RESPONSE, serde_json::to_vec(snap)?),
            Self::Export(result) => Frame::new(tag::EXPORT_RESPONSE, serde_json::to_vec(result)?),
            Self::Error(message) => Frame::new(tag::ERROR, message.as_bytes().to_vec()),
            Self::ProcessExit(code) => Frame::new(tag::PROCESS_EXIT, code.to_be_bytes().to_vec()),
        })
    }

    pub fn from_frame(frame: &Frame) -> Result<Self, ProtocolError> {
        let payload = &frame.payload;
        match frame.tag {
            tag::STATUS_RESPONSE => Ok(Self::Status(serde_json::from_slice(payload)?)),
            tag::OUTPUT => {
                if payload.is_empty() {
                    return Err(ProtocolError::InvalidPayload {
                        what: "output",
                        len: 0,
                    });
                }
                Ok(Self::Output {
                    stream: payload[0],
                    data: payload[1..].to_vec(),
                })
            }
            tag::SIGNAL_RESPONSE => Ok(Self::SignalOk),
            tag::RESIZE_RESPONSE => Ok(Self::ResizeOk),
            tag::WAIT_RESPONSE => {
                if payload.len() != 1 {
                    return Err(ProtocolError::InvalidPayload {
                        what: "wait response",
                        len: payload.len(),
                    });
                }
                Ok(Self::WaitResult(WaitStatus::from_byte(payload[0])?))
            }
            tag::SCREEN_RESPONSE => Ok(Self::Screen(serde_json::from_slice(payload)?)),
            tag::EXPORT_RESPONSE => Ok(Self::Export(serde_json::from_slice(payload)?)),
            tag::ERROR => Ok(Self::Error(
                String::from_utf8_lossy(payload).into_owned(),
            )),
            tag::PROCESS_EXIT => {
                if payload.len() != 4 {
                    return Err(ProtocolError::InvalidPayload {
                        what: "process exit",
                        len: payload.len(),
                    });
                }
                Ok(Self::ProcessExit(i32::from_be_bytes([
                    payload[0], payload[1], payload[2], payload[3],
                ])))
            }
            other => Err(ProtocolError::UnknownType(other)),
        }
    }
}
