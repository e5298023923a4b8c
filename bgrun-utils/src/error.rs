//! Error types for bgrun
//!
//! Provides a unified error type used across all bgrun crates.

use std::path::PathBuf;

/// Main error type for bgrun operations
#[derive(Debug, thiserror::Error)]
pub enum BgrunError {
    // === IO Errors ===

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    // === Connection Errors ===

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("connection closed unexpectedly")]
    ConnectionClosed,

    #[error("process {pid} not found (no control socket or status.json in {dir})")]
    ProcessNotFound { pid: i32, dir: PathBuf },

    // === Protocol Errors ===

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("unsupported message type: 0x{0:02X}")]
    UnsupportedMessage(u8),

    #[error("unexpected response type: 0x{0:02X}")]
    UnexpectedResponse(u8),

    #[error("server error: {0}")]
    Server(String),

    // === Supervisor Errors ===

    #[error("stdin is not available for streaming")]
    StdinUnavailable,

    #[error("VTY is not enabled")]
    VtyNotEnabled,

    #[error("process is not running")]
    ProcessNotRunning,

    #[error("process has terminated")]
    ProcessTerminated,

    #[error("failed to spawn process: {0}")]
    ProcessSpawn(String),

    #[error("PTY error: {0}")]
    Pty(String),

    #[error("startup failure: {0}")]
    Startup(String),

    // === Configuration / Internal ===

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl BgrunError {
    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create an invalid-payload error
    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self::InvalidPayload(msg.into())
    }

    /// Create a PTY error
    pub fn pty(msg: impl Into<String>) -> Self {
        Self::Pty(msg.into())
    }

    /// Create a startup error
    pub fn startup(msg: impl Into<String>) -> Self {
        Self::Startup(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error is fatal to a control connection
    ///
    /// Only framing-level failures tear a connection down; everything else
    /// is reported as an ERROR frame and the connection continues.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, Self::Io(_) | Self::ConnectionClosed)
    }
}

/// Result type alias using BgrunError
pub type Result<T> = std::result::Result<T, BgrunError>;
