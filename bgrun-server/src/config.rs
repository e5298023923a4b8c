//! Supervisor configuration

use std::path::PathBuf;

use bgrun_utils::{BgrunError, Result};

/// How the child's stdin is materialized
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdinMode {
    /// /dev/null
    Null,
    /// Read from a file
    File(PathBuf),
    /// Streamed from control clients via STDIN frames
    Stream,
}

impl StdinMode {
    /// Parse a flag value: "null", "stream", or a file path
    pub fn parse(value: &str) -> Self {
        match value {
            "null" => Self::Null,
            "stream" => Self::Stream,
            path => Self::File(PathBuf::from(path)),
        }
    }
}

/// How the child's stdout or stderr is materialized
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputMode {
    /// /dev/null
    Null,
    /// Append to a file
    File(PathBuf),
    /// Append to output.log and fan out to attached clients
    Log,
}

impl OutputMode {
    /// Parse a flag value: "null", "log", or a file path
    pub fn parse(value: &str) -> Self {
        match value {
            "null" => Self::Null,
            "log" => Self::Log,
            path => Self::File(PathBuf::from(path)),
        }
    }
}

/// Supervisor configuration, immutable after construction
#[derive(Debug, Clone)]
pub struct Config {
    /// Child argv
    pub command: Vec<String>,
    pub stdin: StdinMode,
    pub stdout: OutputMode,
    pub stderr: OutputMode,
    /// Run the child on a pseudo-terminal; overrides the stdio modes
    pub use_vty: bool,
    /// Override the runtime directory (defaults to the per-PID location)
    pub runtime_dir: Option<PathBuf>,
}

impl Config {
    /// Configuration with the default stdio modes (stdin null, stdout and
    /// stderr to the fan-out log)
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            stdin: StdinMode::Null,
            stdout: OutputMode::Log,
            stderr: OutputMode::Log,
            use_vty: false,
            runtime_dir: None,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.command.is_empty() {
            return Err(BgrunError::config("command is required"));
        }
        Ok(())
    }

    /// Whether any stream routes through the fan-out log
    pub(crate) fn needs_log(&self) -> bool {
        self.use_vty || self.stdout == OutputMode::Log || self.stderr == OutputMode::Log
    }
}
