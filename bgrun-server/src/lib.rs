//! bgrun-server: the per-process supervisor runtime
//!
//! One supervisor per runtime directory: spawns a single child command,
//! routes its stdio (pipes or a PTY), serves the framed control protocol
//! on a Unix socket, fans output out to attached clients, and publishes a
//! tombstone (`status.json` plus `output.log`) when the child exits.

mod config;
mod endpoint;
mod pty;
mod registry;
mod stdio;
mod supervisor;

pub use config::{Config, OutputMode, StdinMode};
pub use supervisor::Supervisor;
