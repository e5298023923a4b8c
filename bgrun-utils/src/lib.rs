//! bgrun-utils: shared plumbing for the bgrun crates
//!
//! Error type, logging setup and runtime-directory path resolution.

pub mod error;
pub mod logging;
pub mod paths;

pub use error::{BgrunError, Result};
pub use logging::{init_logging, init_logging_with_filter};
pub use paths::{find_runtime_dir, log_path, runtime_base, runtime_dir, socket_path, status_path};
