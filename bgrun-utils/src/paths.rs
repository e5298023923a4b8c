//! Path utilities for bgrun
//!
//! Resolves the per-supervisor runtime directory:
//! `$XDG_RUNTIME_DIR/bgrun/<pid>` when XDG_RUNTIME_DIR is set, otherwise
//! `/tmp/.bgrun-<uid>/<pid>`.

use std::path::{Path, PathBuf};

/// Application identifier used in runtime paths
const APP_NAME: &str = "bgrun";

/// Get the runtime base directory (without the per-PID component)
///
/// Location: `$XDG_RUNTIME_DIR/bgrun` or `/tmp/.bgrun-$UID`
pub fn runtime_base() -> PathBuf {
    if let Ok(xdg_runtime) = std::env::var("XDG_RUNTIME_DIR") {
        if !xdg_runtime.is_empty() {
            return PathBuf::from(xdg_runtime).join(APP_NAME);
        }
    }

    // Fallback to /tmp with UID for security
    // SAFETY: getuid() is always safe to call
    let uid = unsafe { libc::getuid() };
    PathBuf::from(format!("/tmp/.{}-{}", APP_NAME, uid))
}

/// Get the runtime directory for a supervisor PID
pub fn runtime_dir(pid: i32) -> PathBuf {
    runtime_base().join(pid.to_string())
}

/// Find an existing runtime directory for a supervisor PID
///
/// Tries the XDG location first (when XDG_RUNTIME_DIR is set), then the
/// /tmp fallback; returns None when neither directory exists.
pub fn find_runtime_dir(pid: i32) -> Option<PathBuf> {
    if let Ok(xdg_runtime) = std::env::var("XDG_RUNTIME_DIR") {
        if !xdg_runtime.is_empty() {
            let dir = PathBuf::from(xdg_runtime)
                .join(APP_NAME)
                .join(pid.to_string());
            if dir.is_dir() {
                return Some(dir);
            }
        }
    }

    // SAFETY: getuid() is always safe to call
    let uid = unsafe { libc::getuid() };
    let dir = PathBuf::from(format!("/tmp/.{}-{}", APP_NAME, uid)).join(pid.to_string());
    if dir.is_dir() {
        return Some(dir);
    }

    None
}

/// Control socket path inside a runtime directory
pub fn socket_path(runtime_dir: &Path) -> PathBuf {
    runtime_dir.join("control.sock")
}

/// Output log path inside a runtime directory
pub fn log_path(runtime_dir: &Path) -> PathBuf {
    runtime_dir.join("output.log")
}

/// Tombstone path inside a runtime directory
pub fn status_path(runtime_dir: &Path) -> PathBuf {
    runtime_dir.join("status.json")
}
