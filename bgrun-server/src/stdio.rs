//! Child I/O adapter for pipe mode
//!
//! Materializes the child's stdio per the configured modes and runs the
//! reader loops that append piped output to the log file and fan it out
//! to attached clients.

use std::fs::File;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::process::Stdio;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::AsyncReadExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use bgrun_utils::{BgrunError, Result};

use crate::config::{Config, OutputMode, StdinMode};
use crate::registry::ClientRegistry;

/// The append handle to output.log, shared by the reader tasks; taken on
/// supervisor stop.
pub(crate) type SharedLog = Mutex<Option<File>>;

pub(crate) fn write_log(log: &SharedLog, data: &[u8]) {
    if let Some(file) = log.lock().as_mut() {
        if let Err(e) = file.write_all(data) {
            warn!("error appending to output log: {}", e);
        }
    }
}

/// Open the fan-out log append-only, owner-only
pub(crate) fn open_log(path: &std::path::Path) -> Result<File> {
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o600)
        .open(path)
        .map_err(|e| BgrunError::startup(format!("failed to open log file: {}", e)))
}

/// Configure the child's stdio per the adapter modes
pub(crate) fn configure_stdio(cmd: &mut std::process::Command, config: &Config) -> Result<()> {
    match &config.stdin {
        StdinMode::Null => {
            cmd.stdin(Stdio::null());
        }
        StdinMode::File(path) => {
            let file = File::open(path)
                .map_err(|e| BgrunError::startup(format!("failed to open stdin file: {}", e)))?;
            cmd.stdin(Stdio::from(file));
        }
        StdinMode::Stream => {
            cmd.stdin(Stdio::piped());
        }
    }

    cmd.stdout(output_stdio(&config.stdout, "stdout")?);
    cmd.stderr(output_stdio(&config.stderr, "stderr")?);
    Ok(())
}

fn output_stdio(mode: &OutputMode, name: &str) -> Result<Stdio> {
    Ok(match mode {
        OutputMode::Null => Stdio::null(),
        OutputMode::File(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .mode(0o600)
                .open(path)
                .map_err(|e| {
                    BgrunError::startup(format!("failed to open {} file: {}", name, e))
                })?;
            Stdio::from(file)
        }
        OutputMode::Log => Stdio::piped(),
    })
}

/// Reader loop for one child pipe: append to the log, fan out to clients.
/// EOF is the normal termination path; other read errors are logged.
pub(crate) fn spawn_pipe_reader<R>(
    mut reader: R,
    stream_id: u8,
    log: Arc<SharedLog>,
    registry: Arc<ClientRegistry>,
    shutdown: CancellationToken,
) -> JoinHandle<()>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                res = reader.read(&mut buf) => match res {
                    Ok(0) => break,
                    Ok(n) => {
                        write_log(&log, &buf[..n]);
                        registry.broadcast_output(stream_id, &buf[..n]).await;
                    }
                    Err(e) => {
                        warn!("error reading child output: {}", e);
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_log_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.log");
        let log = SharedLog::new(Some(open_log(&path).unwrap()));

        write_log(&log, b"one ");
        write_log(&log, b"two");

        assert_eq!(std::fs::read(&path).unwrap(), b"one two");
    }

    #[test]
    fn test_write_log_noop_when_closed() {
        let log = SharedLog::new(None);
        write_log(&log, b"dropped");
    }

    #[test]
    fn test_open_log_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.log");
        let _file = open_log(&path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_pipe_reader_drains_to_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.log");
        let log = Arc::new(SharedLog::new(Some(open_log(&path).unwrap())));
        let registry = Arc::new(ClientRegistry::new());

        let (mut tx, rx) = tokio::io::duplex(64);
        tokio::io::AsyncWriteExt::write_all(&mut tx, b"hello\n")
            .await
            .unwrap();
        drop(tx);

        let handle = spawn_pipe_reader(
            rx,
            bgrun_protocol::stream::STDOUT,
            log,
            registry,
            CancellationToken::new(),
        );
        handle.await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"hello\n");
    }
}
