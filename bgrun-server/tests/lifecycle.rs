//! End-to-end supervisor tests with real child processes

use std::time::Duration;

use tempfile::TempDir;
use tokio::time::timeout;

use bgrun_client::Client;
use bgrun_protocol::{stream, ExportFormat, ExportRequest, WaitStatus, WaitType};
use bgrun_server::{Config, OutputMode, StdinMode, Supervisor};

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

struct TestRun {
    _dir: TempDir,
    runtime_dir: std::path::PathBuf,
    supervisor: std::sync::Arc<Supervisor>,
}

async fn start(mut config: Config) -> TestRun {
    let dir = TempDir::new().unwrap();
    let runtime_dir = dir.path().join("rt");
    config.runtime_dir = Some(runtime_dir.clone());

    let supervisor = Supervisor::start(config).await.unwrap();
    TestRun {
        _dir: dir,
        runtime_dir,
        supervisor,
    }
}

fn sh(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

async fn connect(run: &TestRun) -> Client {
    Client::open_runtime_dir(0, &run.runtime_dir).await.unwrap()
}

/// Attach and force a round-trip so the server has processed the attach
/// before the caller lets the child produce output.
async fn attach_synced(client: &mut Client, streams: u8) {
    client.attach(streams).await.unwrap();
    client.status().await.unwrap();
}

#[tokio::test]
async fn test_true_exits_zero_and_leaves_tombstone() {
    let mut config = Config::new(vec!["true".to_string()]);
    config.stdout = OutputMode::Null;
    config.stderr = OutputMode::Null;
    let run = start(config).await;

    timeout(TEST_TIMEOUT, run.supervisor.done()).await.unwrap();

    let status = run.supervisor.status().await;
    assert!(!status.running);
    assert_eq!(status.exit_code, Some(0));
    assert_eq!(status.command, vec!["true"]);
    assert!(!status.has_vty);
    assert!(status.ended_at.is_some());

    // The socket is gone, the tombstone is present
    assert!(!run.runtime_dir.join("control.sock").exists());
    assert!(run.runtime_dir.join("status.json").exists());

    run.supervisor.stop().await;
}

#[tokio::test]
async fn test_exit_code_propagates() {
    let run = start(Config::new(sh("exit 42"))).await;
    timeout(TEST_TIMEOUT, run.supervisor.done()).await.unwrap();

    let status = run.supervisor.status().await;
    assert_eq!(status.exit_code, Some(42));
    run.supervisor.stop().await;
}

#[tokio::test]
async fn test_status_over_socket_while_running() {
    let run = start(Config::new(sh("sleep 5"))).await;
    let mut client = connect(&run).await;
    assert!(client.is_live());

    let status = timeout(TEST_TIMEOUT, client.status()).await.unwrap().unwrap();
    assert!(status.running);
    assert!(status.exit_code.is_none());
    assert!(status.pid > 0);

    run.supervisor.stop().await;
}

#[tokio::test]
async fn test_log_fanout_stdout_and_stderr() {
    let config = Config::new(sh("sleep 0.3; echo hello; echo world >&2"));
    let run = start(config).await;

    let mut client = connect(&run).await;
    attach_synced(&mut client, stream::BOTH).await;

    let mut stdout_bytes = Vec::new();
    let mut stderr_bytes = Vec::new();
    let mut exit_code = None;

    timeout(
        TEST_TIMEOUT,
        client.read_events(
            |stream_id, data| {
                if stream_id == stream::STDERR {
                    stderr_bytes.extend_from_slice(data);
                } else {
                    stdout_bytes.extend_from_slice(data);
                }
                Ok(())
            },
            |code| exit_code = Some(code),
        ),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(stdout_bytes, b"hello\n");
    assert_eq!(stderr_bytes, b"world\n");
    assert_eq!(exit_code, Some(0));

    // Both streams landed in the shared log
    let log = std::fs::read_to_string(run.runtime_dir.join("output.log")).unwrap();
    assert!(log.contains("hello"));
    assert!(log.contains("world"));

    run.supervisor.stop().await;
}

#[tokio::test]
async fn test_stdin_stream_roundtrip() {
    let mut config = Config::new(vec!["cat".to_string()]);
    config.stdin = StdinMode::Stream;
    config.stderr = OutputMode::Null;
    let run = start(config).await;

    let mut watcher = connect(&run).await;
    attach_synced(&mut watcher, stream::STDOUT).await;

    let mut writer = connect(&run).await;
    writer.write_stdin(b"abc\n").await.unwrap();
    writer.close_stdin().await.unwrap();

    // Closing stdin twice is an error
    let second_close = writer.close_stdin().await;
    assert!(second_close.is_err());

    let mut output = Vec::new();
    let mut exit_code = None;
    timeout(
        TEST_TIMEOUT,
        watcher.read_events(
            |_, data| {
                output.extend_from_slice(data);
                Ok(())
            },
            |code| exit_code = Some(code),
        ),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(output, b"abc\n");
    assert_eq!(exit_code, Some(0));
    run.supervisor.stop().await;
}

#[tokio::test]
async fn test_stdin_unavailable_when_not_streamed() {
    let run = start(Config::new(sh("sleep 5"))).await;
    let mut client = connect(&run).await;

    // STDIN frames carry no reply, so the error surfaces on the next
    // request
    client.write_stdin(b"x").await.unwrap();
    let err = timeout(TEST_TIMEOUT, client.close_stdin())
        .await
        .unwrap()
        .unwrap_err();
    assert!(err.to_string().contains("stdin is not available"));

    run.supervisor.stop().await;
}

#[tokio::test]
async fn test_multi_client_fanout() {
    let run = start(Config::new(sh("sleep 0.5; echo L"))).await;

    let mut first = connect(&run).await;
    let mut second = connect(&run).await;
    attach_synced(&mut first, stream::STDOUT).await;
    attach_synced(&mut second, stream::STDOUT).await;

    for client in [&mut first, &mut second] {
        let mut bytes = Vec::new();
        let mut streams_seen = Vec::new();
        timeout(
            TEST_TIMEOUT,
            client.read_events(
                |stream_id, data| {
                    streams_seen.push(stream_id);
                    bytes.extend_from_slice(data);
                    Ok(())
                },
                |_| {},
            ),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(bytes, b"L\n");
        assert!(streams_seen.iter().all(|&s| s == stream::STDOUT));
    }

    run.supervisor.stop().await;
}

#[tokio::test]
async fn test_signal_terminates_child() {
    let mut config = Config::new(sh("sleep 60"));
    config.stdout = OutputMode::Null;
    config.stderr = OutputMode::Null;
    let run = start(config).await;
    let mut client = connect(&run).await;

    client.signal(15).await.unwrap();
    timeout(Duration::from_secs(1), run.supervisor.done())
        .await
        .unwrap();

    let status = run.supervisor.status().await;
    assert!(!status.running);

    // Signaling after reap fails
    let err = client.signal(15).await.unwrap_err();
    assert!(err.to_string().contains("not running"));

    run.supervisor.stop().await;
}

#[tokio::test]
async fn test_wait_exit_completes_and_times_out() {
    let run = start(Config::new(sh("sleep 0.5"))).await;
    let mut client = connect(&run).await;

    // Zero timeout polls once while the child is still running
    let status = client.wait(WaitType::Exit, 0).await.unwrap();
    assert_eq!(status, WaitStatus::Timeout);

    let status = timeout(TEST_TIMEOUT, client.wait(WaitType::Exit, 5))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status, WaitStatus::Completed);

    run.supervisor.stop().await;
}

#[tokio::test]
async fn test_wait_foreground_not_applicable_without_vty() {
    let run = start(Config::new(sh("sleep 5"))).await;
    let mut client = connect(&run).await;

    let status = client.wait(WaitType::Foreground, 0).await.unwrap();
    assert_eq!(status, WaitStatus::NotApplicable);

    run.supervisor.stop().await;
}

#[tokio::test]
async fn test_invalid_attach_mask_keeps_connection() {
    let run = start(Config::new(sh("sleep 5"))).await;
    let mut client = connect(&run).await;

    client.attach(0).await.unwrap();
    // The ERROR frame surfaces on the next request
    let err = client.status().await.unwrap_err();
    assert!(err.to_string().contains("invalid stream selector"));

    // The connection survived the application-level error
    let status = client.status().await.unwrap();
    assert!(status.running);

    run.supervisor.stop().await;
}

#[tokio::test]
async fn test_resize_and_screen_require_vty() {
    let run = start(Config::new(sh("sleep 5"))).await;
    let mut client = connect(&run).await;

    let err = client.resize(40, 120).await.unwrap_err();
    assert!(err.to_string().contains("VTY is not enabled"));

    let err = client.get_screen().await.unwrap_err();
    assert!(err.to_string().contains("VTY is not enabled"));

    let err = client
        .export(ExportRequest::new(ExportFormat::Text))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("VTY is not enabled"));

    run.supervisor.stop().await;
}

#[tokio::test]
async fn test_shutdown_removes_socket_without_signaling_child() {
    let run = start(Config::new(sh("sleep 30"))).await;
    let mut client = connect(&run).await;
    let pid = client.status().await.unwrap().pid;

    client.shutdown().await.unwrap();

    // Give the stop a moment to tear the endpoint down
    timeout(TEST_TIMEOUT, async {
        while run.runtime_dir.join("control.sock").exists() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();

    // The child was not signaled
    // SAFETY: kill with signal 0 only checks for existence
    let alive = unsafe { libc::kill(pid, 0) } == 0;
    assert!(alive);

    // SAFETY: kill is always safe to call with a valid pid and signal
    unsafe {
        libc::kill(pid, libc::SIGKILL);
    }
}

#[tokio::test]
async fn test_tombstone_client_full_cycle() {
    let run = start(Config::new(sh("echo captured"))).await;
    timeout(TEST_TIMEOUT, run.supervisor.done()).await.unwrap();

    let mut client = connect(&run).await;
    assert!(!client.is_live());

    let status = client.status().await.unwrap();
    assert!(!status.running);
    assert_eq!(status.exit_code, Some(0));

    assert_eq!(client.read_output().unwrap(), b"captured\n");

    let wait = client.wait(WaitType::Exit, 0).await.unwrap();
    assert_eq!(wait, WaitStatus::Completed);
    assert!(!run.runtime_dir.exists());

    // Retained handles keep serving after the reap
    let status = client.status().await.unwrap();
    assert_eq!(status.exit_code, Some(0));
    assert_eq!(client.read_output().unwrap(), b"captured\n");

    // A brand-new client for the reaped directory fails
    assert!(Client::open_runtime_dir(0, &run.runtime_dir).await.is_err());

    run.supervisor.stop().await;
}

#[tokio::test]
async fn test_vty_screen_resize_and_export() {
    let mut config = Config::new(sh("printf 'Hi'; sleep 30"));
    config.use_vty = true;
    let run = start(config).await;
    let mut client = connect(&run).await;

    // Wait until the emulator has consumed the output
    let screen = timeout(TEST_TIMEOUT, async {
        loop {
            let screen = client.get_screen().await.unwrap();
            if screen.lines[0].contains("Hi") {
                return screen;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(screen.rows, 24);
    assert_eq!(screen.cols, 80);

    client.resize(40, 120).await.unwrap();
    let screen = client.get_screen().await.unwrap();
    assert_eq!(screen.rows, 40);
    assert_eq!(screen.cols, 120);

    let err = client.resize(0, 80).await.unwrap_err();
    assert!(err.to_string().contains("invalid terminal size"));
    let err = client.resize(40, 501).await.unwrap_err();
    assert!(err.to_string().contains("invalid terminal size"));

    let export = client
        .export(ExportRequest::new(ExportFormat::Text))
        .await
        .unwrap();
    assert!(export.content.contains("Hi"));

    let status = client.status().await.unwrap();
    assert!(status.has_vty);

    client.signal(9).await.unwrap();
    timeout(TEST_TIMEOUT, run.supervisor.done()).await.unwrap();
    run.supervisor.stop().await;
}

#[tokio::test]
async fn test_vty_hyperlink_export_markdown() {
    let mut config = Config::new(sh(
        "printf '\\033]8;;https://g.io\\033\\\\Hi\\033]8;;\\033\\\\'; sleep 30",
    ));
    config.use_vty = true;
    let run = start(config).await;
    let mut client = connect(&run).await;

    let export = timeout(TEST_TIMEOUT, async {
        loop {
            let export = client
                .export(ExportRequest::new(ExportFormat::Markdown))
                .await
                .unwrap();
            if export.content.contains("[Hi](https://g.io)") {
                return export;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(export.format, ExportFormat::Markdown);

    let screen = client.get_screen().await.unwrap();
    assert!(screen.lines[0].contains("Hi"));

    client.signal(9).await.unwrap();
    timeout(TEST_TIMEOUT, run.supervisor.done()).await.unwrap();
    run.supervisor.stop().await;
}
