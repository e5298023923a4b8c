//! bgrun: single-binary entry point for the supervisor and its control
//! client
//!
//! Daemon mode runs the supervisor in this process and prints the runtime
//! directory and socket path; --background re-execs a detached supervisor
//! and prints its PID; --ctl speaks the control protocol to a running (or
//! terminated) supervisor by PID.

mod cli;

use std::process::{ExitCode, Stdio};

use tracing::info;

use bgrun_client::Client;
use bgrun_protocol::{stream, ExportFormat, ExportRequest, WaitStatus, WaitType};
use bgrun_server::{Config, OutputMode, StdinMode, Supervisor};
use bgrun_utils::Result;

use cli::Args;

fn main() -> ExitCode {
    let args = Args::parse_args();

    if args.ctl {
        return run_control_mode(args);
    }

    if args.background {
        return run_in_background(&args);
    }

    run_daemon_mode(args)
}

/// Re-exec a detached supervisor built from the parsed configuration and
/// print its PID. Rebuilding the argv from parsed flags (rather than
/// filtering the raw argv) keeps a literal "--background" in the child
/// command intact.
fn run_in_background(args: &Args) -> ExitCode {
    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(e) => {
            eprintln!("Failed to locate executable: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut cmd = std::process::Command::new(exe);
    cmd.arg("--stdin")
        .arg(&args.stdin)
        .arg("--stdout")
        .arg(&args.stdout)
        .arg("--stderr")
        .arg(&args.stderr);
    if args.vty {
        cmd.arg("--vty");
    }
    cmd.arg("--");
    cmd.args(&args.args);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    match cmd.spawn() {
        Ok(child) => {
            // The PID used for control operations
            println!("{}", child.id());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to start background process: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_daemon_mode(args: Args) -> ExitCode {
    if args.args.is_empty() {
        eprintln!("Error: no command specified");
        eprintln!("Use --help for usage information");
        return ExitCode::FAILURE;
    }

    if let Err(e) = bgrun_utils::init_logging() {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    let mut config = Config::new(args.args.clone());
    config.stdin = StdinMode::parse(&args.stdin);
    config.stdout = OutputMode::parse(&args.stdout);
    config.stderr = OutputMode::parse(&args.stderr);
    config.use_vty = args.vty;

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async {
        let supervisor = match Supervisor::start(config).await {
            Ok(supervisor) => supervisor,
            Err(e) => {
                eprintln!("Failed to start supervisor: {}", e);
                return ExitCode::FAILURE;
            }
        };

        println!("Process started successfully");
        println!("Runtime directory: {}", supervisor.runtime_dir().display());
        println!("Control socket: {}", supervisor.socket_path().display());

        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                eprintln!("Failed to install signal handler: {}", e);
                return ExitCode::FAILURE;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("received interrupt, shutting down"),
            _ = sigterm.recv() => info!("received terminate, shutting down"),
            _ = supervisor.done() => info!("process exited, shutting down"),
        }

        supervisor.stop().await;
        ExitCode::SUCCESS
    })
}

fn run_control_mode(args: Args) -> ExitCode {
    let Some(pid) = args.pid else {
        eprintln!("Error: --pid is required for control mode");
        eprintln!("Usage: bgrun --ctl --pid <pid> <command> [args...]");
        return ExitCode::FAILURE;
    };

    if args.args.is_empty() {
        eprintln!("Error: no command specified");
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async {
        let mut client = match Client::new(pid).await {
            Ok(client) => client,
            Err(e) => {
                eprintln!("Failed to connect to PID {}: {}", pid, e);
                return ExitCode::FAILURE;
            }
        };

        let result = match args.args[0].as_str() {
            "status" => cmd_status(&mut client).await,
            "attach" => cmd_attach(&mut client).await,
            "wait" => cmd_wait(&mut client, &args.args[1..]).await,
            "signal" => cmd_signal(&mut client, &args.args[1..]).await,
            "shutdown" => cmd_shutdown(&mut client).await,
            "export" => cmd_export(&mut client, &args.args[1..]).await,
            other => {
                eprintln!("Unknown command: {}", other);
                return ExitCode::FAILURE;
            }
        };

        match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error: {}", e);
                ExitCode::FAILURE
            }
        }
    })
}

async fn cmd_status(client: &mut Client) -> Result<()> {
    let status = client.status().await?;

    println!("PID: {}", status.pid);
    println!("Running: {}", status.running);
    if let Some(code) = status.exit_code {
        println!("Exit Code: {}", code);
    }
    println!("Started: {}", status.started_at);
    if let Some(ended) = &status.ended_at {
        println!("Ended: {}", ended);
    }
    println!("Command: {:?}", status.command);
    println!("Has VTY: {}", status.has_vty);
    Ok(())
}

async fn cmd_attach(client: &mut Client) -> Result<()> {
    client.attach(stream::BOTH).await?;

    println!("Attached to process output (press Ctrl+C to detach)");
    println!("---");

    client
        .read_events(
            |stream_id, data| {
                use std::io::Write;
                if stream_id == stream::STDERR {
                    std::io::stderr().write_all(data)?;
                } else {
                    std::io::stdout().write_all(data)?;
                }
                Ok(())
            },
            |exit_code| {
                println!("\n---\nProcess exited with code {}", exit_code);
            },
        )
        .await
}

async fn cmd_wait(client: &mut Client, args: &[String]) -> Result<()> {
    if args.len() < 2 {
        eprintln!("Usage: bgrun --ctl --pid <pid> wait <exit|foreground> <seconds>");
        return Err(bgrun_utils::BgrunError::config("wait type and timeout required"));
    }

    let wait_type = match args[0].as_str() {
        "exit" => WaitType::Exit,
        "foreground" => WaitType::Foreground,
        other => {
            return Err(bgrun_utils::BgrunError::config(format!(
                "invalid wait type: {} (must be 'exit' or 'foreground')",
                other
            )))
        }
    };
    let timeout_secs: u32 = args[1]
        .parse()
        .map_err(|e| bgrun_utils::BgrunError::config(format!("invalid timeout: {}", e)))?;

    println!("Waiting for {} (timeout: {} seconds)...", args[0], timeout_secs);

    match client.wait(wait_type, timeout_secs).await? {
        WaitStatus::Completed => println!("Wait completed successfully"),
        WaitStatus::Timeout => println!("Wait timed out"),
        WaitStatus::NotApplicable => {
            println!("Wait type not applicable (e.g., foreground wait on non-VTY process)")
        }
    }
    Ok(())
}

async fn cmd_signal(client: &mut Client, args: &[String]) -> Result<()> {
    if args.is_empty() {
        return Err(bgrun_utils::BgrunError::config("signal number required"));
    }
    let signum: u8 = args[0]
        .parse()
        .map_err(|e| bgrun_utils::BgrunError::config(format!("invalid signal number: {}", e)))?;

    client.signal(signum).await?;
    println!("Signal {} sent successfully", signum);
    Ok(())
}

async fn cmd_shutdown(client: &mut Client) -> Result<()> {
    client.shutdown().await?;
    println!("Shutdown request sent");
    Ok(())
}

async fn cmd_export(client: &mut Client, args: &[String]) -> Result<()> {
    let format = match args.first().map(String::as_str) {
        None | Some("text") => ExportFormat::Text,
        Some("markdown") => ExportFormat::Markdown,
        Some("html") => ExportFormat::Html,
        Some(other) => {
            return Err(bgrun_utils::BgrunError::config(format!(
                "invalid export format: {} (must be text, markdown or html)",
                other
            )))
        }
    };

    let mut req = ExportRequest::new(format);
    req.include_scrollback = args.iter().any(|a| a == "--scrollback");

    let result = client.export(req).await?;
    print!("{}", result.content);
    Ok(())
}
