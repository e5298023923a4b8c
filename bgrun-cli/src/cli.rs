//! Command-line argument parsing for bgrun
//!
//! Uses clap for argument parsing with derive macros. Three mutually
//! exclusive modes share one binary: foreground daemon (default),
//! background daemon (`--background`), and control client (`--ctl`).

use clap::Parser;

/// bgrun - background process runner
///
/// Runs a single command under a supervisor that serves a control socket
/// in a per-PID runtime directory ($XDG_RUNTIME_DIR/bgrun/<pid> or
/// /tmp/.bgrun-<uid>/<pid>), containing control.sock, output.log and,
/// after exit, status.json.
#[derive(Parser, Debug)]
#[command(
    name = "bgrun",
    version,
    about = "Run a command under a per-process supervisor",
    after_help = "\
Control commands (with --ctl --pid <pid>):
  status              Show process status
  attach              Attach to process output
  wait <type> <secs>  Wait for a condition (type: exit|foreground)
  signal <signum>     Send a signal to the process
  shutdown            Shut down the supervisor

Examples:
  bgrun sleep 100
  bgrun --stdin stream --stdout log bash
  bgrun --vty --stdin stream vim notes.txt
  bgrun --ctl --pid 12345 status
  bgrun --ctl --pid 12345 wait exit 10"
)]
pub struct Args {
    /// stdin mode: null, stream, or a file path
    #[arg(long, default_value = "null")]
    pub stdin: String,

    /// stdout mode: null, log, or a file path
    #[arg(long, default_value = "log")]
    pub stdout: String,

    /// stderr mode: null, log, or a file path
    #[arg(long, default_value = "log")]
    pub stderr: String,

    /// Run the child on a pseudo-terminal
    #[arg(long)]
    pub vty: bool,

    /// Run the supervisor in the background and print its PID
    #[arg(long)]
    pub background: bool,

    /// Control mode: act as a client for a running supervisor
    #[arg(long)]
    pub ctl: bool,

    /// PID of the supervisor to control (control mode)
    #[arg(long)]
    pub pid: Option<i32>,

    /// Command to run, or the control subcommand and its arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
