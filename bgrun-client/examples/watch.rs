//! Connect to a running supervisor by PID, print its status, and stream
//! its output until the process exits.
//!
//! Usage: watch <pid>

use std::io::Write;

use bgrun_client::Client;
use bgrun_protocol::stream;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let pid: i32 = match std::env::args().nth(1).map(|arg| arg.parse()) {
        Some(Ok(pid)) => pid,
        _ => {
            eprintln!("Usage: watch <pid>");
            std::process::exit(1);
        }
    };

    let mut client = Client::new(pid).await?;

    let status = client.status().await?;
    println!("PID: {}", status.pid);
    println!("Running: {}", status.running);
    println!("Command: {:?}", status.command);

    if !client.is_live() {
        println!("--- captured output ---");
        std::io::stdout().write_all(&client.read_output()?)?;
        return Ok(());
    }

    client.attach(stream::BOTH).await?;
    client
        .read_events(
            |stream_id, data| {
                let prefix = if stream_id == stream::STDERR {
                    "[stderr] "
                } else {
                    "[stdout] "
                };
                print!("{}", prefix);
                std::io::stdout().write_all(data)?;
                Ok(())
            },
            |exit_code| println!("process exited with code {}", exit_code),
        )
        .await?;

    Ok(())
}
