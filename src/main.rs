//! Copilot bridge binary
//!
//! Run with: cargo run -- --cli-path copilot
//!
//! For help: cargo run -- --help

use std::io::IsTerminal;

use clap::Parser;
use copilot_bridge::{cli::Cli, run_with_cli, shutdown_otel};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Signals are handled inside the runner so the assistant is stopped gracefully
    let result = run_with_cli(&cli).await;

    // Shutdown OpenTelemetry to flush all pending spans
    shutdown_otel();

    if let Err(e) = result {
        // Output error to stderr (stdout carries the chat output)
        eprintln!("Error: {}", e);

        if std::io::stdin().is_terminal() {
            eprintln!("\nFor debugging, run with --diagnostic to log to a file.");
            eprintln!("Or use -v/-vv/-vvv for more verbose logging.");
        }

        std::process::exit(1);
    }

    Ok(())
}
