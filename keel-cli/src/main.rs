//! Keel CLI
//!
//! Command-line interface for a Keel server: inspect pipeline snapshots and
//! drive pipelines over the control channel.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;

#[derive(Parser)]
#[command(name = "keel")]
#[command(about = "Keel deployment pipeline control CLI", long_about = None)]
struct Cli {
    /// Snapshot endpoint URL
    #[arg(long, env = "KEEL_SERVER_URL", default_value = "http://localhost:8081")]
    server: String,

    /// WebSocket control URL
    #[arg(long, env = "KEEL_CONTROL_URL", default_value = "ws://localhost:8080/ws")]
    control: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config {
        server_url: cli.server,
        control_url: cli.control,
    };

    handle_command(cli.command, &config).await
}
