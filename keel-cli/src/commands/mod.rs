//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod control;
mod pipeline;

pub use pipeline::PipelineCommands;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Inspect pipeline snapshots
    Pipeline {
        #[command(subcommand)]
        command: PipelineCommands,
    },
    /// Start a pipeline
    Start {
        /// Pipeline ID
        pipeline: String,
    },
    /// Stop a pipeline
    Stop {
        /// Pipeline ID
        pipeline: String,
    },
    /// Deploy one stage of a pipeline
    Deploy {
        /// Pipeline ID
        pipeline: String,
        /// Stage ID
        stage: String,
    },
    /// Stream status changes until interrupted
    Watch {
        /// Only show events for this pipeline
        #[arg(short, long)]
        pipeline: Option<String>,
    },
    /// Check that the server is reachable
    Health,
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Pipeline { command } => pipeline::handle_pipeline_command(command, config).await,
        Commands::Start { pipeline } => control::start_pipeline(config, &pipeline).await,
        Commands::Stop { pipeline } => control::stop_pipeline(config, &pipeline).await,
        Commands::Deploy { pipeline, stage } => {
            control::deploy_stage(config, &pipeline, &stage).await
        }
        Commands::Watch { pipeline } => control::watch(config, pipeline.as_deref()).await,
        Commands::Health => pipeline::health(config).await,
    }
}
