//! Pipeline command handlers
//!
//! Read-only views of the server's pipeline snapshot.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use keel_client::SnapshotClient;
use keel_core::domain::pipeline::{Pipeline, StageStatus};

use crate::config::Config;

/// Pipeline subcommands
#[derive(Subcommand)]
pub enum PipelineCommands {
    /// List all pipelines
    List {
        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },
    /// Get pipeline details
    Get {
        /// Pipeline ID
        id: String,

        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },
}

/// Handle pipeline commands
pub async fn handle_pipeline_command(command: PipelineCommands, config: &Config) -> Result<()> {
    let client = SnapshotClient::new(&config.server_url);

    match command {
        PipelineCommands::List { json } => list_pipelines(&client, json).await,
        PipelineCommands::Get { id, json } => get_pipeline(&client, &id, json).await,
    }
}

/// GET /health against the snapshot listener
pub async fn health(config: &Config) -> Result<()> {
    let client = SnapshotClient::new(&config.server_url);
    client
        .health()
        .await
        .with_context(|| format!("Server at {} is not healthy", client.base_url()))?;

    println!("{}", format!("✓ {} is healthy", client.base_url()).green().bold());
    Ok(())
}

/// List all pipelines
async fn list_pipelines(client: &SnapshotClient, json: bool) -> Result<()> {
    let pipelines = client.list_pipelines().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&pipelines)?);
        return Ok(());
    }

    if pipelines.is_empty() {
        println!("{}", "No pipelines found.".yellow());
    } else {
        println!(
            "{}",
            format!("Found {} pipeline(s):", pipelines.len()).bold()
        );
        println!();
        for pipeline in pipelines {
            print_pipeline_summary(&pipeline);
        }
    }

    Ok(())
}

/// Get and display a single pipeline
async fn get_pipeline(client: &SnapshotClient, id: &str, json: bool) -> Result<()> {
    let pipeline = match client.get_pipeline(id).await {
        Err(e) if e.is_not_found() => anyhow::bail!("Pipeline {} does not exist", id),
        result => result.with_context(|| format!("Failed to fetch pipeline {}", id))?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&pipeline)?);
    } else {
        print_pipeline_details(&pipeline);
    }

    Ok(())
}

/// Print a pipeline summary
fn print_pipeline_summary(pipeline: &Pipeline) {
    println!("  {} {}", "▸".cyan(), pipeline.name.bold());
    println!("    ID:      {}", pipeline.id.dimmed());
    println!(
        "    Stages:  {}",
        pipeline
            .stages
            .iter()
            .map(|s| format!("{} ({})", s.id, s.status))
            .collect::<Vec<_>>()
            .join(", ")
            .dimmed()
    );
    println!();
}

/// Print detailed pipeline information
fn print_pipeline_details(pipeline: &Pipeline) {
    println!("{}", "Pipeline Details:".bold());
    println!("  ID:     {}", pipeline.id.cyan());
    println!("  Name:   {}", pipeline.name.bold());

    if pipeline.stages.is_empty() {
        println!("  {}", "No stages.".dimmed());
        return;
    }

    println!("\n{}", "Stages:".bold());
    for stage in &pipeline.stages {
        println!(
            "  {:<20} {:<24} {}",
            stage.id.cyan(),
            stage.name,
            colorize_status(stage.status)
        );
    }
}

/// Colorize a stage status
pub fn colorize_status(status: StageStatus) -> ColoredString {
    let label = status.to_string();
    match status {
        StageStatus::Pending => label.yellow(),
        StageStatus::Running => label.blue(),
        StageStatus::Deployed => label.green(),
        StageStatus::Stopped => label.dimmed(),
        StageStatus::Failed => label.red(),
    }
}
