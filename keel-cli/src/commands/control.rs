//! Control command handlers
//!
//! Each command opens a control connection, sends one command and prints
//! the server's acknowledgement.

use anyhow::{Context, Result};
use colored::*;
use keel_client::ControlClient;
use keel_core::dto::command::Command;
use keel_core::dto::message::{Outcome, PipelineEvent};

use crate::commands::pipeline::colorize_status;
use crate::config::Config;

pub async fn start_pipeline(config: &Config, pipeline_id: &str) -> Result<()> {
    send(config, Command::start(pipeline_id)).await
}

pub async fn stop_pipeline(config: &Config, pipeline_id: &str) -> Result<()> {
    send(config, Command::stop(pipeline_id)).await
}

pub async fn deploy_stage(config: &Config, pipeline_id: &str, stage_id: &str) -> Result<()> {
    send(config, Command::deploy(pipeline_id, stage_id)).await
}

/// Prints every event until the server closes the connection
pub async fn watch(config: &Config, pipeline_id: Option<&str>) -> Result<()> {
    let mut client = connect(config).await?;
    println!(
        "{}",
        format!("Watching {} (Ctrl-C to stop)", config.control_url).bold()
    );

    while let Some(event) = client.next_event().await? {
        if pipeline_id.is_some_and(|id| id != event.pipeline_id()) {
            continue;
        }
        print_event(&event);
    }

    println!("{}", "Connection closed by server.".yellow());
    Ok(())
}

async fn connect(config: &Config) -> Result<ControlClient> {
    ControlClient::connect(&config.control_url)
        .await
        .with_context(|| format!("Failed to connect to {}", config.control_url))
}

async fn send(config: &Config, command: Command) -> Result<()> {
    let mut client = connect(config).await?;
    let outcome = client.command(&command).await?;
    client.close().await.ok();

    print_outcome(&outcome);

    if outcome.is_success() {
        Ok(())
    } else if outcome.is_not_found() {
        anyhow::bail!("{} was not applied: no such pipeline or stage", command.action())
    } else {
        anyhow::bail!("{} was not applied", command.action())
    }
}

fn print_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::Started { pipeline_id } => {
            println!("{}", format!("✓ Pipeline {} started", pipeline_id).green().bold())
        }
        Outcome::Stopped { pipeline_id } => {
            println!("{}", format!("✓ Pipeline {} stopped", pipeline_id).green().bold())
        }
        Outcome::Deployed {
            pipeline_id,
            stage_id,
            status,
        } => println!(
            "{} {}",
            format!("✓ Stage {}/{} deployed:", pipeline_id, stage_id)
                .green()
                .bold(),
            colorize_status(*status)
        ),
        Outcome::PipelineNotFound { .. } | Outcome::StageNotFound { .. } => {
            println!("{}", format!("✗ {}", outcome).yellow().bold())
        }
        Outcome::Failed { .. } => println!("{}", format!("✗ {}", outcome).red().bold()),
    }
}

fn print_event(event: &PipelineEvent) {
    match event {
        PipelineEvent::PipelineStarted { pipeline_id } => {
            println!("  {} {} started", "▸".cyan(), pipeline_id.bold())
        }
        PipelineEvent::PipelineStopped { pipeline_id } => {
            println!("  {} {} stopped", "▸".cyan(), pipeline_id.bold())
        }
        PipelineEvent::StageStatusChanged {
            pipeline_id,
            stage_id,
            previous,
            status,
        } => println!(
            "  {} {}/{} {} → {}",
            "▸".cyan(),
            pipeline_id.bold(),
            stage_id,
            colorize_status(*previous),
            colorize_status(*status)
        ),
    }
}
