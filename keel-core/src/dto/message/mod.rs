//! Server-to-client DTOs
//!
//! Everything the server writes on a control connection is a
//! [`ServerMessage`]: an acknowledgement of one command, a rejection of one
//! undecodable message, or a status event fanned out to every session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::pipeline::StageStatus;
use crate::dto::command::Action;

/// Result of dispatching one command against the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Outcome {
    Started {
        pipeline_id: String,
    },
    Stopped {
        pipeline_id: String,
    },
    Deployed {
        pipeline_id: String,
        stage_id: String,
        status: StageStatus,
    },
    PipelineNotFound {
        pipeline_id: String,
    },
    StageNotFound {
        pipeline_id: String,
        stage_id: String,
    },
    /// The target existed but the effect collaborator reported an error
    Failed {
        pipeline_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stage_id: Option<String>,
        reason: String,
    },
}

impl Outcome {
    /// Short label used in logs
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Started { .. } => "started",
            Outcome::Stopped { .. } => "stopped",
            Outcome::Deployed { .. } => "deployed",
            Outcome::PipelineNotFound { .. } => "pipeline_not_found",
            Outcome::StageNotFound { .. } => "stage_not_found",
            Outcome::Failed { .. } => "failed",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Outcome::Started { .. } | Outcome::Stopped { .. } | Outcome::Deployed { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Outcome::PipelineNotFound { .. } | Outcome::StageNotFound { .. }
        )
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Started { pipeline_id } => write!(f, "pipeline {} started", pipeline_id),
            Outcome::Stopped { pipeline_id } => write!(f, "pipeline {} stopped", pipeline_id),
            Outcome::Deployed {
                pipeline_id,
                stage_id,
                status,
            } => write!(f, "stage {}/{} deployed ({})", pipeline_id, stage_id, status),
            Outcome::PipelineNotFound { pipeline_id } => {
                write!(f, "pipeline {} not found", pipeline_id)
            }
            Outcome::StageNotFound {
                pipeline_id,
                stage_id,
            } => write!(f, "stage {} not found in pipeline {}", stage_id, pipeline_id),
            Outcome::Failed {
                pipeline_id,
                stage_id: Some(stage_id),
                reason,
            } => write!(f, "stage {}/{} failed: {}", pipeline_id, stage_id, reason),
            Outcome::Failed {
                pipeline_id,
                stage_id: None,
                reason,
            } => write!(f, "pipeline {} failed: {}", pipeline_id, reason),
        }
    }
}

/// Status change broadcast to every connected session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineEvent {
    PipelineStarted {
        pipeline_id: String,
    },
    PipelineStopped {
        pipeline_id: String,
    },
    StageStatusChanged {
        pipeline_id: String,
        stage_id: String,
        previous: StageStatus,
        status: StageStatus,
    },
}

impl PipelineEvent {
    pub fn pipeline_id(&self) -> &str {
        match self {
            PipelineEvent::PipelineStarted { pipeline_id }
            | PipelineEvent::PipelineStopped { pipeline_id }
            | PipelineEvent::StageStatusChanged { pipeline_id, .. } => pipeline_id,
        }
    }
}

/// Any message written by the server on a control connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Acknowledges one decoded command, in command order
    Ack {
        action: Action,
        outcome: Outcome,
        at: DateTime<Utc>,
    },
    /// The inbound message could not be decoded; the connection stays open
    Rejected { error: String, at: DateTime<Utc> },
    Event {
        event: PipelineEvent,
        at: DateTime<Utc>,
    },
}

impl ServerMessage {
    pub fn ack(action: Action, outcome: Outcome) -> Self {
        ServerMessage::Ack {
            action,
            outcome,
            at: Utc::now(),
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        ServerMessage::Rejected {
            error: error.into(),
            at: Utc::now(),
        }
    }

    pub fn event(event: PipelineEvent) -> Self {
        ServerMessage::Event {
            event,
            at: Utc::now(),
        }
    }
}
