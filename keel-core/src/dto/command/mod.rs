//! Control command DTOs
//!
//! Commands travel from clients to the server over the control channel.
//! Serialization produces the wire shape directly; decoding goes through
//! [`crate::codec::decode`] so malformed input is classified instead of
//! surfacing raw serde errors.

use serde::{Deserialize, Serialize};

/// Control actions understood by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    StartPipeline,
    StopPipeline,
    DeployStage,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::StartPipeline => "start_pipeline",
            Action::StopPipeline => "stop_pipeline",
            Action::DeployStage => "deploy_stage",
        }
    }

    /// Parses the wire name of an action
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "start_pipeline" => Some(Action::StartPipeline),
            "stop_pipeline" => Some(Action::StopPipeline),
            "deploy_stage" => Some(Action::DeployStage),
            _ => None,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded control command
///
/// `stage_id` only exists where the action needs it, so a deploy without a
/// stage cannot be represented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Command {
    StartPipeline { pipeline_id: String },
    StopPipeline { pipeline_id: String },
    DeployStage { pipeline_id: String, stage_id: String },
}

impl Command {
    pub fn start(pipeline_id: impl Into<String>) -> Self {
        Command::StartPipeline {
            pipeline_id: pipeline_id.into(),
        }
    }

    pub fn stop(pipeline_id: impl Into<String>) -> Self {
        Command::StopPipeline {
            pipeline_id: pipeline_id.into(),
        }
    }

    pub fn deploy(pipeline_id: impl Into<String>, stage_id: impl Into<String>) -> Self {
        Command::DeployStage {
            pipeline_id: pipeline_id.into(),
            stage_id: stage_id.into(),
        }
    }

    pub fn action(&self) -> Action {
        match self {
            Command::StartPipeline { .. } => Action::StartPipeline,
            Command::StopPipeline { .. } => Action::StopPipeline,
            Command::DeployStage { .. } => Action::DeployStage,
        }
    }

    pub fn pipeline_id(&self) -> &str {
        match self {
            Command::StartPipeline { pipeline_id }
            | Command::StopPipeline { pipeline_id }
            | Command::DeployStage { pipeline_id, .. } => pipeline_id,
        }
    }

    pub fn stage_id(&self) -> Option<&str> {
        match self {
            Command::DeployStage { stage_id, .. } => Some(stage_id),
            _ => None,
        }
    }
}
