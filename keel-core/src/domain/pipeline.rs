//! Pipeline domain types

use serde::{Deserialize, Serialize};

/// Pipeline definition
///
/// Structure shared between the server (holds it in the registry) and
/// clients (read it from snapshots). Stage order is significant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            stages: Vec::new(),
        }
    }

    /// Appends a stage, keeping declaration order
    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Finds a stage by id (linear scan, ids are only unique per pipeline)
    pub fn stage(&self, stage_id: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.id == stage_id)
    }

    pub fn stage_mut(&mut self, stage_id: &str) -> Option<&mut Stage> {
        self.stages.iter_mut().find(|s| s.id == stage_id)
    }

    /// Returns the first stage id that appears more than once, if any
    pub fn duplicate_stage_id(&self) -> Option<&str> {
        self.stages.iter().enumerate().find_map(|(idx, stage)| {
            self.stages[..idx]
                .iter()
                .any(|earlier| earlier.id == stage.id)
                .then_some(stage.id.as_str())
        })
    }
}

/// A unit of work inside a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: StageStatus,
}

impl Stage {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: StageStatus::Pending,
        }
    }
}

/// Stage status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Pending,
    Running,
    Deployed,
    Stopped,
    Failed,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageStatus::Pending => write!(f, "pending"),
            StageStatus::Running => write!(f, "running"),
            StageStatus::Deployed => write!(f, "deployed"),
            StageStatus::Stopped => write!(f, "stopped"),
            StageStatus::Failed => write!(f, "failed"),
        }
    }
}
