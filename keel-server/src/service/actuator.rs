//! Pipeline Actuator
//!
//! Dispatches decoded commands against the registry: looks up the target,
//! invokes the matching effect collaborator with a copy of it, and reports an
//! [`Outcome`]. Dispatch is synchronous; callers run it off the async runtime.
//!
//! Registry locks are scoped to single accesses. The effect runs with no lock
//! held, and the only mutation (a deploy's status write) happens after the
//! effect returns, so a failed or panicking effect leaves no partial state.

use std::sync::Arc;

use keel_core::domain::pipeline::StageStatus;
use keel_core::dto::command::Command;
use keel_core::dto::message::{Outcome, PipelineEvent};
use tracing::{info, warn};

use crate::repository::{Registry, RegistryError};
use crate::service::effects::Effects;
use crate::service::events::EventBus;

#[derive(Debug)]
pub struct Actuator {
    registry: Arc<Registry>,
    effects: Effects,
    events: EventBus,
}

impl Actuator {
    pub fn new(registry: Arc<Registry>, effects: Effects, events: EventBus) -> Self {
        Self {
            registry,
            effects,
            events,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Executes one command and logs action, target and outcome
    pub fn dispatch(&self, command: &Command) -> Outcome {
        let outcome = match command {
            Command::StartPipeline { pipeline_id } => self.start_pipeline(pipeline_id),
            Command::StopPipeline { pipeline_id } => self.stop_pipeline(pipeline_id),
            Command::DeployStage {
                pipeline_id,
                stage_id,
            } => self.deploy_stage(pipeline_id, stage_id),
        };

        if outcome.is_success() {
            info!(
                action = %command.action(),
                pipeline_id = %command.pipeline_id(),
                stage_id = command.stage_id(),
                outcome = outcome.label(),
                "Command dispatched"
            );
        } else {
            warn!(
                action = %command.action(),
                pipeline_id = %command.pipeline_id(),
                stage_id = command.stage_id(),
                outcome = outcome.label(),
                "Command not applied: {}",
                outcome
            );
        }

        outcome
    }

    fn start_pipeline(&self, pipeline_id: &str) -> Outcome {
        let pipeline = match self.registry.lookup(pipeline_id) {
            Ok(pipeline) => pipeline,
            Err(_) => return pipeline_not_found(pipeline_id),
        };

        match self.effects.start.start(&pipeline) {
            Ok(_) => {
                self.events.publish(PipelineEvent::PipelineStarted {
                    pipeline_id: pipeline_id.to_string(),
                });
                Outcome::Started {
                    pipeline_id: pipeline_id.to_string(),
                }
            }
            Err(e) => Outcome::Failed {
                pipeline_id: pipeline_id.to_string(),
                stage_id: None,
                reason: e.to_string(),
            },
        }
    }

    fn stop_pipeline(&self, pipeline_id: &str) -> Outcome {
        let pipeline = match self.registry.lookup(pipeline_id) {
            Ok(pipeline) => pipeline,
            Err(_) => return pipeline_not_found(pipeline_id),
        };

        match self.effects.stop.stop(&pipeline) {
            Ok(_) => {
                self.events.publish(PipelineEvent::PipelineStopped {
                    pipeline_id: pipeline_id.to_string(),
                });
                Outcome::Stopped {
                    pipeline_id: pipeline_id.to_string(),
                }
            }
            Err(e) => Outcome::Failed {
                pipeline_id: pipeline_id.to_string(),
                stage_id: None,
                reason: e.to_string(),
            },
        }
    }

    fn deploy_stage(&self, pipeline_id: &str, stage_id: &str) -> Outcome {
        let stage = match self.registry.lookup_stage(pipeline_id, stage_id) {
            Ok(stage) => stage,
            Err(RegistryError::StageNotFound { .. }) => {
                return Outcome::StageNotFound {
                    pipeline_id: pipeline_id.to_string(),
                    stage_id: stage_id.to_string(),
                };
            }
            Err(_) => return pipeline_not_found(pipeline_id),
        };

        let (status, result) = match self.effects.deploy.deploy(pipeline_id, &stage) {
            Ok(deployed) => (deployed.status, Ok(deployed.status)),
            Err(e) => (StageStatus::Failed, Err(e.to_string())),
        };

        // The target may have been deprovisioned while the effect ran
        let previous = match self.registry.set_stage_status(pipeline_id, stage_id, status) {
            Ok(previous) => previous,
            Err(e) => {
                warn!(
                    pipeline_id = %pipeline_id,
                    stage_id = %stage_id,
                    "Stage vanished during deploy: {}",
                    e
                );
                return Outcome::Failed {
                    pipeline_id: pipeline_id.to_string(),
                    stage_id: Some(stage_id.to_string()),
                    reason: e.to_string(),
                };
            }
        };

        self.events.publish(PipelineEvent::StageStatusChanged {
            pipeline_id: pipeline_id.to_string(),
            stage_id: stage_id.to_string(),
            previous,
            status,
        });

        match result {
            Ok(status) => Outcome::Deployed {
                pipeline_id: pipeline_id.to_string(),
                stage_id: stage_id.to_string(),
                status,
            },
            Err(reason) => Outcome::Failed {
                pipeline_id: pipeline_id.to_string(),
                stage_id: Some(stage_id.to_string()),
                reason,
            },
        }
    }
}

fn pipeline_not_found(pipeline_id: &str) -> Outcome {
    Outcome::PipelineNotFound {
        pipeline_id: pipeline_id.to_string(),
    }
}
