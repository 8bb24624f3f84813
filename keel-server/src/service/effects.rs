//! Effect collaborators
//!
//! The actual mechanics of starting, stopping and deploying live outside the
//! control plane. The actuator reaches them through these three traits and
//! only ever hands them copies of registry data.
//!
//! Effects run on the blocking pool, so an implementation may block; it must
//! be `Send + Sync` because every session shares the same instance.

use std::sync::Arc;

use keel_core::domain::pipeline::{Pipeline, Stage, StageStatus};
use thiserror::Error;
use tracing::info;

/// A pipeline start was accepted by the workload backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Started;

/// A pipeline stop was accepted by the workload backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stopped;

/// A stage deploy finished; `status` is written back to the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deployed {
    pub status: StageStatus,
}

impl Default for Deployed {
    fn default() -> Self {
        Self {
            status: StageStatus::Deployed,
        }
    }
}

/// Failure reported by an effect collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EffectError {
    message: String,
}

impl EffectError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub trait StartEffect: Send + Sync {
    fn start(&self, pipeline: &Pipeline) -> Result<Started, EffectError>;
}

pub trait StopEffect: Send + Sync {
    fn stop(&self, pipeline: &Pipeline) -> Result<Stopped, EffectError>;
}

pub trait DeployEffect: Send + Sync {
    /// Deploys one stage; `pipeline_id` identifies the owning pipeline
    fn deploy(&self, pipeline_id: &str, stage: &Stage) -> Result<Deployed, EffectError>;
}

/// The set of collaborators handed to the actuator
#[derive(Clone)]
pub struct Effects {
    pub start: Arc<dyn StartEffect>,
    pub stop: Arc<dyn StopEffect>,
    pub deploy: Arc<dyn DeployEffect>,
}

impl Effects {
    pub fn new(
        start: Arc<dyn StartEffect>,
        stop: Arc<dyn StopEffect>,
        deploy: Arc<dyn DeployEffect>,
    ) -> Self {
        Self {
            start,
            stop,
            deploy,
        }
    }

    /// Uses one implementation for all three effects
    pub fn from_shared<E>(effects: Arc<E>) -> Self
    where
        E: StartEffect + StopEffect + DeployEffect + 'static,
    {
        Self {
            start: effects.clone(),
            stop: effects.clone(),
            deploy: effects,
        }
    }

    /// Effects that only log, for running without a workload backend
    pub fn logging() -> Self {
        Self::from_shared(Arc::new(LoggingEffects))
    }
}

impl std::fmt::Debug for Effects {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effects").finish_non_exhaustive()
    }
}

/// Effect implementation that logs and always succeeds
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEffects;

impl StartEffect for LoggingEffects {
    fn start(&self, pipeline: &Pipeline) -> Result<Started, EffectError> {
        info!(pipeline_id = %pipeline.id, "Starting pipeline {}", pipeline.name);
        Ok(Started)
    }
}

impl StopEffect for LoggingEffects {
    fn stop(&self, pipeline: &Pipeline) -> Result<Stopped, EffectError> {
        info!(pipeline_id = %pipeline.id, "Stopping pipeline {}", pipeline.name);
        Ok(Stopped)
    }
}

impl DeployEffect for LoggingEffects {
    fn deploy(&self, pipeline_id: &str, stage: &Stage) -> Result<Deployed, EffectError> {
        info!(
            pipeline_id = %pipeline_id,
            stage_id = %stage.id,
            "Deploying stage {}",
            stage.name
        );
        Ok(Deployed::default())
    }
}
