//! Pipeline Registry
//!
//! The authoritative in-memory map of pipeline id to pipeline definition.
//!
//! Locking is striped per pipeline: the outer map lock is taken shared for
//! every lookup or status write, and only the target pipeline's mutex is held
//! exclusively, so commands against different pipelines do not serialize.
//! [`Registry::list`] takes the outer lock exclusively, which waits out every
//! in-flight access and yields a snapshot of one instant.
//!
//! No method hands out a guard; callers get clones, so no lock can be held
//! across an effect invocation.

use std::collections::HashMap;

use keel_core::domain::pipeline::{Pipeline, Stage, StageStatus};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;

/// Registry error type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("pipeline {0} not found")]
    PipelineNotFound(String),

    #[error("stage {stage_id} not found in pipeline {pipeline_id}")]
    StageNotFound {
        pipeline_id: String,
        stage_id: String,
    },

    #[error("pipeline {0} already exists")]
    DuplicatePipeline(String),

    #[error("pipeline {pipeline_id} declares stage {stage_id} more than once")]
    DuplicateStage {
        pipeline_id: String,
        stage_id: String,
    },
}

pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Debug, Default)]
pub struct Registry {
    pipelines: RwLock<HashMap<String, Mutex<Pipeline>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from provisioned pipelines, rejecting duplicates
    pub fn from_pipelines(pipelines: impl IntoIterator<Item = Pipeline>) -> Result<Self> {
        let registry = Self::new();
        for pipeline in pipelines {
            registry.insert(pipeline)?;
        }
        Ok(registry)
    }

    /// Adds a pipeline (provisioning path, never used by the control loop)
    pub fn insert(&self, pipeline: Pipeline) -> Result<()> {
        if let Some(stage_id) = pipeline.duplicate_stage_id() {
            return Err(RegistryError::DuplicateStage {
                pipeline_id: pipeline.id.clone(),
                stage_id: stage_id.to_string(),
            });
        }

        let mut pipelines = self.pipelines.write();
        if pipelines.contains_key(&pipeline.id) {
            return Err(RegistryError::DuplicatePipeline(pipeline.id));
        }

        tracing::debug!(
            pipeline_id = %pipeline.id,
            stages = pipeline.stages.len(),
            "Pipeline registered"
        );
        pipelines.insert(pipeline.id.clone(), Mutex::new(pipeline));
        Ok(())
    }

    /// Removes a pipeline (provisioning path)
    pub fn remove(&self, pipeline_id: &str) -> Option<Pipeline> {
        self.pipelines
            .write()
            .remove(pipeline_id)
            .map(Mutex::into_inner)
    }

    /// Returns a copy of the pipeline
    pub fn lookup(&self, pipeline_id: &str) -> Result<Pipeline> {
        self.with_pipeline(pipeline_id, |pipeline| pipeline.clone())
    }

    /// Returns a copy of one stage, looking up the pipeline first
    pub fn lookup_stage(&self, pipeline_id: &str, stage_id: &str) -> Result<Stage> {
        self.with_pipeline(pipeline_id, |pipeline| {
            pipeline
                .stage(stage_id)
                .cloned()
                .ok_or_else(|| stage_not_found(pipeline_id, stage_id))
        })?
    }

    /// Writes a stage status and returns the previous one
    pub fn set_stage_status(
        &self,
        pipeline_id: &str,
        stage_id: &str,
        status: StageStatus,
    ) -> Result<StageStatus> {
        self.with_pipeline(pipeline_id, |pipeline| -> Result<StageStatus> {
            let stage = pipeline
                .stage_mut(stage_id)
                .ok_or_else(|| stage_not_found(pipeline_id, stage_id))?;
            Ok(std::mem::replace(&mut stage.status, status))
        })?
    }

    /// Point-in-time copy of every pipeline, sorted by id
    pub fn list(&self) -> Vec<Pipeline> {
        let mut pipelines = self.pipelines.write();
        let mut snapshot: Vec<Pipeline> = pipelines
            .values_mut()
            .map(|entry| entry.get_mut().clone())
            .collect();
        drop(pipelines);

        snapshot.sort_by(|a, b| a.id.cmp(&b.id));
        snapshot
    }

    pub fn len(&self) -> usize {
        self.pipelines.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.read().is_empty()
    }

    /// Runs `f` with the outer lock shared and the pipeline's mutex held
    fn with_pipeline<R>(&self, pipeline_id: &str, f: impl FnOnce(&mut Pipeline) -> R) -> Result<R> {
        let pipelines = self.pipelines.read();
        let entry = pipelines
            .get(pipeline_id)
            .ok_or_else(|| RegistryError::PipelineNotFound(pipeline_id.to_string()))?;
        let mut pipeline = entry.lock();
        Ok(f(&mut pipeline))
    }
}

fn stage_not_found(pipeline_id: &str, stage_id: &str) -> RegistryError {
    RegistryError::StageNotFound {
        pipeline_id: pipeline_id.to_string(),
        stage_id: stage_id.to_string(),
    }
}
