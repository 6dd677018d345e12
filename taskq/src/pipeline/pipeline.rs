//! Stage loading and sequential payload execution.
//!
//! `ExecutionPlan` fixes stage order from the configuration, `PipelineBuilder`
//! binds every planned stage (all or nothing), and `PipelineExecutor` folds a
//! payload through the bound stages.

use super::metrics::{PipelineMetrics, StageMetrics, StageOutcome};
use super::stage::LoadedStage;
use crate::config::{PipelineSpec, StageSpec};
use crate::stages::StageRegistry;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use taskq_shared::{Payload, TaskqError, TaskqResult};

/// Stage declarations in the exact order they will execute.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    stages: Vec<StageSpec>,
}

impl ExecutionPlan {
    pub fn new(stages: Vec<StageSpec>) -> TaskqResult<Self> {
        let mut seen = HashSet::new();
        for spec in &stages {
            if spec.name.is_empty() {
                return Err(TaskqError::Config(format!(
                    "stage of kind '{}' has an empty name",
                    spec.stage
                )));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(TaskqError::Config(format!(
                    "duplicate stage name '{}'",
                    spec.name
                )));
            }
        }

        Ok(Self { stages })
    }

    /// Resolve execution order from either configuration shape.
    ///
    /// The name-keyed shape must carry an explicit `order` covering every
    /// declared stage exactly once; map iteration order is never used.
    pub fn from_spec(spec: &PipelineSpec) -> TaskqResult<Self> {
        match spec {
            PipelineSpec::Ordered(stages) => Self::new(stages.clone()),
            PipelineSpec::Keyed { stages, order } => {
                let order = order.as_ref().ok_or_else(|| {
                    TaskqError::Config(
                        "name-keyed pipeline requires an explicit 'order' list".into(),
                    )
                })?;

                let mut planned = Vec::with_capacity(order.len());
                for name in order {
                    let spec = stages.get(name).ok_or_else(|| {
                        TaskqError::Config(format!("'order' names unknown stage '{}'", name))
                    })?;
                    planned.push(spec.named(name));
                }

                if let Some(missing) = stages.keys().find(|name| !order.contains(*name)) {
                    return Err(TaskqError::Config(format!(
                        "stage '{}' is declared but missing from 'order'",
                        missing
                    )));
                }

                Self::new(planned)
            }
        }
    }

    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    pub fn into_stages(self) -> Vec<StageSpec> {
        self.stages
    }
}

/// The bound, immutable stage collection.
///
/// Cheap to clone; clones share the same bindings.
#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Arc<[LoadedStage]>,
}

impl Pipeline {
    pub fn new(stages: Vec<LoadedStage>) -> Self {
        Self {
            stages: stages.into(),
        }
    }

    pub fn stages(&self) -> &[LoadedStage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(LoadedStage::name).collect()
    }
}

/// Stage loader: binds every planned stage through a registry.
pub struct PipelineBuilder;

impl PipelineBuilder {
    /// Bind all stages of `plan`.
    ///
    /// Fails on the first stage that cannot be bound; no partial pipeline
    /// is ever returned.
    pub fn from_plan(plan: ExecutionPlan, registry: &StageRegistry) -> TaskqResult<Pipeline> {
        let mut loaded = Vec::with_capacity(plan.stages().len());

        for spec in plan.into_stages() {
            let stage = registry.load(&spec)?;
            tracing::info!(
                position = loaded.len(),
                stage = %stage.name(),
                kind = %stage.kind(),
                "Stage bound"
            );
            loaded.push(stage);
        }

        tracing::info!(stages = loaded.len(), "Pipeline ready");
        Ok(Pipeline::new(loaded))
    }

    /// Plan and bind in one step.
    pub fn from_spec(spec: &PipelineSpec, registry: &StageRegistry) -> TaskqResult<Pipeline> {
        Self::from_plan(ExecutionPlan::from_spec(spec)?, registry)
    }
}

/// Final payload of one execution plus per-stage timing and outcomes.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub payload: Payload,
    pub metrics: PipelineMetrics,
}

/// Pipeline executor.
///
/// Runs stages strictly in order. A failing stage is logged and skipped:
/// the next stage receives the same input the failing stage received.
/// The chain never stops early, failed stages are never retried, and
/// earlier stages are never rolled back.
pub struct PipelineExecutor;

impl PipelineExecutor {
    pub async fn execute(pipeline: &Pipeline, payload: Payload) -> PipelineRun {
        let total_start = Instant::now();
        let mut stage_metrics = Vec::with_capacity(pipeline.len());
        let mut current = payload;

        for (index, stage) in pipeline.stages().iter().enumerate() {
            let stage_start = Instant::now();
            tracing::debug!(
                position = index,
                stage = %stage.name(),
                payload_size = current.len(),
                "Processing payload with stage"
            );

            let result = stage.call(&current).await;
            let outcome = match result {
                Ok(output) => {
                    tracing::debug!(
                        position = index,
                        stage = %stage.name(),
                        payload_size = output.len(),
                        "Stage call result"
                    );
                    current = output;
                    StageOutcome::Applied
                }
                Err(e) => {
                    let err = TaskqError::StageExecution {
                        stage: stage.name().to_string(),
                        reason: e.to_string(),
                    };
                    tracing::error!(
                        position = index,
                        stage = %stage.name(),
                        kind = %stage.kind(),
                        error = %err,
                        "Stage failed, passing payload on unchanged"
                    );
                    StageOutcome::Skipped {
                        error: e.to_string(),
                    }
                }
            };

            stage_metrics.push(StageMetrics {
                index,
                name: stage.name().to_string(),
                outcome,
                duration_ms: stage_start.elapsed().as_millis(),
            });
        }

        PipelineRun {
            payload: current,
            metrics: PipelineMetrics {
                total_duration_ms: total_start.elapsed().as_millis(),
                stages: stage_metrics,
            },
        }
    }
}
