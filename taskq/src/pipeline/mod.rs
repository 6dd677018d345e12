//! Pipeline execution framework.
//!
//! ## Architecture
//!
//! ```text
//! PipelineSpec ──→ ExecutionPlan ──→ PipelineBuilder ──→ Pipeline
//!  (config)        (fixed order)     (bind via registry)  (LoadedStage[])
//!
//! payload ──→ stage 1 ──→ stage 2 ──→ ... ──→ stage N ──→ PipelineRun
//!               │ error: logged, input passed on unchanged
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use taskq::pipeline::{PipelineBuilder, PipelineExecutor};
//! use taskq::stages::StageRegistry;
//!
//! let registry = StageRegistry::with_builtins();
//! let pipeline = PipelineBuilder::from_spec(&config.pipeline, &registry)?;
//! let run = PipelineExecutor::execute(&pipeline, b"abc".to_vec()).await;
//! println!("pipeline took {}ms", run.metrics.total_duration_ms);
//! ```

mod metrics;
#[allow(clippy::module_inception)]
mod pipeline;
mod stage;

pub use metrics::{PipelineMetrics, StageMetrics, StageOutcome};
pub use pipeline::{ExecutionPlan, Pipeline, PipelineBuilder, PipelineExecutor, PipelineRun};
pub use stage::{BoxedTransform, LoadedStage, Stage, StageTransform, bind};
