//! TaskQ: a queue subscriber that threads each task payload through a
//! configured chain of stages.
//!
//! ```text
//! queue ──pop──→ Consumer ──spawn──→ PipelineExecutor ──→ stage 1 … stage N
//! ```
//!
//! Stages are resolved by kind from a [`StageRegistry`] and bound once at
//! startup. Each dequeued message runs in its own task; a failing stage is
//! skipped without affecting the rest of the chain or other messages.

pub mod config;
pub mod consumer;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod queue;
pub mod runtime;
pub mod stages;

#[cfg(test)]
mod test_support;

pub use config::{PipelineSpec, StageSpec, SubscriberConfig};
pub use consumer::{Consumer, DequeueBackoff};
pub use metrics::{MetricsReporter, MetricsSnapshot, SubscriberMetrics};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineExecutor, PipelineRun, Stage};
pub use queue::{MemoryQueue, MemoryQueueSender, QueueSource, RedisQueue};
pub use runtime::{SharedContext, SubscriberContext, SubscriberRuntime};
pub use stages::StageRegistry;
pub use taskq_shared::{Message, Payload, TaskqError, TaskqResult, constants};
