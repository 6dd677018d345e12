//! Subscriber runtime: owns the bound pipeline, the metrics and the consumer.

use crate::config::{ConsumerOptions, MetricsOptions, SubscriberConfig};
use crate::consumer::Consumer;
use crate::metrics::{MetricsReporter, SubscriberMetrics};
use crate::pipeline::{Pipeline, PipelineBuilder};
use crate::queue::QueueSource;
use crate::stages::StageRegistry;
use std::future::Future;
use std::sync::Arc;
use taskq_shared::TaskqResult;

/// State shared by the dequeue loop and every pipeline task.
///
/// Built once during startup and read-only afterwards.
#[derive(Debug)]
pub struct SubscriberContext {
    pub pipeline: Pipeline,
    pub metrics: Arc<SubscriberMetrics>,
    pub options: ConsumerOptions,
}

pub type SharedContext = Arc<SubscriberContext>;

/// Builds the pipeline before any message is consumed, then drives the
/// consumer.
pub struct SubscriberRuntime {
    ctx: SharedContext,
    consumer: Consumer,
    metrics_options: MetricsOptions,
}

impl SubscriberRuntime {
    /// Bind every configured stage. A bind failure aborts startup.
    pub fn new(
        config: &SubscriberConfig,
        registry: &StageRegistry,
        queue: Arc<dyn QueueSource>,
    ) -> TaskqResult<Self> {
        let pipeline = PipelineBuilder::from_spec(&config.pipeline, registry)?;
        Ok(Self::with_pipeline(
            pipeline,
            config.consumer.clone(),
            config.metrics.clone(),
            queue,
        ))
    }

    pub fn with_pipeline(
        pipeline: Pipeline,
        options: ConsumerOptions,
        metrics_options: MetricsOptions,
        queue: Arc<dyn QueueSource>,
    ) -> Self {
        let ctx = Arc::new(SubscriberContext {
            pipeline,
            metrics: SubscriberMetrics::new(),
            options,
        });
        let consumer = Consumer::new(Arc::clone(&ctx), queue);

        Self {
            ctx,
            consumer,
            metrics_options,
        }
    }

    pub fn context(&self) -> &SharedContext {
        &self.ctx
    }

    pub fn metrics(&self) -> Arc<SubscriberMetrics> {
        Arc::clone(&self.ctx.metrics)
    }

    /// Start the periodic metrics reporter on the current runtime.
    pub fn start_reporter(&self) -> tokio::task::JoinHandle<()> {
        tracing::debug!(
            interval_secs = self.metrics_options.interval().as_secs(),
            "Starting metrics reporter"
        );
        MetricsReporter::new(self.metrics(), self.metrics_options.interval()).spawn()
    }

    pub async fn run(&self) -> TaskqResult<()> {
        self.consumer.run().await
    }

    pub async fn run_until<F>(&self, shutdown: F) -> TaskqResult<()>
    where
        F: Future<Output = ()>,
    {
        self.consumer.run_until(shutdown).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryQueue;

    #[tokio::test]
    async fn test_bind_failure_aborts_before_consuming() {
        let config = SubscriberConfig::from_json(
            r#"{"pipeline": [{"name": "ghost", "stage": "no-such-kind"}]}"#,
        )
        .unwrap();
        let (queue, sender) = MemoryQueue::new("junk");
        sender.push(b"never".to_vec()).unwrap();

        let result = SubscriberRuntime::new(&config, &StageRegistry::with_builtins(), Arc::new(queue));
        let err = result.err().unwrap();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_run_stops_when_queue_closes() {
        let config = SubscriberConfig::from_json(
            r#"{"pipeline": [{"name": "up", "stage": "uppercase"}]}"#,
        )
        .unwrap();
        let (queue, sender) = MemoryQueue::new("junk");
        sender.push(b"abc".to_vec()).unwrap();
        drop(sender);

        let runtime =
            SubscriberRuntime::new(&config, &StageRegistry::with_builtins(), Arc::new(queue))
                .unwrap();
        runtime.run().await.unwrap();
        assert_eq!(runtime.metrics().incoming(), 1);
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let config = SubscriberConfig::from_json(r#"{"pipeline": []}"#).unwrap();
        let (queue, _sender) = MemoryQueue::new("junk");

        let runtime =
            SubscriberRuntime::new(&config, &StageRegistry::with_builtins(), Arc::new(queue))
                .unwrap();
        runtime.run_until(async {}).await.unwrap();
        assert_eq!(runtime.metrics().incoming(), 0);
    }
}
