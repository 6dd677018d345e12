//! Dequeue loop.
//!
//! ```text
//! loop:
//!   pop (blocks, no timeout) ──err──→ log, count, back off, retry
//!     │ ok
//!     ├─ incoming += 1
//!     ├─ acquire in-flight permit (when capped)
//!     └─ spawn task: PipelineExecutor::execute(payload) ─→ record outcome
//! ```
//!
//! The loop never waits for a spawned task. Completion order across
//! messages is unordered.

use crate::config::BackoffOptions;
use crate::pipeline::PipelineExecutor;
use crate::queue::QueueSource;
use crate::runtime::SharedContext;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use taskq_shared::{Message, TaskqError, TaskqResult};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::Instrument;

/// Exponential delay between failed dequeue attempts.
#[derive(Debug, Clone)]
pub struct DequeueBackoff {
    options: BackoffOptions,
    next: Duration,
}

impl DequeueBackoff {
    pub fn new(options: BackoffOptions) -> Self {
        let next = options.initial();
        Self { options, next }
    }

    /// Delay to wait before the next attempt; grows up to the maximum.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        let grown = self.next.as_secs_f64() * self.options.multiplier.max(1.0);
        self.next = Duration::from_secs_f64(grown).min(self.options.max());
        delay
    }

    pub fn reset(&mut self) {
        self.next = self.options.initial();
    }
}

/// Pops messages and fans each one out into its own pipeline task.
pub struct Consumer {
    ctx: SharedContext,
    queue: Arc<dyn QueueSource>,
    limiter: Option<Arc<Semaphore>>,
}

impl Consumer {
    pub fn new(ctx: SharedContext, queue: Arc<dyn QueueSource>) -> Self {
        let max_in_flight = ctx.options.max_in_flight;
        let limiter = (max_in_flight > 0).then(|| Arc::new(Semaphore::new(max_in_flight)));

        Self {
            ctx,
            queue,
            limiter,
        }
    }

    /// Consume until the queue closes. Never returns for a network queue.
    pub async fn run(&self) -> TaskqResult<()> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Consume until `shutdown` resolves or the queue closes.
    ///
    /// In-flight pipeline tasks are not awaited.
    pub async fn run_until<F>(&self, shutdown: F) -> TaskqResult<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut backoff = DequeueBackoff::new(self.ctx.options.backoff.clone());

        tracing::info!(
            channel = %self.queue.channel(),
            max_in_flight = self.ctx.options.max_in_flight,
            stages = self.ctx.pipeline.len(),
            "Consuming from queue"
        );

        loop {
            let popped = tokio::select! {
                _ = &mut shutdown => break,
                popped = self.queue.pop() => popped,
            };

            match popped {
                Ok(message) => {
                    backoff.reset();
                    let index = self.ctx.metrics.record_incoming();
                    tracing::info!(
                        index,
                        channel = %message.channel,
                        payload_size = message.len(),
                        "Received a message"
                    );

                    let permit = tokio::select! {
                        _ = &mut shutdown => {
                            tracing::warn!(index, "Shutdown before dispatch, message dropped");
                            break;
                        }
                        permit = self.acquire_permit() => permit?,
                    };
                    self.dispatch(index, message, permit);
                }
                Err(TaskqError::QueueClosed) => {
                    tracing::info!(channel = %self.queue.channel(), "Queue closed, stopping consumer");
                    break;
                }
                Err(e) => {
                    self.ctx.metrics.record_dequeue_error();
                    let delay = backoff.next_delay();
                    tracing::error!(
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Couldn't fetch message"
                    );

                    if !delay.is_zero() {
                        tokio::select! {
                            _ = &mut shutdown => break,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }
            }
        }

        tracing::info!(
            incoming = self.ctx.metrics.incoming(),
            finished = self.ctx.metrics.index(),
            "Consumer stopped"
        );
        Ok(())
    }

    async fn acquire_permit(&self) -> TaskqResult<Option<OwnedSemaphorePermit>> {
        match &self.limiter {
            Some(limiter) => Arc::clone(limiter)
                .acquire_owned()
                .await
                .map(Some)
                .map_err(|e| TaskqError::Internal(format!("in-flight limiter closed: {}", e))),
            None => Ok(None),
        }
    }

    /// Spawn the pipeline task for one message.
    fn dispatch(&self, index: u64, message: Message, permit: Option<OwnedSemaphorePermit>) {
        let ctx = Arc::clone(&self.ctx);
        let span = tracing::info_span!(
            "message",
            index,
            channel = %message.channel,
            payload_size = message.len()
        );

        tokio::spawn(
            async move {
                let _permit = permit;
                let run = PipelineExecutor::execute(&ctx.pipeline, message.into_payload()).await;
                ctx.metrics.record_run(&run.metrics);
                tracing::debug!(
                    duration_ms = run.metrics.total_duration_ms as u64,
                    failed_stages = run.metrics.failure_count(),
                    payload_size = run.payload.len(),
                    "Pipeline finished"
                );
            }
            .instrument(span),
        );
    }
}
