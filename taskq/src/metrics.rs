//! Process-wide subscriber counters and periodic reporting.
//!
//! All counters are monotonic `AtomicU64`s updated with relaxed ordering;
//! they never reset, so delta calculation is the reader's responsibility.

use crate::pipeline::PipelineMetrics;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Lock-free counters shared by the dequeue loop and every pipeline task.
#[derive(Debug)]
pub struct SubscriberMetrics {
    /// Messages successfully dequeued.
    incoming: AtomicU64,
    /// Pipeline runs finished.
    index: AtomicU64,
    /// Runs where every stage applied.
    success: AtomicU64,
    /// Runs finished with at least one skipped stage.
    warnings: AtomicU64,
    /// Individual stage execution failures.
    errors: AtomicU64,
    /// Failed dequeue attempts.
    dequeue_errors: AtomicU64,
    started: DateTime<Utc>,
}

impl Default for SubscriberMetrics {
    fn default() -> Self {
        Self {
            incoming: AtomicU64::new(0),
            index: AtomicU64::new(0),
            success: AtomicU64::new(0),
            warnings: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            dequeue_errors: AtomicU64::new(0),
            started: Utc::now(),
        }
    }
}

impl SubscriberMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Count one dequeued message and return its 1-based sequence number.
    pub fn record_incoming(&self) -> u64 {
        self.incoming.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_dequeue_error(&self) {
        self.dequeue_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Fold one finished pipeline run into the counters.
    pub fn record_run(&self, run: &PipelineMetrics) {
        let failures = run.failure_count() as u64;
        if failures == 0 {
            self.success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.warnings.fetch_add(1, Ordering::Relaxed);
            self.errors.fetch_add(failures, Ordering::Relaxed);
        }
        self.index.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incoming(&self) -> u64 {
        self.incoming.load(Ordering::Relaxed)
    }

    pub fn index(&self) -> u64 {
        self.index.load(Ordering::Relaxed)
    }

    pub fn started(&self) -> DateTime<Utc> {
        self.started
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let incoming = self.incoming.load(Ordering::Relaxed);
        let index = self.index.load(Ordering::Relaxed);

        MetricsSnapshot {
            incoming,
            index,
            in_flight: incoming.saturating_sub(index),
            success: self.success.load(Ordering::Relaxed),
            warnings: self.warnings.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            dequeue_errors: self.dequeue_errors.load(Ordering::Relaxed),
            started: self.started,
            uptime_secs: (Utc::now() - self.started).num_seconds().max(0) as u64,
        }
    }
}

/// Point-in-time copy of [`SubscriberMetrics`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub incoming: u64,
    pub index: u64,
    /// Dequeued messages whose pipeline has not finished yet.
    pub in_flight: u64,
    pub success: u64,
    pub warnings: u64,
    pub errors: u64,
    pub dequeue_errors: u64,
    pub started: DateTime<Utc>,
    pub uptime_secs: u64,
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Incoming: {} | Finished: {} | In flight: {} | Success: {} | Warnings: {} | \
             Errors: {} | Dequeue errors: {} | Started: {} | Uptime: {}s",
            self.incoming,
            self.index,
            self.in_flight,
            self.success,
            self.warnings,
            self.errors,
            self.dequeue_errors,
            self.started.to_rfc3339(),
            self.uptime_secs,
        )
    }
}

/// Periodic metrics reporter (verbose mode only).
pub struct MetricsReporter {
    metrics: Arc<SubscriberMetrics>,
    interval: Duration,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<SubscriberMetrics>, interval: Duration) -> Self {
        Self { metrics, interval }
    }

    /// Log a snapshot every interval, forever.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + self.interval,
            self.interval,
        );

        loop {
            ticker.tick().await;
            let snapshot = self.metrics.snapshot();
            tracing::debug!(
                incoming = snapshot.incoming,
                index = snapshot.index,
                in_flight = snapshot.in_flight,
                success = snapshot.success,
                warnings = snapshot.warnings,
                errors = snapshot.errors,
                dequeue_errors = snapshot.dequeue_errors,
                started = %snapshot.started.to_rfc3339(),
                "Metrics"
            );
        }
    }

    /// Run the reporter on the current tokio runtime.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{StageMetrics, StageOutcome};

    fn run_with(outcomes: &[bool]) -> PipelineMetrics {
        PipelineMetrics {
            total_duration_ms: 0,
            stages: outcomes
                .iter()
                .enumerate()
                .map(|(index, applied)| StageMetrics {
                    index,
                    name: format!("s{}", index),
                    outcome: if *applied {
                        StageOutcome::Applied
                    } else {
                        StageOutcome::Skipped {
                            error: "boom".into(),
                        }
                    },
                    duration_ms: 0,
                })
                .collect(),
        }
    }

    #[test]
    fn test_record_incoming_returns_sequence() {
        let metrics = SubscriberMetrics::new();
        assert_eq!(metrics.record_incoming(), 1);
        assert_eq!(metrics.record_incoming(), 2);
        assert_eq!(metrics.incoming(), 2);
    }

    #[test]
    fn test_record_run_outcomes() {
        let metrics = SubscriberMetrics::new();
        metrics.record_incoming();
        metrics.record_incoming();
        metrics.record_incoming();
        metrics.record_run(&run_with(&[true, true]));
        metrics.record_run(&run_with(&[false, true, false]));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.incoming, 3);
        assert_eq!(snapshot.index, 2);
        assert_eq!(snapshot.in_flight, 1);
        assert_eq!(snapshot.success, 1);
        assert_eq!(snapshot.warnings, 1);
        assert_eq!(snapshot.errors, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_are_not_lost() {
        let metrics = SubscriberMetrics::new();
        let mut handles = Vec::new();
        for _ in 0..16 {
            let metrics = Arc::clone(&metrics);
            handles.push(tokio::spawn(async move {
                for _ in 0..1000 {
                    metrics.record_incoming();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(metrics.incoming(), 16_000);
    }

    #[test]
    fn test_snapshot_display_and_json() {
        let metrics = SubscriberMetrics::new();
        metrics.record_dequeue_error();
        let snapshot = metrics.snapshot();

        assert!(snapshot.to_string().contains("Dequeue errors: 1"));
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["dequeue_errors"], 1);
    }
}
