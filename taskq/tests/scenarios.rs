//! End-to-end runs through `MemoryQueue` and the consumer.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use taskq::config::{BackoffOptions, ConsumerOptions, MetricsOptions};
use taskq::pipeline::{BoxedTransform, StageTransform};
use taskq::{
    MemoryQueue, MemoryQueueSender, Payload, StageRegistry, SubscriberConfig, SubscriberRuntime,
    TaskqResult,
};
use tokio::sync::{Notify, mpsc};

/// Terminal stage that forwards every payload it sees to the test.
struct Collect(mpsc::UnboundedSender<Payload>);

#[async_trait]
impl StageTransform for Collect {
    async fn call(&self, payload: &[u8]) -> TaskqResult<Payload> {
        let _ = self.0.send(payload.to_vec());
        Ok(payload.to_vec())
    }
}

/// Tracks how many calls overlap.
#[derive(Default)]
struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

struct Slow(Arc<Gauge>);

#[async_trait]
impl StageTransform for Slow {
    async fn call(&self, payload: &[u8]) -> TaskqResult<Payload> {
        let now = self.0.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.0.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.0.current.fetch_sub(1, Ordering::SeqCst);
        Ok(payload.to_vec())
    }
}

/// Holds `slow` payloads until released; everything else passes straight through.
struct Gate(Arc<Notify>);

#[async_trait]
impl StageTransform for Gate {
    async fn call(&self, payload: &[u8]) -> TaskqResult<Payload> {
        if payload == b"slow" {
            self.0.notified().await;
        }
        Ok(payload.to_vec())
    }
}

fn registry_with_collector() -> (StageRegistry, mpsc::UnboundedReceiver<Payload>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut registry = StageRegistry::with_builtins();
    registry.register_factory("collect", move |_| {
        let transform: BoxedTransform = Box::new(Collect(tx.clone()));
        Ok(transform)
    });
    (registry, rx)
}

fn runtime(
    pipeline_json: &str,
    registry: &StageRegistry,
) -> (SubscriberRuntime, MemoryQueueSender) {
    let mut config =
        SubscriberConfig::from_json(&format!(r#"{{"pipeline": {}}}"#, pipeline_json)).unwrap();
    config.consumer.backoff = BackoffOptions::immediate();

    let (queue, sender) = MemoryQueue::new("junk");
    let runtime = SubscriberRuntime::new(&config, registry, Arc::new(queue)).unwrap();
    (runtime, sender)
}

async fn collect(rx: &mut mpsc::UnboundedReceiver<Payload>, count: usize) -> Vec<Payload> {
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let payload = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("pipeline did not finish in time")
            .expect("collector dropped");
        out.push(payload);
    }
    out
}

#[tokio::test]
async fn test_uppercase_then_reverse() {
    let (registry, mut rx) = registry_with_collector();
    let (runtime, sender) = runtime(
        r#"[
            {"name": "up", "stage": "uppercase"},
            {"name": "rev", "stage": "reverse"},
            {"name": "out", "stage": "collect"}
        ]"#,
        &registry,
    );

    sender.push("abc").unwrap();
    drop(sender);
    runtime.run().await.unwrap();

    assert_eq!(collect(&mut rx, 1).await, vec![b"CBA".to_vec()]);
}

#[tokio::test]
async fn test_failing_stage_is_skipped() {
    let (registry, mut rx) = registry_with_collector();
    let (runtime, sender) = runtime(
        r#"[
            {"name": "up", "stage": "uppercase", "config": {"fail_on_empty": true}},
            {"name": "rev", "stage": "reverse"},
            {"name": "out", "stage": "collect"}
        ]"#,
        &registry,
    );

    sender.push("").unwrap();
    drop(sender);
    runtime.run().await.unwrap();

    assert_eq!(collect(&mut rx, 1).await, vec![Vec::<u8>::new()]);

    // Give the task a moment to fold its metrics after the last stage.
    let metrics = runtime.metrics();
    for _ in 0..100 {
        if metrics.index() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.index, 1);
    assert_eq!(snapshot.warnings, 1);
    assert_eq!(snapshot.errors, 1);
    assert_eq!(snapshot.success, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_messages_each_counted_once() {
    let (registry, mut rx) = registry_with_collector();
    let (runtime, sender) = runtime(
        r#"[
            {"name": "id", "stage": "identity"},
            {"name": "out", "stage": "collect"}
        ]"#,
        &registry,
    );
    let before = runtime.metrics().incoming();

    sender.push("x").unwrap();
    sender.push("y").unwrap();
    drop(sender);
    runtime.run().await.unwrap();

    let mut seen = collect(&mut rx, 2).await;
    seen.sort();
    assert_eq!(seen, vec![b"x".to_vec(), b"y".to_vec()]);
    assert_eq!(runtime.metrics().incoming(), before + 2);
}

#[tokio::test]
async fn test_declared_order_is_execution_order() {
    let (registry, mut rx) = registry_with_collector();
    let (runtime, sender) = runtime(
        r#"[
            {"name": "A", "stage": "append", "config": {"suffix": "A"}},
            {"name": "B", "stage": "append", "config": {"suffix": "B"}},
            {"name": "C", "stage": "append", "config": {"suffix": "C"}},
            {"name": "out", "stage": "collect"}
        ]"#,
        &registry,
    );

    for _ in 0..20 {
        sender.push("").unwrap();
    }
    drop(sender);
    runtime.run().await.unwrap();

    for payload in collect(&mut rx, 20).await {
        assert_eq!(payload, b"ABC");
    }
}

#[tokio::test]
async fn test_keyed_pipeline_follows_order_list() {
    let (registry, mut rx) = registry_with_collector();
    let (runtime, sender) = runtime(
        r#"{
            "stages": {
                "a": {"stage": "append", "config": {"suffix": "a"}},
                "b": {"stage": "append", "config": {"suffix": "b"}},
                "out": {"stage": "collect"}
            },
            "order": ["b", "a", "out"]
        }"#,
        &registry,
    );

    sender.push(">").unwrap();
    drop(sender);
    runtime.run().await.unwrap();

    assert_eq!(collect(&mut rx, 1).await, vec![b">ba".to_vec()]);
}

#[tokio::test]
async fn test_dequeue_errors_do_not_stop_consumer() {
    let (registry, mut rx) = registry_with_collector();
    let (runtime, sender) = runtime(r#"[{"name": "out", "stage": "collect"}]"#, &registry);

    for i in 0..50 {
        sender.push_error(format!("connection reset #{}", i)).unwrap();
    }
    sender.push("after").unwrap();
    drop(sender);
    runtime.run().await.unwrap();

    assert_eq!(collect(&mut rx, 1).await, vec![b"after".to_vec()]);
    let snapshot = runtime.metrics().snapshot();
    assert_eq!(snapshot.dequeue_errors, 50);
    assert_eq!(snapshot.incoming, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_in_flight_limit_caps_concurrency() {
    let gauge = Arc::new(Gauge::default());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut registry = StageRegistry::new();
    {
        let gauge = Arc::clone(&gauge);
        registry.register_factory("slow", move |_| {
            let transform: BoxedTransform = Box::new(Slow(Arc::clone(&gauge)));
            Ok(transform)
        });
    }
    registry.register_factory("collect", move |_| {
        let transform: BoxedTransform = Box::new(Collect(tx.clone()));
        Ok(transform)
    });

    let config = SubscriberConfig::from_json(
        r#"{"pipeline": [
            {"name": "slow", "stage": "slow"},
            {"name": "out", "stage": "collect"}
        ]}"#,
    )
    .unwrap();
    let pipeline = taskq::PipelineBuilder::from_spec(&config.pipeline, &registry).unwrap();
    let (queue, sender) = MemoryQueue::new("junk");
    let runtime = SubscriberRuntime::with_pipeline(
        pipeline,
        ConsumerOptions {
            max_in_flight: 2,
            backoff: BackoffOptions::immediate(),
        },
        MetricsOptions::default(),
        Arc::new(queue),
    );

    for i in 0..8 {
        sender.push(format!("m{}", i)).unwrap();
    }
    drop(sender);
    runtime.run().await.unwrap();

    assert_eq!(collect(&mut rx, 8).await.len(), 8);
    assert!(gauge.peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_blocked_stage_stalls_only_its_own_message() {
    let release = Arc::new(Notify::new());
    let (mut registry, mut rx) = registry_with_collector();
    {
        let release = Arc::clone(&release);
        registry.register_factory("gate", move |_| {
            let transform: BoxedTransform = Box::new(Gate(Arc::clone(&release)));
            Ok(transform)
        });
    }

    let config = SubscriberConfig::from_json(
        r#"{"pipeline": [
            {"name": "gate", "stage": "gate"},
            {"name": "out", "stage": "collect"}
        ]}"#,
    )
    .unwrap();
    let pipeline = taskq::PipelineBuilder::from_spec(&config.pipeline, &registry).unwrap();
    let (queue, sender) = MemoryQueue::new("junk");
    let runtime = SubscriberRuntime::with_pipeline(
        pipeline,
        ConsumerOptions {
            max_in_flight: 0,
            backoff: BackoffOptions::immediate(),
        },
        MetricsOptions::default(),
        Arc::new(queue),
    );

    sender.push("slow").unwrap();
    sender.push("fast").unwrap();
    drop(sender);
    runtime.run().await.unwrap();

    assert_eq!(collect(&mut rx, 1).await, vec![b"fast".to_vec()]);
    let metrics = runtime.metrics();
    assert_eq!(metrics.incoming(), 2);
    assert!(metrics.index() <= 1);

    release.notify_one();
    assert_eq!(collect(&mut rx, 1).await, vec![b"slow".to_vec()]);
}
