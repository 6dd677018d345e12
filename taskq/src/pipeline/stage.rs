//! Stage contract for pipeline execution.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use taskq_shared::{Payload, TaskqError, TaskqResult};

/// A payload transformation selectable by name from configuration.
///
/// Implement this trait to add a stage kind, then register it with
/// [`StageRegistry`](crate::stages::StageRegistry) or `inventory::submit!`
/// a [`StageDescriptor`](crate::stages::StageDescriptor).
///
/// `Config` is parsed from the stage's raw configuration blob once, at
/// startup, and handed back to every `transform` call.
#[async_trait]
pub trait Stage: Default + Send + Sync + 'static {
    /// Name used in the `stage` field of a declaration.
    const KIND: &'static str;

    /// Stage-private configuration.
    type Config: DeserializeOwned + Send + Sync + 'static;

    /// Transform one payload.
    ///
    /// Returning an error makes the stage a no-op for this payload; the
    /// pipeline continues with `payload` as it was.
    async fn transform(&self, payload: &[u8], config: &Self::Config) -> TaskqResult<Payload>;
}

/// A stage bound to its parsed configuration.
#[async_trait]
pub trait StageTransform: Send + Sync {
    async fn call(&self, payload: &[u8]) -> TaskqResult<Payload>;
}

pub type BoxedTransform = Box<dyn StageTransform>;

struct Bound<S: Stage> {
    stage: S,
    config: S::Config,
}

#[async_trait]
impl<S: Stage> StageTransform for Bound<S> {
    async fn call(&self, payload: &[u8]) -> TaskqResult<Payload> {
        self.stage.transform(payload, &self.config).await
    }
}

/// Parse `raw` into `S::Config` and bind it to a fresh `S`.
///
/// A missing (`null`) configuration is read as an empty object.
pub fn bind<S: Stage>(raw: &serde_json::Value) -> TaskqResult<BoxedTransform> {
    let raw = match raw {
        serde_json::Value::Null => serde_json::Value::Object(Default::default()),
        other => other.clone(),
    };

    let config: S::Config = serde_json::from_value(raw).map_err(|e| {
        TaskqError::Config(format!("invalid configuration for '{}': {}", S::KIND, e))
    })?;

    Ok(Box::new(Bound {
        stage: S::default(),
        config,
    }))
}

/// Runtime binding of one declared stage.
///
/// Built once at startup; shared read-only by every pipeline task.
#[derive(Clone)]
pub struct LoadedStage {
    name: String,
    kind: String,
    config: serde_json::Value,
    transform: Arc<dyn StageTransform>,
}

impl LoadedStage {
    pub fn new(
        name: impl Into<String>,
        kind: impl Into<String>,
        config: serde_json::Value,
        transform: BoxedTransform,
    ) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            config,
            transform: Arc::from(transform),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Raw configuration as declared.
    pub fn config(&self) -> &serde_json::Value {
        &self.config
    }

    pub async fn call(&self, payload: &[u8]) -> TaskqResult<Payload> {
        self.transform.call(payload).await
    }
}

impl std::fmt::Debug for LoadedStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedStage")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("config", &self.config)
            .finish()
    }
}
