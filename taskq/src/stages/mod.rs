//! Compiled-in stage kinds and the registry that resolves them by name.
//!
//! Built-in kinds submit a [`StageDescriptor`] through `inventory`, so
//! [`StageRegistry::with_builtins`] picks up every kind linked into the
//! binary. Embedders add their own kinds with [`StageRegistry::register`]
//! or [`StageRegistry::register_factory`] before loading a pipeline.

mod exec;
mod sink;
mod text;

pub use exec::{Exec, ExecConfig};
pub use sink::{Log, LogConfig, LogLevel};
pub use text::{
    Append, AppendConfig, Identity, Lowercase, NoConfig, Prepend, PrependConfig, Replace,
    ReplaceConfig, Reverse, Uppercase, UppercaseConfig,
};

use crate::config::StageSpec;
use crate::pipeline::{BoxedTransform, LoadedStage, Stage, bind};
use std::collections::HashMap;
use std::sync::Arc;
use taskq_shared::{TaskqError, TaskqResult};

/// Signature of a stage binding function.
pub type BindFn = fn(&serde_json::Value) -> TaskqResult<BoxedTransform>;

/// Binding function that may capture state.
pub type StageFactory =
    Arc<dyn Fn(&serde_json::Value) -> TaskqResult<BoxedTransform> + Send + Sync>;

/// Link-time registration record for a stage kind.
pub struct StageDescriptor {
    pub kind: &'static str,
    pub bind: BindFn,
}

impl StageDescriptor {
    pub const fn of<S: Stage>() -> Self {
        Self {
            kind: S::KIND,
            bind: bind::<S>,
        }
    }
}

inventory::collect!(StageDescriptor);

/// Named stage kinds available to a pipeline.
#[derive(Clone, Default)]
pub struct StageRegistry {
    factories: HashMap<String, StageFactory>,
}

impl StageRegistry {
    /// Registry without any kinds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every kind submitted through `inventory`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for descriptor in inventory::iter::<StageDescriptor> {
            registry.insert(descriptor.kind, Arc::new(descriptor.bind));
        }
        registry
    }

    pub fn register<S: Stage>(&mut self) -> &mut Self {
        self.insert(S::KIND, Arc::new(bind::<S>));
        self
    }

    pub fn register_factory<F>(&mut self, kind: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&serde_json::Value) -> TaskqResult<BoxedTransform> + Send + Sync + 'static,
    {
        let kind = kind.into();
        self.insert(&kind, Arc::new(factory));
        self
    }

    fn insert(&mut self, kind: &str, factory: StageFactory) {
        if self.factories.insert(kind.to_string(), factory).is_some() {
            tracing::warn!(kind = %kind, "Stage kind registered twice, keeping the latest");
        }
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered kind names, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Resolve one declaration to a bound stage.
    pub fn load(&self, spec: &StageSpec) -> TaskqResult<LoadedStage> {
        let factory = self.factories.get(&spec.stage).ok_or_else(|| {
            TaskqError::stage_bind(
                &spec.name,
                format!(
                    "unknown stage kind '{}' (available: {})",
                    spec.stage,
                    self.kinds().join(", ")
                ),
            )
        })?;

        let transform = factory(&spec.config).map_err(|e| match e {
            TaskqError::StageBind { .. } => e,
            TaskqError::Config(reason) => TaskqError::stage_bind(&spec.name, reason),
            other => TaskqError::stage_bind(&spec.name, other),
        })?;

        Ok(LoadedStage::new(
            &spec.name,
            &spec.stage,
            spec.config.clone(),
            transform,
        ))
    }
}

impl std::fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
