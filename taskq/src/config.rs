//! Subscriber configuration.
//!
//! Parsed once at startup from a JSON file and never mutated afterwards,
//! except for the queue defaults applied by [`SubscriberConfig::apply_queue_defaults`].

use serde::{Deserialize, Deserializer, Serialize, de};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use taskq_shared::constants::{consumer as consumer_const, metrics as metrics_const, queue};
use taskq_shared::{TaskqError, TaskqResult};

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriberConfig {
    /// Stage declarations. `plugins` is the legacy key.
    #[serde(alias = "plugins")]
    pub pipeline: PipelineSpec,
    /// Queue endpoint. `redis` is the legacy key.
    #[serde(default, alias = "redis")]
    pub queue: QueueConfig,
    #[serde(default)]
    pub consumer: ConsumerOptions,
    #[serde(default)]
    pub metrics: MetricsOptions,
    #[serde(default)]
    pub logging: LoggingOptions,
}

impl SubscriberConfig {
    /// Read and decode a configuration file.
    pub fn from_file(path: &Path) -> TaskqResult<Self> {
        tracing::info!(path = %path.display(), "Reading configuration file");

        let raw = std::fs::read_to_string(path).map_err(|e| {
            TaskqError::Config(format!(
                "failed to read configuration file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config = Self::from_json(&raw).map_err(|e| match e {
            TaskqError::Config(reason) => {
                TaskqError::Config(format!("{}: {}", path.display(), reason))
            }
            other => other,
        })?;

        tracing::debug!(config = ?config, "Configuration loaded");
        Ok(config)
    }

    pub fn from_json(raw: &str) -> TaskqResult<Self> {
        serde_json::from_str(raw).map_err(|e| TaskqError::Config(e.to_string()))
    }

    /// Fill in the queue address and channel.
    ///
    /// Address precedence: `address_override` (CLI), then the file, then
    /// [`queue::DEFAULT_ADDRESS`].
    pub fn apply_queue_defaults(&mut self, address_override: Option<String>) {
        if let Some(address) = address_override {
            self.queue.address = Some(address);
        } else if self.queue.address.is_none() {
            tracing::debug!(
                address = queue::DEFAULT_ADDRESS,
                "Setting queue address to default value"
            );
            self.queue.address = Some(queue::DEFAULT_ADDRESS.to_string());
        }

        if self.queue.channel.as_deref().is_none_or(str::is_empty) {
            tracing::debug!(
                channel = queue::DEFAULT_CHANNEL,
                "Setting queue channel to default value"
            );
            self.queue.channel = Some(queue::DEFAULT_CHANNEL.to_string());
        }
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

/// The configured set of stage declarations.
///
/// A JSON array is the ordered shape, an object the name-keyed shape.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum PipelineSpec {
    /// Stages run in declaration order.
    Ordered(Vec<StageSpec>),
    /// Stages looked up by name; execution order comes from `order` only.
    Keyed {
        stages: BTreeMap<String, KeyedStageSpec>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        order: Option<Vec<String>>,
    },
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct KeyedShape {
    stages: BTreeMap<String, KeyedStageSpec>,
    #[serde(default)]
    order: Option<Vec<String>>,
}

// Dispatch on the JSON shape so field errors inside a stage are reported
// as-is instead of as a generic variant mismatch.
impl<'de> Deserialize<'de> for PipelineSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = serde_json::Value::deserialize(deserializer)?;
        match raw {
            serde_json::Value::Array(_) => serde_json::from_value(raw)
                .map(PipelineSpec::Ordered)
                .map_err(|e| de::Error::custom(format!("ordered pipeline: {}", e))),
            serde_json::Value::Object(_) => serde_json::from_value::<KeyedShape>(raw)
                .map(|keyed| PipelineSpec::Keyed {
                    stages: keyed.stages,
                    order: keyed.order,
                })
                .map_err(|e| de::Error::custom(format!("keyed pipeline: {}", e))),
            other => Err(de::Error::custom(format!(
                "pipeline must be a list of stages or an object with 'stages', found {}",
                other
            ))),
        }
    }
}

impl PipelineSpec {
    pub fn len(&self) -> usize {
        match self {
            PipelineSpec::Ordered(stages) => stages.len(),
            PipelineSpec::Keyed { stages, .. } => stages.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One stage declaration in the ordered shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSpec {
    /// Unique stage name used in logs.
    #[serde(alias = "command")]
    pub name: String,
    /// Registered stage kind implementing this stage.
    #[serde(alias = "filename")]
    pub stage: String,
    /// Stage-private configuration, opaque to the pipeline.
    #[serde(default)]
    pub config: serde_json::Value,
}

impl StageSpec {
    pub fn new(name: impl Into<String>, stage: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stage: stage.into(),
            config: serde_json::Value::Null,
        }
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }
}

/// One stage declaration in the name-keyed shape (name is the map key).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyedStageSpec {
    #[serde(alias = "filename")]
    pub stage: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

impl KeyedStageSpec {
    pub(crate) fn named(&self, name: &str) -> StageSpec {
        StageSpec {
            name: name.to_string(),
            stage: self.stage.clone(),
            config: self.config.clone(),
        }
    }
}

// ============================================================================
// QUEUE
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueConfig {
    /// `host:port` of the queue service.
    #[serde(default)]
    pub address: Option<String>,
    /// List key popped by the consumer.
    #[serde(default)]
    pub channel: Option<String>,
}

impl QueueConfig {
    pub fn address(&self) -> &str {
        self.address.as_deref().unwrap_or(queue::DEFAULT_ADDRESS)
    }

    pub fn channel(&self) -> &str {
        match self.channel.as_deref() {
            Some(channel) if !channel.is_empty() => channel,
            _ => queue::DEFAULT_CHANNEL,
        }
    }

    /// Resolve the configured address to a socket address.
    pub async fn resolve_address(&self) -> TaskqResult<SocketAddr> {
        let address = self.address();
        let resolved: Vec<SocketAddr> = tokio::net::lookup_host(address)
            .await
            .map_err(|e| TaskqError::QueueAddress(format!("{}: {}", address, e)))?
            .collect();

        // Prefer IPv4 like the queue service's default bind.
        resolved
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| resolved.first())
            .copied()
            .ok_or_else(|| {
                TaskqError::QueueAddress(format!("{}: no addresses resolved", address))
            })
    }
}

// ============================================================================
// CONSUMER / METRICS / LOGGING
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerOptions {
    /// Maximum concurrent pipeline tasks. `0` means unbounded.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    #[serde(default)]
    pub backoff: BackoffOptions,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            backoff: BackoffOptions::default(),
        }
    }
}

fn default_max_in_flight() -> usize {
    consumer_const::DEFAULT_MAX_IN_FLIGHT
}

/// Delay policy applied after a failed dequeue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffOptions {
    #[serde(default = "default_backoff_initial_ms")]
    pub initial_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub max_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub multiplier: f64,
}

impl BackoffOptions {
    /// Retry immediately after every failure.
    pub fn immediate() -> Self {
        Self {
            initial_ms: 0,
            max_ms: 0,
            multiplier: 1.0,
        }
    }

    pub fn initial(&self) -> Duration {
        Duration::from_millis(self.initial_ms)
    }

    pub fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms.max(self.initial_ms))
    }
}

impl Default for BackoffOptions {
    fn default() -> Self {
        Self {
            initial_ms: default_backoff_initial_ms(),
            max_ms: default_backoff_max_ms(),
            multiplier: default_backoff_multiplier(),
        }
    }
}

fn default_backoff_initial_ms() -> u64 {
    consumer_const::DEFAULT_BACKOFF_INITIAL_MS
}

fn default_backoff_max_ms() -> u64 {
    consumer_const::DEFAULT_BACKOFF_MAX_MS
}

fn default_backoff_multiplier() -> f64 {
    consumer_const::DEFAULT_BACKOFF_MULTIPLIER
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsOptions {
    #[serde(default = "default_report_interval_secs")]
    pub interval_secs: u64,
}

impl MetricsOptions {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl Default for MetricsOptions {
    fn default() -> Self {
        Self {
            interval_secs: default_report_interval_secs(),
        }
    }
}

fn default_report_interval_secs() -> u64 {
    metrics_const::DEFAULT_REPORT_INTERVAL_SECS
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingOptions {
    /// Directory for a daily rolling log file, in addition to stdout.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}
