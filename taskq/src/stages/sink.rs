//! Terminal sink: makes the final payload observable in the logs.

use crate::pipeline::Stage;
use crate::stages::StageDescriptor;
use async_trait::async_trait;
use serde::Deserialize;
use taskq_shared::{Payload, TaskqResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    #[serde(default)]
    pub level: LogLevel,
    /// Truncate the logged payload to this many bytes.
    #[serde(default)]
    pub max_bytes: Option<usize>,
}

/// Logs the payload and passes it on unchanged.
#[derive(Default)]
pub struct Log;

#[async_trait]
impl Stage for Log {
    const KIND: &'static str = "log";
    type Config = LogConfig;

    async fn transform(&self, payload: &[u8], config: &LogConfig) -> TaskqResult<Payload> {
        let shown = match config.max_bytes {
            Some(max) if payload.len() > max => &payload[..max],
            _ => payload,
        };
        let text = String::from_utf8_lossy(shown);
        let size = payload.len();

        match config.level {
            LogLevel::Trace => tracing::trace!(payload_size = size, payload = %text, "Pipeline result"),
            LogLevel::Debug => tracing::debug!(payload_size = size, payload = %text, "Pipeline result"),
            LogLevel::Info => tracing::info!(payload_size = size, payload = %text, "Pipeline result"),
            LogLevel::Warn => tracing::warn!(payload_size = size, payload = %text, "Pipeline result"),
            LogLevel::Error => tracing::error!(payload_size = size, payload = %text, "Pipeline result"),
        }

        Ok(payload.to_vec())
    }
}

inventory::submit! { StageDescriptor::of::<Log>() }

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::bind;
    use serde_json::json;

    #[tokio::test]
    async fn test_log_passes_payload_through() {
        let transform = bind::<Log>(&json!({"level": "warn", "max_bytes": 2})).unwrap();
        assert_eq!(transform.call(b"hello").await.unwrap(), b"hello");
    }

    #[test]
    fn test_log_level_parsing() {
        let config: LogConfig = serde_json::from_value(json!({"level": "debug"})).unwrap();
        assert_eq!(config.level, LogLevel::Debug);
        assert!(serde_json::from_value::<LogConfig>(json!({"level": "loud"})).is_err());
    }
}
