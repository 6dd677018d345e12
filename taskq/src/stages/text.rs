//! Text and byte transforms.

use crate::pipeline::Stage;
use crate::stages::StageDescriptor;
use async_trait::async_trait;
use serde::Deserialize;
use taskq_shared::{Payload, TaskqError, TaskqResult};

fn as_utf8<'a>(kind: &str, payload: &'a [u8]) -> TaskqResult<&'a str> {
    std::str::from_utf8(payload)
        .map_err(|e| TaskqError::Stage(format!("{}: payload is not valid UTF-8: {}", kind, e)))
}

/// Configuration for stages that take none.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoConfig {}

// ============================================================================
// identity
// ============================================================================

#[derive(Default)]
pub struct Identity;

#[async_trait]
impl Stage for Identity {
    const KIND: &'static str = "identity";
    type Config = NoConfig;

    async fn transform(&self, payload: &[u8], _config: &NoConfig) -> TaskqResult<Payload> {
        Ok(payload.to_vec())
    }
}

inventory::submit! { StageDescriptor::of::<Identity>() }

// ============================================================================
// uppercase / lowercase
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UppercaseConfig {
    /// Reject empty payloads instead of passing them through.
    #[serde(default)]
    pub fail_on_empty: bool,
}

#[derive(Default)]
pub struct Uppercase;

#[async_trait]
impl Stage for Uppercase {
    const KIND: &'static str = "uppercase";
    type Config = UppercaseConfig;

    async fn transform(&self, payload: &[u8], config: &UppercaseConfig) -> TaskqResult<Payload> {
        if config.fail_on_empty && payload.is_empty() {
            return Err(TaskqError::Stage("uppercase: empty payload".into()));
        }
        Ok(as_utf8(Self::KIND, payload)?.to_uppercase().into_bytes())
    }
}

inventory::submit! { StageDescriptor::of::<Uppercase>() }

#[derive(Default)]
pub struct Lowercase;

#[async_trait]
impl Stage for Lowercase {
    const KIND: &'static str = "lowercase";
    type Config = NoConfig;

    async fn transform(&self, payload: &[u8], _config: &NoConfig) -> TaskqResult<Payload> {
        Ok(as_utf8(Self::KIND, payload)?.to_lowercase().into_bytes())
    }
}

inventory::submit! { StageDescriptor::of::<Lowercase>() }

// ============================================================================
// reverse
// ============================================================================

/// Reverses characters of UTF-8 payloads and raw bytes otherwise.
#[derive(Default)]
pub struct Reverse;

#[async_trait]
impl Stage for Reverse {
    const KIND: &'static str = "reverse";
    type Config = NoConfig;

    async fn transform(&self, payload: &[u8], _config: &NoConfig) -> TaskqResult<Payload> {
        let reversed = match std::str::from_utf8(payload) {
            Ok(text) => text.chars().rev().collect::<String>().into_bytes(),
            Err(_) => payload.iter().rev().copied().collect(),
        };
        Ok(reversed)
    }
}

inventory::submit! { StageDescriptor::of::<Reverse>() }

// ============================================================================
// prepend / append / replace
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrependConfig {
    pub prefix: String,
}

#[derive(Default)]
pub struct Prepend;

#[async_trait]
impl Stage for Prepend {
    const KIND: &'static str = "prepend";
    type Config = PrependConfig;

    async fn transform(&self, payload: &[u8], config: &PrependConfig) -> TaskqResult<Payload> {
        Ok([config.prefix.as_bytes(), payload].concat())
    }
}

inventory::submit! { StageDescriptor::of::<Prepend>() }

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppendConfig {
    pub suffix: String,
}

#[derive(Default)]
pub struct Append;

#[async_trait]
impl Stage for Append {
    const KIND: &'static str = "append";
    type Config = AppendConfig;

    async fn transform(&self, payload: &[u8], config: &AppendConfig) -> TaskqResult<Payload> {
        Ok([payload, config.suffix.as_bytes()].concat())
    }
}

inventory::submit! { StageDescriptor::of::<Append>() }

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplaceConfig {
    pub from: String,
    #[serde(default)]
    pub to: String,
}

#[derive(Default)]
pub struct Replace;

#[async_trait]
impl Stage for Replace {
    const KIND: &'static str = "replace";
    type Config = ReplaceConfig;

    async fn transform(&self, payload: &[u8], config: &ReplaceConfig) -> TaskqResult<Payload> {
        if config.from.is_empty() {
            return Err(TaskqError::Stage("replace: 'from' must not be empty".into()));
        }
        Ok(as_utf8(Self::KIND, payload)?
            .replace(&config.from, &config.to)
            .into_bytes())
    }
}

inventory::submit! { StageDescriptor::of::<Replace>() }
