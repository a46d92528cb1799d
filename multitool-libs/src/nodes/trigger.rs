//! Trigger source: emits a timestamped event, manually or on an interval.
//!
//! The repeating schedule itself is owned by the executor
//! (`Executor::start_trigger`); this module only produces the event.

use crate::catalog::NodeKind;
use crate::config::{InputFieldConfig, InputFieldType};
use crate::error::NodeError;
use crate::node::{merge_config, parse_config, NodeBehavior, NodeRole};
use crate::payload::Payload;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Shortest accepted firing interval
pub const MIN_INTERVAL_MS: u64 = 100;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Firing period; manual-only when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
}

impl TriggerConfig {
    pub fn interval(&self) -> Option<Duration> {
        self.interval_ms.map(Duration::from_millis)
    }

    fn check(&self) -> Result<(), NodeError> {
        match self.interval_ms {
            Some(ms) if ms < MIN_INTERVAL_MS => Err(NodeError::MalformedConfig(format!(
                "interval_ms must be at least {}",
                MIN_INTERVAL_MS
            ))),
            _ => Ok(()),
        }
    }
}

/// Reads the firing interval out of a trigger node's JSON config
pub fn interval_from_config(config: &Value) -> Result<Duration, NodeError> {
    let config: TriggerConfig = parse_config(config)?;
    config.check()?;
    config
        .interval()
        .ok_or_else(|| NodeError::MissingRequiredField("interval_ms".to_string()))
}

pub struct TriggerNode {
    config: TriggerConfig,
}

impl TriggerNode {
    pub fn new(config: TriggerConfig) -> Self {
        Self { config }
    }

    pub fn from_value(config: &Value) -> Result<Self, NodeError> {
        let config: TriggerConfig = parse_config(config)?;
        config.check()?;
        Ok(Self::new(config))
    }

    pub fn fields() -> Vec<InputFieldConfig> {
        vec![InputFieldConfig::new(
            "interval_ms",
            "Interval (ms, empty for manual)",
            InputFieldType::Number,
        )]
    }
}

#[async_trait]
impl NodeBehavior for TriggerNode {
    fn kind(&self) -> &str {
        NodeKind::Trigger.as_str()
    }

    fn role(&self) -> NodeRole {
        NodeRole::Source
    }

    fn config(&self) -> Value {
        serde_json::to_value(&self.config).unwrap_or_default()
    }

    fn update_config(&mut self, patch: &Value) -> Result<(), NodeError> {
        let config = merge_config(&self.config, patch)?;
        config.check()?;
        self.config = config;
        Ok(())
    }

    async fn process(&self, _input: Option<&Payload>) -> Result<Payload, NodeError> {
        Ok(Payload::Trigger {
            timestamp: Utc::now(),
        })
    }
}
