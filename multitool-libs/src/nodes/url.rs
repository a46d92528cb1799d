//! URL source: records a URL together with its capture time.

use super::require;
use crate::catalog::NodeKind;
use crate::config::{InputFieldConfig, InputFieldType};
use crate::error::NodeError;
use crate::node::{merge_config, parse_config, NodeBehavior, NodeRole};
use crate::payload::Payload;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UrlConfig {
    pub url: String,
}

pub struct UrlNode {
    config: UrlConfig,
}

impl UrlNode {
    pub fn new(config: UrlConfig) -> Self {
        Self { config }
    }

    pub fn from_value(config: &Value) -> Result<Self, NodeError> {
        Ok(Self::new(parse_config(config)?))
    }

    pub fn fields() -> Vec<InputFieldConfig> {
        vec![InputFieldConfig::new("url", "URL", InputFieldType::Text).required()]
    }
}

#[async_trait]
impl NodeBehavior for UrlNode {
    fn kind(&self) -> &str {
        NodeKind::Url.as_str()
    }

    fn role(&self) -> NodeRole {
        NodeRole::Source
    }

    fn config(&self) -> Value {
        serde_json::to_value(&self.config).unwrap_or_default()
    }

    fn update_config(&mut self, patch: &Value) -> Result<(), NodeError> {
        self.config = merge_config(&self.config, patch)?;
        Ok(())
    }

    fn validate(&self, _input: Option<&Payload>) -> Result<(), NodeError> {
        require(&self.config.url, "url")
    }

    async fn process(&self, _input: Option<&Payload>) -> Result<Payload, NodeError> {
        Ok(Payload::Url {
            url: self.config.url.trim().to_string(),
            timestamp: Utc::now(),
        })
    }
}
