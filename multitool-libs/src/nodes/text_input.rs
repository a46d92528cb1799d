//! Text source: emits the text typed into the node.

use crate::catalog::NodeKind;
use crate::config::{InputFieldConfig, InputFieldType};
use crate::error::NodeError;
use crate::node::{merge_config, parse_config, NodeBehavior, NodeRole};
use crate::payload::Payload;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextInputConfig {
    pub text: String,
}

pub struct TextInputNode {
    config: TextInputConfig,
}

impl TextInputNode {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            config: TextInputConfig { text: text.into() },
        }
    }

    pub fn from_value(config: &Value) -> Result<Self, NodeError> {
        let config: TextInputConfig = parse_config(config)?;
        Ok(Self { config })
    }

    pub fn fields() -> Vec<InputFieldConfig> {
        vec![InputFieldConfig::new("text", "Text", InputFieldType::Textarea)]
    }
}

#[async_trait]
impl NodeBehavior for TextInputNode {
    fn kind(&self) -> &str {
        NodeKind::TextInput.as_str()
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

    async fn process(&self, _input: Option<&Payload>) -> Result<Payload, NodeError> {
        Ok(Payload::text(self.config.text.clone()))
    }
}
