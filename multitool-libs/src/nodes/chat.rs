//! Chat transform: asks the configured LLM backend, optionally with
//! context received from upstream.

use crate::catalog::NodeKind;
use crate::config::{InputFieldConfig, InputFieldType};
use crate::error::NodeError;
use crate::llm::{ChatBackend, ChatMessage};
use crate::node::{merge_config, parse_config, NodeBehavior, NodeRole};
use crate::payload::Payload;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Prompt used when the node's prompt field is left empty
pub const DEFAULT_PROMPT: &str = "Default question";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub prompt: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_string(),
            system_prompt: None,
        }
    }
}

pub struct ChatNode {
    config: ChatConfig,
    backend: Option<Arc<dyn ChatBackend>>,
}

impl ChatNode {
    pub fn new(config: ChatConfig, backend: Option<Arc<dyn ChatBackend>>) -> Self {
        Self { config, backend }
    }

    pub fn from_value(
        config: &Value,
        backend: Option<Arc<dyn ChatBackend>>,
    ) -> Result<Self, NodeError> {
        Ok(Self::new(parse_config(config)?, backend))
    }

    pub fn fields() -> Vec<InputFieldConfig> {
        vec![
            InputFieldConfig::new("prompt", "Question", InputFieldType::Textarea)
                .with_default(DEFAULT_PROMPT),
            InputFieldConfig::new("system_prompt", "System prompt", InputFieldType::Textarea),
        ]
    }

    /// Conversation sent to the backend for the given upstream value
    pub fn build_messages(&self, input: Option<&Payload>) -> Vec<ChatMessage> {
        let mut messages = Vec::new();

        if let Some(system) = self.config.system_prompt.as_deref() {
            if !system.trim().is_empty() {
                messages.push(ChatMessage::system(system));
            }
        }

        let prompt = match self.config.prompt.trim() {
            "" => DEFAULT_PROMPT,
            prompt => prompt,
        };

        let message = match input {
            Some(Payload::Text { response }) => {
                ChatMessage::user(format!("Context:\n{}\n\n{}", response, prompt))
            }
            Some(api @ Payload::Api { .. }) => {
                ChatMessage::user(format!("Context:\n{}\n\n{}", api.display_text(), prompt))
            }
            Some(Payload::Image { url }) | Some(Payload::Url { url, .. }) => {
                ChatMessage::user(prompt).with_image(url.clone())
            }
            Some(Payload::Trigger { .. }) | None => ChatMessage::user(prompt),
        };
        messages.push(message);

        messages
    }
}

#[async_trait]
impl NodeBehavior for ChatNode {
    fn kind(&self) -> &str {
        NodeKind::Chat.as_str()
    }

    fn role(&self) -> NodeRole {
        NodeRole::Transform
    }

    fn config(&self) -> Value {
        serde_json::to_value(&self.config).unwrap_or_default()
    }

    fn update_config(&mut self, patch: &Value) -> Result<(), NodeError> {
        self.config = merge_config(&self.config, patch)?;
        Ok(())
    }

    async fn process(&self, input: Option<&Payload>) -> Result<Payload, NodeError> {
        let backend = self.backend.as_ref().ok_or_else(|| {
            NodeError::TransportFailure("no chat backend configured".to_string())
        })?;

        let messages = self.build_messages(input);
        debug!("Sending {} chat messages", messages.len());
        let response = backend.send_request(messages).await?;

        Ok(Payload::Text { response })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatRole;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingBackend {
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    #[async_trait]
    impl ChatBackend for RecordingBackend {
        async fn send_request(&self, messages: Vec<ChatMessage>) -> Result<String, NodeError> {
            let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            self.seen.lock().unwrap().push(messages);
            Ok(format!("answer to: {}", last))
        }
    }

    #[tokio::test]
    async fn test_prepends_upstream_text() {
        let backend = Arc::new(RecordingBackend::default());
        let node = ChatNode::new(
            ChatConfig {
                prompt: "Summarize".to_string(),
                system_prompt: Some("Be brief".to_string()),
            },
            Some(backend.clone() as Arc<dyn ChatBackend>),
        );

        let output = node
            .process(Some(&Payload::text("a long story")))
            .await
            .unwrap();
        assert_eq!(
            output,
            Payload::text("answer to: Context:\na long story\n\nSummarize")
        );

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[0].len(), 2);
        assert_eq!(seen[0][0].role, ChatRole::System);
    }

    #[test]
    fn test_image_input_is_attached() {
        let node = ChatNode::new(ChatConfig::default(), None);
        let messages = node.build_messages(Some(&Payload::Image {
            url: "data:image/png;base64,AA==".to_string(),
        }));

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, DEFAULT_PROMPT);
        assert_eq!(
            messages[0].image_url.as_deref(),
            Some("data:image/png;base64,AA==")
        );
    }

    #[tokio::test]
    async fn test_missing_backend_is_transport_failure() {
        let node = ChatNode::new(ChatConfig::default(), None);
        let err = node.process(None).await.unwrap_err();
        assert!(matches!(err, NodeError::TransportFailure(_)));
    }
}
