//! LLM provider integration
//!
//! Formats chat node conversations for an OpenAI-compatible
//! `/chat/completions` endpoint.

use async_trait::async_trait;
use multitool_libs::{ChatBackend, ChatMessage, ChatProviderConfig, ChatRole, NodeError};
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Chat backend talking to an OpenAI-compatible API
pub struct OpenAiChatBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    system_prompt: Option<String>,
}

impl OpenAiChatBackend {
    /// Create a backend from the service's chat settings
    ///
    /// # Arguments
    ///
    /// * `config` - Provider settings; the API key is read from `api_key_env`
    /// * `client` - Shared HTTP client
    pub fn from_config(config: &ChatProviderConfig, client: reqwest::Client) -> Self {
        let api_key = config.api_key_env.as_ref().and_then(|var| {
            let key = std::env::var(var).ok();
            if key.is_none() {
                warn!("Environment variable {} is not set, sending requests without a key", var);
            }
            key
        });

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            system_prompt: config.system_prompt.clone(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Request body for a conversation
    fn request_body(&self, messages: &[ChatMessage]) -> Value {
        let mut wire: Vec<Value> = Vec::with_capacity(messages.len() + 1);

        let has_system = messages.iter().any(|m| m.role == ChatRole::System);
        if let (false, Some(prompt)) = (has_system, &self.system_prompt) {
            wire.push(json!({"role": "system", "content": prompt}));
        }

        wire.extend(messages.iter().map(message_to_wire));

        json!({
            "model": self.model,
            "messages": wire,
        })
    }
}

fn message_to_wire(message: &ChatMessage) -> Value {
    let content = match &message.image_url {
        Some(url) => json!([
            {"type": "text", "text": message.content},
            {"type": "image_url", "image_url": {"url": url}},
        ]),
        None => json!(message.content),
    };

    json!({
        "role": message.role,
        "content": content,
    })
}

#[async_trait]
impl ChatBackend for OpenAiChatBackend {
    async fn send_request(&self, messages: Vec<ChatMessage>) -> Result<String, NodeError> {
        let body = self.request_body(&messages);
        debug!("Sending {} messages to {}", messages.len(), self.model);

        let mut request = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NodeError::TransportFailure(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(NodeError::TransportFailure(format!(
                "Provider returned {}: {}",
                status, text
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| NodeError::UpstreamFailure(format!("Invalid provider response: {}", e)))?;

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                NodeError::UpstreamFailure("Provider response has no message content".to_string())
            })
    }
}
