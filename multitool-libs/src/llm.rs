//! Boundary between chat nodes and whatever LLM provider is configured.
//!
//! Provider-specific request formatting lives outside the engine; chat nodes
//! only see the `ChatBackend` capability.

use crate::error::NodeError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A single message sent to the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,

    pub content: String,

    /// Image attached to the message (data URL or remote URL)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
            image_url: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            image_url: None,
        }
    }

    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }
}

/// Sends a conversation to an LLM and waits for the complete answer.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Returns the assistant's full response text.
    ///
    /// Implementations report provider and network problems as
    /// `NodeError::TransportFailure`.
    async fn send_request(&self, messages: Vec<ChatMessage>) -> Result<String, NodeError>;
}
