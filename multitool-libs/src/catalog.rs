//! Node catalog: the closed set of built-in node kinds.
//!
//! Every kind is one record bundling its label, port capabilities, config
//! schema and constructor. Callers look a kind up once by tag and never
//! switch on the tag again.

use crate::config::InputFieldConfig;
use crate::error::NodeError;
use crate::llm::ChatBackend;
use crate::node::{NodeBehavior, NodeRole};
use crate::nodes::{
    ChatNode, DisplayNode, HttpRequestNode, PictureNode, TextInputNode, TriggerNode, UrlNode,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Tag of a built-in node kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Url,
    Picture,
    TextInput,
    Chat,
    HttpRequest,
    Trigger,
    Display,
}

/// Catalog entry describing a node kind to the frontend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeSpec {
    pub kind: NodeKind,

    /// Human-readable label for the node (displayed in UI)
    pub label: String,

    pub role: NodeRole,

    /// User-editable settings
    pub fields: Vec<InputFieldConfig>,
}

/// Collaborators handed to node constructors.
#[derive(Clone, Default)]
pub struct NodeServices {
    /// Shared HTTP client for HTTP request nodes
    pub http: reqwest::Client,

    /// LLM backend for chat nodes
    pub chat: Option<Arc<dyn ChatBackend>>,
}

impl NodeKind {
    pub const ALL: [NodeKind; 7] = [
        NodeKind::Url,
        NodeKind::Picture,
        NodeKind::TextInput,
        NodeKind::Chat,
        NodeKind::HttpRequest,
        NodeKind::Trigger,
        NodeKind::Display,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Url => "url",
            NodeKind::Picture => "picture",
            NodeKind::TextInput => "text_input",
            NodeKind::Chat => "chat",
            NodeKind::HttpRequest => "http_request",
            NodeKind::Trigger => "trigger",
            NodeKind::Display => "display",
        }
    }

    pub fn spec(self) -> NodeSpec {
        let (label, role, fields) = match self {
            NodeKind::Url => ("URL", NodeRole::Source, UrlNode::fields()),
            NodeKind::Picture => ("Picture", NodeRole::Source, PictureNode::fields()),
            NodeKind::TextInput => ("Text Input", NodeRole::Source, TextInputNode::fields()),
            NodeKind::Chat => ("Chat", NodeRole::Transform, ChatNode::fields()),
            NodeKind::HttpRequest => {
                ("HTTP Request", NodeRole::Transform, HttpRequestNode::fields())
            }
            NodeKind::Trigger => ("Trigger", NodeRole::Source, TriggerNode::fields()),
            NodeKind::Display => ("Display", NodeRole::Sink, Vec::new()),
        };

        NodeSpec {
            kind: self,
            label: label.to_string(),
            role,
            fields,
        }
    }

    /// Constructs the behavior for this kind from a JSON config
    /// (`null` means defaults).
    pub fn build(
        self,
        config: &Value,
        services: &NodeServices,
    ) -> Result<Box<dyn NodeBehavior>, NodeError> {
        let behavior: Box<dyn NodeBehavior> = match self {
            NodeKind::Url => Box::new(UrlNode::from_value(config)?),
            NodeKind::Picture => Box::new(PictureNode::from_value(config)?),
            NodeKind::TextInput => Box::new(TextInputNode::from_value(config)?),
            NodeKind::Chat => Box::new(ChatNode::from_value(config, services.chat.clone())?),
            NodeKind::HttpRequest => {
                Box::new(HttpRequestNode::from_value(config, services.http.clone())?)
            }
            NodeKind::Trigger => Box::new(TriggerNode::from_value(config)?),
            NodeKind::Display => Box::new(DisplayNode),
        };
        Ok(behavior)
    }

    /// Specs of every built-in kind
    pub fn catalog() -> Vec<NodeSpec> {
        Self::ALL.iter().map(|kind| kind.spec()).collect()
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = NodeError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == tag)
            .ok_or_else(|| NodeError::MalformedConfig(format!("Unknown node kind: {}", tag)))
    }
}
