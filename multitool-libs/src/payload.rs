//! Values flowing along workflow connections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Output of a node, tagged by its `type` discriminator.
///
/// Serialized the way the workflow UI consumes it, e.g.
/// `{"type": "text", "response": "hello"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    /// Free text, typically an LLM answer
    Text { response: String },

    /// Displayable image (data URL or remote URL)
    Image { url: String },

    /// A recorded URL with its capture time
    Url { url: String, timestamp: DateTime<Utc> },

    /// An HTTP exchange: the request as sent and the parsed response
    Api { request: Value, response: Value },

    /// A trigger event
    Trigger { timestamp: DateTime<Utc> },
}

impl Payload {
    /// Convenience constructor for text payloads
    pub fn text(response: impl Into<String>) -> Self {
        Payload::Text {
            response: response.into(),
        }
    }

    /// The `type` discriminator as it appears on the wire
    pub fn type_name(&self) -> &'static str {
        match self {
            Payload::Text { .. } => "text",
            Payload::Image { .. } => "image",
            Payload::Url { .. } => "url",
            Payload::Api { .. } => "api",
            Payload::Trigger { .. } => "trigger",
        }
    }

    /// Text content, if this is a text payload
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text { response } => Some(response),
            _ => None,
        }
    }

    /// Human-readable rendering handed to the presentation layer
    pub fn display_text(&self) -> String {
        match self {
            Payload::Text { response } => response.clone(),
            Payload::Image { url } | Payload::Url { url, .. } => url.clone(),
            Payload::Api { response, .. } => match response {
                Value::String(text) => text.clone(),
                other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
            },
            Payload::Trigger { timestamp } => format!("Triggered at {}", timestamp.to_rfc3339()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_wire_format() {
        let value = serde_json::to_value(Payload::text("x")).unwrap();
        assert_eq!(value, json!({"type": "text", "response": "x"}));
    }

    #[test]
    fn test_api_display_text() {
        let payload = Payload::Api {
            request: json!({"method": "GET"}),
            response: json!("plain body"),
        };
        assert_eq!(payload.display_text(), "plain body");
        assert_eq!(payload.type_name(), "api");
    }
}
