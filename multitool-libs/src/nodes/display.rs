//! Display sink: shows whatever it last received.

use crate::catalog::NodeKind;
use crate::error::NodeError;
use crate::node::{NodeBehavior, NodeRole};
use crate::payload::Payload;
use async_trait::async_trait;

#[derive(Debug, Default)]
pub struct DisplayNode;

#[async_trait]
impl NodeBehavior for DisplayNode {
    fn kind(&self) -> &str {
        NodeKind::Display.as_str()
    }

    fn role(&self) -> NodeRole {
        NodeRole::Sink
    }

    fn validate(&self, input: Option<&Payload>) -> Result<(), NodeError> {
        if input.is_none() {
            return Err(NodeError::MissingRequiredField("input".to_string()));
        }
        Ok(())
    }

    async fn process(&self, input: Option<&Payload>) -> Result<Payload, NodeError> {
        input
            .cloned()
            .ok_or_else(|| NodeError::MissingRequiredField("input".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passes_input_through() {
        let input = Payload::text("shown");
        let output = DisplayNode.process(Some(&input)).await.unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_requires_input() {
        assert!(DisplayNode.validate(None).is_err());
        assert!(DisplayNode.update_config(&serde_json::json!({})).is_err());
    }
}
