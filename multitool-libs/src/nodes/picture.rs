//! Picture source: turns a user-provided image file into a data URL.

use crate::catalog::NodeKind;
use crate::config::{InputFieldConfig, InputFieldType};
use crate::error::NodeError;
use crate::node::{merge_config, parse_config, NodeBehavior, NodeRole};
use crate::payload::Payload;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PictureConfig {
    /// Image file on disk
    pub path: String,

    /// Already-encoded image; takes precedence over `path`
    pub data_url: String,
}

pub struct PictureNode {
    config: PictureConfig,
}

impl PictureNode {
    pub fn new(config: PictureConfig) -> Self {
        Self { config }
    }

    pub fn from_value(config: &Value) -> Result<Self, NodeError> {
        Ok(Self::new(parse_config(config)?))
    }

    pub fn fields() -> Vec<InputFieldConfig> {
        vec![
            InputFieldConfig::new("path", "Image file", InputFieldType::FilePath),
            InputFieldConfig::new("data_url", "Image data URL", InputFieldType::Text),
        ]
    }
}

/// Mime type guessed from the file extension
pub fn mime_for_path(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

/// Encodes raw bytes as a `data:` URL
pub fn to_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

#[async_trait]
impl NodeBehavior for PictureNode {
    fn kind(&self) -> &str {
        NodeKind::Picture.as_str()
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
        if self.config.data_url.trim().is_empty() && self.config.path.trim().is_empty() {
            return Err(NodeError::MissingRequiredField("path".to_string()));
        }

        let data_url = self.config.data_url.trim();
        if !data_url.is_empty() && !data_url.starts_with("data:") {
            return Err(NodeError::MalformedConfig(
                "data_url must start with 'data:'".to_string(),
            ));
        }
        Ok(())
    }

    async fn process(&self, _input: Option<&Payload>) -> Result<Payload, NodeError> {
        let data_url = self.config.data_url.trim();
        if !data_url.is_empty() {
            return Ok(Payload::Image {
                url: data_url.to_string(),
            });
        }

        let path = Path::new(self.config.path.trim());
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            NodeError::TransportFailure(format!("Failed to read image {:?}: {}", path, e))
        })?;

        Ok(Payload::Image {
            url: to_data_url(mime_for_path(path), &bytes),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_encodes_file_as_data_url() {
        let mut file = tempfile::Builder::new().suffix(".PNG").tempfile().unwrap();
        file.write_all(b"abc").unwrap();

        let node = PictureNode::new(PictureConfig {
            path: file.path().to_string_lossy().to_string(),
            data_url: String::new(),
        });
        node.validate(None).unwrap();

        let output = node.process(None).await.unwrap();
        assert_eq!(
            output,
            Payload::Image {
                url: "data:image/png;base64,YWJj".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_unreadable_file_is_transport_failure() {
        let node = PictureNode::new(PictureConfig {
            path: "/no/such/picture.jpg".to_string(),
            data_url: String::new(),
        });

        let err = node.process(None).await.unwrap_err();
        assert!(matches!(err, NodeError::TransportFailure(_)));
    }

    #[test]
    fn test_requires_a_source() {
        let node = PictureNode::new(PictureConfig::default());
        assert_eq!(
            node.validate(None),
            Err(NodeError::MissingRequiredField("path".to_string()))
        );

        let node = PictureNode::new(PictureConfig {
            path: String::new(),
            data_url: "http://not-inline".to_string(),
        });
        assert!(matches!(node.validate(None), Err(NodeError::MalformedConfig(_))));
    }
}
