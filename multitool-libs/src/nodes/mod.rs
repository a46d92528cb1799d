//! Built-in node variants.
//!
//! Each module bundles a typed config, its field schema and the work the
//! node performs. `crate::catalog::NodeKind` dispatches to them by tag.

pub mod chat;
pub mod display;
pub mod http_request;
pub mod picture;
pub mod text_input;
pub mod trigger;
pub mod url;

pub use chat::{ChatConfig, ChatNode};
pub use display::DisplayNode;
pub use http_request::{HttpRequestConfig, HttpRequestNode, ResponseFormat};
pub use picture::{PictureConfig, PictureNode};
pub use text_input::{TextInputConfig, TextInputNode};
pub use trigger::{TriggerConfig, TriggerNode};
pub use url::{UrlConfig, UrlNode};

use crate::error::NodeError;

/// Fails with `MissingRequiredField` when `value` is blank
pub(crate) fn require(value: &str, field: &str) -> Result<(), NodeError> {
    if value.trim().is_empty() {
        return Err(NodeError::MissingRequiredField(field.to_string()));
    }
    Ok(())
}
