//! Error types for the multitool workflow engine.
//!
//! Three layers of errors live here:
//! - `NodeError`: failures local to a single node invocation
//! - `GraphError`: structural rejections when editing the graph
//! - `AppError`: the service-level error, convertible into an HTTP response

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failure of a single node invocation.
///
/// Node errors are caught at the node boundary and turned into an `Error`
/// status; they never abort a whole workflow run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// A config field the node cannot work without is empty
    ///
    /// # Example
    /// ```
    /// use multitool_libs::NodeError;
    /// let error = NodeError::MissingRequiredField("url".to_string());
    /// assert_eq!(error.to_string(), "Missing required field: url");
    /// ```
    #[error("Missing required field: {0}")]
    MissingRequiredField(String),

    /// A config field is present but cannot be interpreted
    #[error("Malformed config: {0}")]
    MalformedConfig(String),

    /// Network, HTTP or file access failure
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// A dependency of the node's work failed unexpectedly (e.g. panicked)
    #[error("Upstream failure: {0}")]
    UpstreamFailure(String),

    /// The node is already running; re-entrant invocations are rejected
    #[error("Node '{0}' is already running")]
    Busy(String),

    /// The node id does not exist (anymore) in the graph
    #[error("Node '{0}' not found")]
    NotFound(String),
}

/// Rejection of a graph edit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Cannot connect node '{0}' to itself")]
    SelfLoop(String),

    #[error("Connection '{from}' -> '{to}' already exists")]
    DuplicateEdge { from: String, to: String },

    #[error("Connection '{from}' -> '{to}' does not exist")]
    MissingEdge { from: String, to: String },

    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("Node '{0}' already exists")]
    DuplicateNode(String),

    /// The endpoint's role has no port on that side (e.g. a sink as source)
    #[error("Node '{node}' has no {direction} port")]
    MissingPort { node: String, direction: String },
}

/// Main error type for the multitool service.
///
/// This enum covers common error scenarios across the service:
/// - Bad requests (invalid input, validation failures)
/// - Missing resources (unknown nodes, workspaces)
/// - Internal errors (processing failures, system errors)
/// - Configuration errors (invalid config files)
/// - IO errors (file system)
#[derive(Error, Debug)]
pub enum AppError {
    /// Bad request error - invalid input or validation failure
    ///
    /// # Example
    /// ```
    /// use multitool_libs::AppError;
    /// let error = AppError::BadRequest("Unknown node kind".to_string());
    /// ```
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal server error - unexpected processing failure
    #[error("Internal error: {0}")]
    Internal(String),

    /// Configuration error - invalid or missing configuration
    ///
    /// # Example
    /// ```
    /// use multitool_libs::AppError;
    /// let error = AppError::ConfigError("port cannot be 0".to_string());
    /// ```
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Node invocation or configuration failure
    #[error(transparent)]
    Node(#[from] NodeError),

    /// Rejected graph edit
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// IO error wrapper
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Implement Axum's IntoResponse for AppError to enable automatic HTTP error responses
///
/// Maps AppError variants to appropriate HTTP status codes:
/// - BadRequest/ConfigError/Graph -> 400 Bad Request
/// - NotFound -> 404 Not Found
/// - Node -> depends on the node error (404 / 409 / 422 / 502)
/// - Internal/IoError/YamlError/JsonError -> 500 Internal Server Error
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::BadRequest(_) | AppError::ConfigError(_) | AppError::Graph(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Node(err) => match err {
                NodeError::NotFound(_) => StatusCode::NOT_FOUND,
                NodeError::Busy(_) => StatusCode::CONFLICT,
                NodeError::MissingRequiredField(_) | NodeError::MalformedConfig(_) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                NodeError::TransportFailure(_) | NodeError::UpstreamFailure(_) => {
                    StatusCode::BAD_GATEWAY
                }
            },
            AppError::Internal(_)
            | AppError::IoError(_)
            | AppError::YamlError(_)
            | AppError::JsonError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_request_error() {
        let error = AppError::BadRequest("test error".to_string());
        assert_eq!(error.to_string(), "Bad request: test error");
    }

    #[test]
    fn test_node_error_is_transparent() {
        let error: AppError = NodeError::MalformedConfig("headers".to_string()).into();
        assert_eq!(error.to_string(), "Malformed config: headers");
    }

    #[test]
    fn test_status_codes() {
        let busy: AppError = NodeError::Busy("n1".to_string()).into();
        assert_eq!(busy.into_response().status(), StatusCode::CONFLICT);

        let missing: AppError = NodeError::NotFound("n1".to_string()).into();
        assert_eq!(missing.into_response().status(), StatusCode::NOT_FOUND);

        let edge: AppError = GraphError::SelfLoop("n1".to_string()).into();
        assert_eq!(edge.into_response().status(), StatusCode::BAD_REQUEST);

        let transport: AppError = NodeError::TransportFailure("timeout".to_string()).into();
        assert_eq!(transport.into_response().status(), StatusCode::BAD_GATEWAY);
    }
}
