//! HTTP request transform: issues a configurable HTTP call and parses the
//! response by content type or an explicit override.

use super::require;
use crate::catalog::NodeKind;
use crate::config::{InputFieldConfig, InputFieldType};
use crate::error::NodeError;
use crate::node::{merge_config, parse_config, NodeBehavior, NodeRole};
use crate::payload::Payload;
use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::info;

/// Methods offered in the node's method dropdown
pub const METHODS: [&str; 6] = ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD"];

/// How the response body is interpreted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    /// JSON when the content type says so, text otherwise
    #[default]
    Auto,
    Json,
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpRequestConfig {
    pub method: String,
    pub url: String,
    /// JSON object text, e.g. `{"Authorization": "Bearer x"}`
    pub headers: String,
    pub body: String,
    pub response_format: ResponseFormat,
}

impl Default for HttpRequestConfig {
    fn default() -> Self {
        Self {
            method: "GET".to_string(),
            url: String::new(),
            headers: String::new(),
            body: String::new(),
            response_format: ResponseFormat::Auto,
        }
    }
}

/// Request body after interpreting the config
#[derive(Debug, Clone, PartialEq)]
enum RequestBody {
    Json(Value),
    Raw(String),
}

/// Validated request, ready to send
#[derive(Debug, Clone)]
struct PreparedRequest {
    method: Method,
    url: String,
    headers: BTreeMap<String, String>,
    body: Option<RequestBody>,
}

impl PreparedRequest {
    /// Request as echoed in the node's output
    fn describe(&self) -> Value {
        let body = match &self.body {
            Some(RequestBody::Json(value)) => value.clone(),
            Some(RequestBody::Raw(text)) => Value::String(text.clone()),
            None => Value::Null,
        };

        json!({
            "method": self.method.as_str(),
            "url": self.url,
            "headers": self.headers,
            "body": body,
        })
    }
}

pub struct HttpRequestNode {
    config: HttpRequestConfig,
    client: reqwest::Client,
}

impl HttpRequestNode {
    pub fn new(config: HttpRequestConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    pub fn from_value(config: &Value, client: reqwest::Client) -> Result<Self, NodeError> {
        Ok(Self::new(parse_config(config)?, client))
    }

    pub fn fields() -> Vec<InputFieldConfig> {
        vec![
            InputFieldConfig::new("method", "Method", InputFieldType::Select)
                .with_default("GET")
                .with_options(&METHODS),
            InputFieldConfig::new("url", "URL", InputFieldType::Text).required(),
            InputFieldConfig::new("headers", "Headers (JSON)", InputFieldType::Json),
            InputFieldConfig::new("body", "Body", InputFieldType::Textarea),
            InputFieldConfig::new("response_format", "Response format", InputFieldType::Select)
                .with_default("auto")
                .with_options(&["auto", "json", "text"]),
        ]
    }

    fn prepare(&self) -> Result<PreparedRequest, NodeError> {
        require(&self.config.url, "url")?;

        let method_name = self.config.method.trim().to_ascii_uppercase();
        let method_name = if method_name.is_empty() {
            "GET".to_string()
        } else {
            method_name
        };
        if !METHODS.contains(&method_name.as_str()) {
            return Err(NodeError::MalformedConfig(format!(
                "Unsupported HTTP method: {}",
                self.config.method
            )));
        }
        let method = Method::from_bytes(method_name.as_bytes())
            .map_err(|e| NodeError::MalformedConfig(e.to_string()))?;

        let headers = parse_headers(&self.config.headers)?;

        let sends_body = method == Method::POST || method == Method::PUT || method == Method::PATCH;
        let body = if sends_body && !self.config.body.is_empty() {
            Some(match serde_json::from_str::<Value>(&self.config.body) {
                Ok(value) => RequestBody::Json(value),
                Err(_) => RequestBody::Raw(self.config.body.clone()),
            })
        } else {
            None
        };

        Ok(PreparedRequest {
            method,
            url: self.config.url.trim().to_string(),
            headers,
            body,
        })
    }
}

/// Parses the headers field into validated name/value pairs
fn parse_headers(raw: &str) -> Result<BTreeMap<String, String>, NodeError> {
    let mut headers = BTreeMap::new();
    if raw.trim().is_empty() {
        return Ok(headers);
    }

    let parsed: Map<String, Value> = serde_json::from_str(raw)
        .map_err(|e| NodeError::MalformedConfig(format!("Invalid JSON in headers: {}", e)))?;

    for (name, value) in parsed {
        let value = match value {
            Value::String(text) => text,
            Value::Number(_) | Value::Bool(_) => value.to_string(),
            other => {
                return Err(NodeError::MalformedConfig(format!(
                    "Header '{}' must be a string, got {}",
                    name, other
                )))
            }
        };

        HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| NodeError::MalformedConfig(format!("Invalid header name: {}", name)))?;
        HeaderValue::from_str(&value).map_err(|_| {
            NodeError::MalformedConfig(format!("Invalid value for header '{}'", name))
        })?;

        headers.insert(name, value);
    }

    Ok(headers)
}

#[async_trait]
impl NodeBehavior for HttpRequestNode {
    fn kind(&self) -> &str {
        NodeKind::HttpRequest.as_str()
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

    fn validate(&self, _input: Option<&Payload>) -> Result<(), NodeError> {
        self.prepare().map(|_| ())
    }

    async fn process(&self, _input: Option<&Payload>) -> Result<Payload, NodeError> {
        let prepared = self.prepare()?;
        info!("{} {}", prepared.method, prepared.url);

        let mut request = self
            .client
            .request(prepared.method.clone(), &prepared.url);
        for (name, value) in &prepared.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let has_content_type = prepared
            .headers
            .keys()
            .any(|name| name.eq_ignore_ascii_case(CONTENT_TYPE.as_str()));
        match &prepared.body {
            Some(RequestBody::Json(value)) => {
                if !has_content_type {
                    request = request.header(CONTENT_TYPE, "application/json");
                }
                request = request.body(value.to_string());
            }
            Some(RequestBody::Raw(text)) => {
                request = request.body(text.clone());
            }
            None => {}
        }

        let response = request.send().await.map_err(|e| {
            NodeError::TransportFailure(format!("Request to {} failed: {}", prepared.url, e))
        })?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let text = response.text().await.map_err(|e| {
            NodeError::TransportFailure(format!("Failed to read response body: {}", e))
        })?;

        if !status.is_success() {
            return Err(NodeError::TransportFailure(format!(
                "{} returned HTTP {}",
                prepared.url, status
            )));
        }

        let response = match self.config.response_format {
            ResponseFormat::Text => Value::String(text),
            ResponseFormat::Json => serde_json::from_str(&text).map_err(|e| {
                NodeError::TransportFailure(format!("Response is not valid JSON: {}", e))
            })?,
            ResponseFormat::Auto if content_type.contains("application/json") => {
                serde_json::from_str(&text).unwrap_or(Value::String(text))
            }
            ResponseFormat::Auto => Value::String(text),
        };

        Ok(Payload::Api {
            request: prepared.describe(),
            response,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::HeaderMap,
        routing::{get, post},
        Json, Router,
    };
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    async fn spawn_server() -> SocketAddr {
        let app = Router::new()
            .route("/json", get(|| async { Json(json!({"id": 1})) }))
            .route("/text", get(|| async { "plain" }))
            .route(
                "/echo",
                post(|headers: HeaderMap, body: String| async move {
                    let content_type = headers
                        .get("content-type")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    Json(json!({"content_type": content_type, "body": body}))
                }),
            )
            .route(
                "/missing",
                get(|| async { (axum::http::StatusCode::NOT_FOUND, "nope") }),
            );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn node(config: HttpRequestConfig) -> HttpRequestNode {
        HttpRequestNode::new(config, reqwest::Client::new())
    }

    #[tokio::test]
    async fn test_auto_parses_json() {
        let addr = spawn_server().await;
        let node = node(HttpRequestConfig {
            url: format!("http://{}/json", addr),
            ..HttpRequestConfig::default()
        });

        match node.process(None).await.unwrap() {
            Payload::Api { request, response } => {
                assert_eq!(request["method"], "GET");
                assert_eq!(response, json!({"id": 1}));
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_auto_keeps_text() {
        let addr = spawn_server().await;
        let node = node(HttpRequestConfig {
            url: format!("http://{}/text", addr),
            ..HttpRequestConfig::default()
        });

        match node.process(None).await.unwrap() {
            Payload::Api { response, .. } => assert_eq!(response, json!("plain")),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_text_override() {
        let addr = spawn_server().await;
        let node = node(HttpRequestConfig {
            url: format!("http://{}/json", addr),
            response_format: ResponseFormat::Text,
            ..HttpRequestConfig::default()
        });

        match node.process(None).await.unwrap() {
            Payload::Api { response, .. } => assert_eq!(response, json!("{\"id\":1}")),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_post_json_body() {
        let addr = spawn_server().await;
        let node = node(HttpRequestConfig {
            method: "post".to_string(),
            url: format!("http://{}/echo", addr),
            body: "{ \"a\": 1 }".to_string(),
            ..HttpRequestConfig::default()
        });

        match node.process(None).await.unwrap() {
            Payload::Api { request, response } => {
                assert_eq!(request["body"], json!({"a": 1}));
                assert_eq!(response["content_type"], "application/json");
                assert_eq!(response["body"], "{\"a\":1}");
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_post_raw_body_keeps_header_override() {
        let addr = spawn_server().await;
        let node = node(HttpRequestConfig {
            method: "POST".to_string(),
            url: format!("http://{}/echo", addr),
            headers: "{\"Content-Type\": \"text/plain\"}".to_string(),
            body: "not json".to_string(),
            ..HttpRequestConfig::default()
        });

        match node.process(None).await.unwrap() {
            Payload::Api { response, .. } => {
                assert_eq!(response["content_type"], "text/plain");
                assert_eq!(response["body"], "not json");
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_error_status_is_transport_failure() {
        let addr = spawn_server().await;
        let node = node(HttpRequestConfig {
            url: format!("http://{}/missing", addr),
            ..HttpRequestConfig::default()
        });

        let err = node.process(None).await.unwrap_err();
        assert!(matches!(err, NodeError::TransportFailure(_)));
    }

    #[test]
    fn test_config_errors() {
        let missing = node(HttpRequestConfig::default());
        assert_eq!(
            missing.validate(None),
            Err(NodeError::MissingRequiredField("url".to_string()))
        );

        let bad_headers = node(HttpRequestConfig {
            url: "http://localhost".to_string(),
            headers: "{not json".to_string(),
            ..HttpRequestConfig::default()
        });
        assert!(matches!(
            bad_headers.validate(None),
            Err(NodeError::MalformedConfig(_))
        ));

        let bad_method = node(HttpRequestConfig {
            url: "http://localhost".to_string(),
            method: "BREW".to_string(),
            ..HttpRequestConfig::default()
        });
        assert!(matches!(
            bad_method.validate(None),
            Err(NodeError::MalformedConfig(_))
        ));
    }
}
