//! Configuration structures for the multitool workflow engine.
//!
//! Two kinds of configuration live here:
//! - Field schemas describing the user-editable settings of each node kind,
//!   used by the frontend to render node forms
//! - `ServiceConfig`, the YAML file the workflow service starts from

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for a user-editable node setting.
///
/// These are controls rendered inside the node's UI, not I/O handles for
/// data flow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputFieldConfig {
    /// Config key this field edits
    pub name: String,

    /// Display label in UI
    pub label: String,

    /// Type of control to render
    #[serde(rename = "type")]
    pub field_type: InputFieldType,

    /// Default value (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Whether the node fails with `MissingRequiredField` when this is empty
    #[serde(default)]
    pub required: bool,

    /// Choices for `select` fields
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl InputFieldConfig {
    pub fn new(name: &str, label: &str, field_type: InputFieldType) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            field_type,
            default: None,
            required: false,
            options: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|o| o.to_string()).collect();
        self
    }
}

/// Type of node setting control.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InputFieldType {
    /// Single-line text input
    Text,

    /// Multi-line text input
    Textarea,

    /// Numeric input
    Number,

    /// Checkbox
    Checkbox,

    /// Dropdown/select
    Select,

    /// File path selector
    FilePath,

    /// JSON editor
    Json,
}

/// How the executor walks root nodes during `execute_all`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RootMode {
    /// One root branch after another, in execution order
    #[default]
    Sequential,

    /// All root branches started together, then awaited
    Concurrent,
}

/// Executor tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Grace period before a Completed node reverts to Ready
    pub revert_delay_ms: u64,

    pub root_mode: RootMode,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            revert_delay_ms: 2000,
            root_mode: RootMode::Sequential,
        }
    }
}

impl ExecutorConfig {
    pub fn revert_delay(&self) -> Duration {
        Duration::from_millis(self.revert_delay_ms)
    }
}

/// OpenAI-compatible chat provider used by chat nodes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatProviderConfig {
    /// Base URL of the API, e.g. `https://api.openai.com/v1`
    pub base_url: String,

    /// Model identifier, e.g. `gpt-4o`
    pub model: String,

    /// Name of the environment variable holding the API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// System prompt prepended to every conversation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

/// Root configuration of the workflow service.
///
/// # Example YAML
///
/// ```yaml
/// port: 3000
/// nexus_dir: "./nexus"
/// executor:
///   revert_delay_ms: 2000
///   root_mode: sequential
/// chat:
///   base_url: "https://api.openai.com/v1"
///   model: "gpt-4o"
///   api_key_env: "OPENAI_API_KEY"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServiceConfig {
    pub port: u16,

    /// Directory where saved workflows are stored
    pub nexus_dir: PathBuf,

    pub executor: ExecutorConfig,

    /// Chat provider; chat nodes fail with a transport error without one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat: Option<ChatProviderConfig>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            nexus_dir: PathBuf::from("./nexus"),
            executor: ExecutorConfig::default(),
            chat: None,
        }
    }
}

/// Load and parse the service configuration from a YAML file.
///
/// # Returns
///
/// * `Ok(ServiceConfig)` - Successfully parsed configuration
/// * `Err(AppError)` - Failed to read file, parse YAML or validate
///
/// # Example
///
/// ```rust,ignore
/// use multitool_libs::load_service_config;
///
/// let config = load_service_config("./config.yaml")?;
/// println!("Listening on port {}", config.port);
/// ```
pub fn load_service_config<P: AsRef<Path>>(config_path: P) -> Result<ServiceConfig, AppError> {
    let path = config_path.as_ref();

    let contents = fs::read_to_string(path).map_err(|e| {
        AppError::ConfigError(format!("Failed to read config file at {:?}: {}", path, e))
    })?;

    let config = parse_service_config(&contents).map_err(|e| match e {
        AppError::YamlError(err) => AppError::ConfigError(format!(
            "Failed to parse config YAML at {:?}: {}",
            path, err
        )),
        other => other,
    })?;

    Ok(config)
}

/// Parse and validate service configuration from YAML text.
pub fn parse_service_config(contents: &str) -> Result<ServiceConfig, AppError> {
    let config: ServiceConfig = serde_yaml::from_str(contents)?;

    if config.nexus_dir.as_os_str().is_empty() {
        return Err(AppError::ConfigError(
            "nexus_dir cannot be empty".to_string(),
        ));
    }

    if let Some(chat) = &config.chat {
        if chat.base_url.is_empty() {
            return Err(AppError::ConfigError(
                "chat.base_url cannot be empty".to_string(),
            ));
        }

        if chat.model.is_empty() {
            return Err(AppError::ConfigError(
                "chat.model cannot be empty".to_string(),
            ));
        }
    }

    Ok(config)
}
