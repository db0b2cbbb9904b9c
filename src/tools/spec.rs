//! Tool specification traits for the media server.
//!
//! - `ToolSpec`: the trait every tool implements
//! - `ToolContext`: shared clients and configuration handed to tools
//! - `ToolResult`: unified result type for tool execution
//! - `ToolCapability`: what a tool touches when it runs

use std::path::Path;
use std::sync::Arc;

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::client::{MediaClient, build_http_client};
use crate::config::Config;
use crate::mcp::protocol::{INTERNAL_ERROR, INVALID_PARAMS};
use crate::modules::storage::RemoteStore;
use crate::notify::Notifier;
use crate::utils::is_http_url;

/// Capabilities that a tool may have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCapability {
    /// Tool writes artifacts under the output directory
    WritesFiles,
    /// Tool calls a remote provider
    Network,
    /// Tool may return before its work is finished
    Background,
}

/// Errors that can occur during tool execution.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Failed to validate input: {message}")]
    InvalidInput { message: String },

    #[error("Failed to validate input: missing required field '{field}'")]
    MissingField { field: String },

    #[error("Failed to execute tool: {message}")]
    ExecutionFailed { message: String },

    #[error("Failed to locate tool: {message}")]
    NotAvailable { message: String },
}

impl ToolError {
    #[must_use]
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

    #[must_use]
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    #[must_use]
    pub fn execution_failed(msg: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            message: msg.into(),
        }
    }

    #[must_use]
    pub fn not_available(msg: impl Into<String>) -> Self {
        Self::NotAvailable {
            message: msg.into(),
        }
    }

    /// Map onto a JSON-RPC error code.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidInput { .. } | Self::MissingField { .. } | Self::NotAvailable { .. } => {
                INVALID_PARAMS
            }
            Self::ExecutionFailed { .. } => INTERNAL_ERROR,
        }
    }
}

impl From<anyhow::Error> for ToolError {
    fn from(err: anyhow::Error) -> Self {
        Self::execution_failed(format!("{err:#}"))
    }
}

/// Result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The output content (JSON text for every media tool)
    pub content: String,
    /// Whether the execution was successful
    pub success: bool,
}

impl ToolResult {
    /// Create a successful result from JSON.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            content: serde_json::to_string_pretty(value)?,
            success: true,
        })
    }
}

/// Context passed to tools during execution.
///
/// Everything here is cheap to clone and safe to move into background tasks.
#[derive(Clone)]
pub struct ToolContext {
    pub config: Arc<Config>,
    /// Image and audio provider
    pub client: MediaClient,
    /// Video provider
    pub video_client: MediaClient,
    pub http_client: reqwest::Client,
    pub notifier: Arc<Notifier>,
    pub store: Option<RemoteStore>,
}

impl ToolContext {
    /// Build clients, channels and the optional store from configuration.
    pub fn from_config(config: Config) -> AnyResult<Self> {
        let http_client = build_http_client(&config)?;
        let client = MediaClient::new(&config, http_client.clone())?;
        let video_client = MediaClient::for_video(&config, http_client.clone())?;
        let notifier = Arc::new(Notifier::from_config(&config, &http_client));
        let store = RemoteStore::from_config(&config, &http_client);
        Ok(Self {
            config: Arc::new(config),
            client,
            video_client,
            http_client,
            notifier,
            store,
        })
    }

    /// Reject local paths that do not name a file; URLs are checked on download.
    pub fn check_input_path(&self, field: &str, value: &str) -> Result<(), ToolError> {
        if is_http_url(value) || value.starts_with("data:") {
            return Ok(());
        }
        let expanded = shellexpand::tilde(value.trim()).to_string();
        if Path::new(&expanded).is_file() {
            Ok(())
        } else {
            Err(ToolError::invalid_input(format!(
                "{field}: file not found: {value}"
            )))
        }
    }
}

/// The core trait that all tools must implement.
#[async_trait]
pub trait ToolSpec: Send + Sync {
    /// Returns the unique name of this tool (used in `tools/call`).
    fn name(&self) -> &str;

    /// Returns a human-readable description of what this tool does.
    fn description(&self) -> &str;

    /// Returns the JSON Schema for the tool's input parameters.
    fn input_schema(&self) -> Value;

    /// Returns the capabilities this tool has.
    fn capabilities(&self) -> Vec<ToolCapability>;

    /// Whether the tool may hand its work to a detached task.
    fn runs_in_background(&self) -> bool {
        self.capabilities().contains(&ToolCapability::Background)
    }

    /// Execute the tool with the given input and context.
    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolResult, ToolError>;
}

// === Helper functions for extracting values from JSON input ===

/// Helper to extract a required, non-blank string field from JSON input.
pub fn required_str<'a>(input: &'a Value, field: &str) -> Result<&'a str, ToolError> {
    input
        .get(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ToolError::missing_field(field))
}

/// Helper to extract an optional, non-blank string field from JSON input.
pub fn optional_str<'a>(input: &'a Value, field: &str) -> Option<&'a str> {
    input
        .get(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
}

/// Helper to extract an optional integer within `[min, max]`.
pub fn optional_u64_in(
    input: &Value,
    field: &str,
    min: u64,
    max: u64,
) -> Result<Option<u64>, ToolError> {
    match input.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => match value.as_u64() {
            Some(n) if (min..=max).contains(&n) => Ok(Some(n)),
            _ => Err(ToolError::invalid_input(format!(
                "{field} must be an integer between {min} and {max}"
            ))),
        },
    }
}

/// Helper to extract an optional number within `[min, max]`.
pub fn optional_f64_in(
    input: &Value,
    field: &str,
    min: f64,
    max: f64,
) -> Result<Option<f64>, ToolError> {
    match input.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => match value.as_f64() {
            Some(n) if (min..=max).contains(&n) => Ok(Some(n)),
            _ => Err(ToolError::invalid_input(format!(
                "{field} must be a number between {min} and {max}"
            ))),
        },
    }
}

/// Helper to extract an optional signed integer.
pub fn optional_i64(input: &Value, field: &str) -> Result<Option<i64>, ToolError> {
    match input.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_i64()
            .map(Some)
            .ok_or_else(|| ToolError::invalid_input(format!("{field} must be an integer"))),
    }
}

/// Helper to check an optional string against a fixed set of values.
pub fn optional_choice<'a>(
    input: &'a Value,
    field: &str,
    allowed: &[&str],
) -> Result<Option<&'a str>, ToolError> {
    match optional_str(input, field) {
        None => Ok(None),
        Some(value) if allowed.contains(&value) => Ok(Some(value)),
        Some(value) => Err(ToolError::invalid_input(format!(
            "{field} must be one of {}, got '{value}'",
            allowed.join(", ")
        ))),
    }
}

// === Unit Tests ===
