//! # Tool Boundary
//!
//! The opaque async RPC boundary to the remote operations a plan invokes.
//! A tool either returns a `{ success, data, error }` envelope or fails
//! outright; the execution core treats a thrown error and a `success: false`
//! envelope the same way for retry purposes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

/// Envelope returned by a tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    /// Strip the envelope: the `data` payload on success, an error otherwise
    pub fn into_data(self, tool_name: &str) -> Result<Value, ToolError> {
        if self.success {
            Ok(self.data.unwrap_or(Value::Null))
        } else {
            Err(ToolError::Rejected {
                tool: tool_name.to_string(),
                message: self
                    .error
                    .unwrap_or_else(|| "tool reported failure without a message".to_string()),
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToolError {
    /// The call itself failed (transport, remote exception, ...)
    #[error("{message}")]
    Failed { tool: String, message: String },

    /// The tool answered with `success: false`
    #[error("{message}")]
    Rejected { tool: String, message: String },

    #[error("Tool {tool} timed out after {timeout_ms}ms")]
    Timeout { tool: String, timeout_ms: u64 },
}

impl ToolError {
    pub fn failed(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn tool_name(&self) -> &str {
        match self {
            Self::Failed { tool, .. } | Self::Rejected { tool, .. } | Self::Timeout { tool, .. } => {
                tool
            }
        }
    }
}

/// Async tool invocation boundary
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, tool_name: &str, params: &Value) -> Result<ToolResponse, ToolError>;
}

/// Races each tool call against a timer. An elapsed call is reported as
/// [`ToolError::Timeout`] and is retried like any other tool failure; the
/// underlying call is dropped, not awaited.
pub struct TimeoutToolExecutor {
    inner: Arc<dyn ToolExecutor>,
    limit: Duration,
}

impl TimeoutToolExecutor {
    pub fn new(inner: Arc<dyn ToolExecutor>, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

#[async_trait]
impl ToolExecutor for TimeoutToolExecutor {
    async fn execute(&self, tool_name: &str, params: &Value) -> Result<ToolResponse, ToolError> {
        match timeout(self.limit, self.inner.execute(tool_name, params)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    tool = tool_name,
                    timeout_ms = self.limit.as_millis() as u64,
                    "Tool call timed out"
                );
                Err(ToolError::Timeout {
                    tool: tool_name.to_string(),
                    timeout_ms: self.limit.as_millis() as u64,
                })
            }
        }
    }
}
