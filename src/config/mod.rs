//! # Toolplan Configuration
//!
//! Layered configuration for the execution core. Values come from serde
//! defaults, then an optional TOML file, then `TOOLPLAN__*` environment
//! variables (see [`ConfigManager`]). Callers running a single execution can
//! additionally override the execution section per call with
//! [`ExecutionConfigOverrides`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use toolplan_core::config::{ConfigManager, ExecutionConfigOverrides};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let execution = manager.config().execution.merged_with(&ExecutionConfigOverrides {
//!     continue_on_error: Some(true),
//!     ..Default::default()
//! });
//! assert!(execution.continue_on_error);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants::defaults;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring `config/toolplan.toml`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ToolplanConfig {
    /// Per-execution behaviour (retries, rollback, error tolerance, concurrency)
    pub execution: ExecutionConfig,

    /// Shape of the delay between retry attempts
    pub backoff: BackoffConfig,

    /// Tracing subscriber settings
    pub logging: LoggingConfig,

    /// Optional upper bound on a single tool call; unset means no timeout
    pub tool_timeout_ms: Option<u64>,
}

impl ToolplanConfig {
    /// Validate cross-field constraints that serde cannot express
    pub fn validate(&self) -> ConfigResult<()> {
        if self.execution.parallel_execution_limit == 0 {
            return Err(ConfigurationError::invalid_value(
                "execution.parallel_execution_limit",
                0,
                "must be at least 1",
            ));
        }

        if self.backoff.multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "backoff.multiplier",
                self.backoff.multiplier,
                "must be >= 1.0",
            ));
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "logging.level",
                "\"\"",
                "must not be empty",
            ));
        }

        if self.tool_timeout_ms == Some(0) {
            return Err(ConfigurationError::invalid_value(
                "tool_timeout_ms",
                0,
                "omit the value to disable timeouts",
            ));
        }

        Ok(())
    }

    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_ms.map(Duration::from_millis)
    }
}

/// Execution behaviour for a single plan run
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Retries after the first attempt; a step makes at most `max_retries + 1` tool calls
    pub max_retries: u32,
    /// Base delay before the first retry
    pub retry_delay_ms: u64,
    /// Reverse completed side effects when the execution fails
    pub enable_rollback: bool,
    /// Keep scheduling independent steps after a step fails
    pub continue_on_error: bool,
    /// Upper bound on the size of one concurrently executed batch
    pub parallel_execution_limit: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_retries: defaults::MAX_RETRIES,
            retry_delay_ms: defaults::RETRY_DELAY_MS,
            enable_rollback: defaults::ENABLE_ROLLBACK,
            continue_on_error: defaults::CONTINUE_ON_ERROR,
            parallel_execution_limit: defaults::PARALLEL_EXECUTION_LIMIT,
        }
    }
}

impl ExecutionConfig {
    /// Apply caller-supplied overrides on top of this configuration
    pub fn merged_with(&self, overrides: &ExecutionConfigOverrides) -> Self {
        Self {
            max_retries: overrides.max_retries.unwrap_or(self.max_retries),
            retry_delay_ms: overrides.retry_delay_ms.unwrap_or(self.retry_delay_ms),
            enable_rollback: overrides.enable_rollback.unwrap_or(self.enable_rollback),
            continue_on_error: overrides.continue_on_error.unwrap_or(self.continue_on_error),
            parallel_execution_limit: overrides
                .parallel_execution_limit
                .unwrap_or(self.parallel_execution_limit)
                .max(1),
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Caller-supplied execution configuration; every field is optional
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionConfigOverrides {
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub enable_rollback: Option<bool>,
    pub continue_on_error: Option<bool>,
    pub parallel_execution_limit: Option<usize>,
}

/// Backoff shape for retry delays: `retry_delay_ms * multiplier^attempt`, capped
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            multiplier: defaults::BACKOFF_MULTIPLIER,
            max_delay_ms: defaults::BACKOFF_MAX_DELAY_MS,
        }
    }
}

impl BackoffConfig {
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive; `RUST_LOG` takes precedence when set
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
