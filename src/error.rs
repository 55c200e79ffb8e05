//! # Error Types
//!
//! Crate-wide error taxonomy for plan execution. Step-local failures are
//! recorded on the step's [`StepResult`](crate::models::StepResult) and only
//! surface here when they abort a run; bookkeeping failures (stuck state,
//! storage) always surface here.

use crate::config::ConfigurationError;
use crate::planning::PlanLookupError;
use crate::state_machine::{ExecutionState, StateMachineError};
use crate::storage::StorageError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToolplanError {
    #[error("Plan not found: {plan_request_id}")]
    PlanNotFound { plan_request_id: String },

    #[error(transparent)]
    PlanLookup(#[from] PlanLookupError),

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Parameter validation failed for step {step_index}: {}", errors.join("; "))]
    ParameterValidation {
        step_index: usize,
        errors: Vec<String>,
    },

    #[error("Step {step_index} ({tool}) failed after {retries} retries: {message}")]
    ToolExecution {
        step_index: usize,
        tool: String,
        retries: u32,
        message: String,
    },

    #[error("Execution stuck: no ready steps but {pending} pending steps remain ({detail})")]
    StuckExecution { pending: usize, detail: String },

    #[error("Rollback failed: {}", errors.join("; "))]
    Rollback { errors: Vec<String> },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Execution cancelled: {execution_id}")]
    Cancelled { execution_id: String },

    #[error("Execution {execution_id} is still {status} and cannot be retried")]
    ExecutionInProgress {
        execution_id: String,
        status: ExecutionState,
    },

    #[error("State transition error: {0}")]
    StateTransition(#[from] StateMachineError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

impl ToolplanError {
    /// Stable machine-readable code for API layers and log aggregation
    pub fn code(&self) -> &'static str {
        match self {
            Self::PlanNotFound { .. } => "PLAN_NOT_FOUND",
            Self::PlanLookup(_) => "PLAN_LOOKUP_ERROR",
            Self::InvalidPlan(_) => "INVALID_PLAN",
            Self::ParameterValidation { .. } => "PARAMETER_VALIDATION_ERROR",
            Self::ToolExecution { .. } => "TOOL_EXECUTION_ERROR",
            Self::StuckExecution { .. } => "STUCK_EXECUTION",
            Self::Rollback { .. } => "ROLLBACK_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Cancelled { .. } => "EXECUTION_CANCELLED",
            Self::ExecutionInProgress { .. } => "EXECUTION_IN_PROGRESS",
            Self::StateTransition(_) => "STATE_TRANSITION_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }

    /// Whether this failure came from orchestration bookkeeping rather than a step
    pub fn is_bookkeeping_failure(&self) -> bool {
        matches!(
            self,
            Self::StuckExecution { .. }
                | Self::Storage(_)
                | Self::Cancelled { .. }
                | Self::StateTransition(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ToolplanError>;
