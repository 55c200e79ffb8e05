use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Events that move a step through its lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum StepEvent {
    /// Scheduler picked the step
    Start,
    /// Tool succeeded; carries the unwrapped `data` payload
    Complete(Value),
    /// Validation or tool failure
    Fail(String),
    /// Never scheduled because an upstream step failed
    Skip(String),
}

impl StepEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Complete(_) => "complete",
            Self::Fail(_) => "fail",
            Self::Skip(_) => "skip",
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) | Self::Skip(msg) => Some(msg),
            _ => None,
        }
    }
}

/// Events that move an execution through its lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ExecutionEvent {
    Start,
    Complete,
    Fail(String),
    RollBack(String),
    Cancel,
}

impl ExecutionEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Complete => "complete",
            Self::Fail(_) => "fail",
            Self::RollBack(_) => "roll_back",
            Self::Cancel => "cancel",
        }
    }

    pub fn fail_with_error(error: impl Into<String>) -> Self {
        Self::Fail(error.into())
    }
}
