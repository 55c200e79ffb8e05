//! # System Constants
//!
//! Event names, execution defaults and resolver sentinels shared across the
//! orchestration core.

/// Lifecycle events published by the execution agent
pub mod events {
    pub const EXECUTION_STARTED: &str = "execution.started";
    pub const EXECUTION_COMPLETED: &str = "execution.completed";
    pub const EXECUTION_FAILED: &str = "execution.failed";
    pub const EXECUTION_ROLLED_BACK: &str = "execution.rolled_back";
    pub const EXECUTION_CANCELLED: &str = "execution.cancelled";

    pub const STEP_STARTED: &str = "step.started";
    pub const STEP_COMPLETED: &str = "step.completed";
    pub const STEP_FAILED: &str = "step.failed";
    pub const STEP_RETRY: &str = "step.retry";

    pub const STRATEGY_SELECTED: &str = "orchestration.strategy_selected";
    pub const READY_STEPS_DISCOVERED: &str = "orchestration.ready_steps_discovered";
}

/// Defaults for caller-supplied execution configuration
pub mod defaults {
    pub const MAX_RETRIES: u32 = 3;
    pub const RETRY_DELAY_MS: u64 = 1000;
    pub const ENABLE_ROLLBACK: bool = true;
    pub const CONTINUE_ON_ERROR: bool = false;
    pub const PARALLEL_EXECUTION_LIMIT: usize = 5;

    pub const BACKOFF_MULTIPLIER: f64 = 2.0;
    pub const BACKOFF_MAX_DELAY_MS: u64 = 30_000;

    pub const EVENT_CHANNEL_CAPACITY: usize = 1000;
}

/// Placeholder substituted for identifier parameters whose reference could not
/// be resolved. Deliberately fails the identifier shape check.
pub const UNRESOLVED_ID_SENTINEL: &str = "__unresolved_reference__";

/// Default fallback for `limit`-named parameters
pub const FALLBACK_LIMIT: i64 = 10;

/// Default fallback for `page`-named parameters
pub const FALLBACK_PAGE: i64 = 1;

/// Default fallback for `status`-named parameters
pub const FALLBACK_STATUS: &str = "active";

/// Error message recorded on an execution cancelled by a caller
pub const CANCELLED_MESSAGE: &str = "Execution cancelled";
