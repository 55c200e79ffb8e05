//! # Execution Storage
//!
//! Storage contract consumed by the execution agent. Every call is async and
//! may fail; the agent persists after every step so observers see progress
//! incrementally. Step writes are keyed by `(execution_id, step_index)` and
//! never conflict with each other.

pub mod in_memory;

use crate::models::{Execution, StepResult};
use crate::state_machine::ExecutionState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use in_memory::InMemoryExecutionStore;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StorageError {
    #[error("Execution {execution_id} not found")]
    NotFound { execution_id: String },

    #[error("Execution {execution_id} is already {status}; terminal executions are read-only")]
    TerminalState {
        execution_id: String,
        status: ExecutionState,
    },

    #[error("Step {step_index} does not exist in execution {execution_id}")]
    UnknownStep {
        execution_id: String,
        step_index: usize,
    },

    #[error("Storage backend failure: {0}")]
    Backend(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Create the execution record with its initial PENDING step results
    async fn save_execution(
        &self,
        execution_id: &str,
        plan_request_id: &str,
        total_steps: usize,
        initial_results: &[StepResult],
    ) -> StorageResult<()>;

    async fn update_execution_status(
        &self,
        execution_id: &str,
        status: ExecutionState,
        error: Option<&str>,
    ) -> StorageResult<()>;

    async fn update_step_result(
        &self,
        execution_id: &str,
        step_index: usize,
        result: &StepResult,
    ) -> StorageResult<()>;

    async fn update_execution_progress(
        &self,
        execution_id: &str,
        completed_count: usize,
        failed_count: usize,
    ) -> StorageResult<()>;

    async fn get_execution_by_id(&self, execution_id: &str) -> StorageResult<Option<Execution>>;

    /// All executions, optionally restricted to one plan request, newest first
    async fn list_executions(&self, plan_request_id: Option<&str>)
        -> StorageResult<Vec<Execution>>;

    async fn statistics(&self) -> StorageResult<ExecutionStatistics> {
        let executions = self.list_executions(None).await?;
        Ok(ExecutionStatistics::from_executions(&executions))
    }
}

/// Aggregate view for monitoring collaborators
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStatistics {
    pub total_executions: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub rolled_back: usize,
    pub average_completed_steps: f64,
    /// Completed share of terminal executions (0.0 - 1.0)
    pub success_rate: f64,
}

impl ExecutionStatistics {
    pub fn from_executions(executions: &[Execution]) -> Self {
        let mut stats = Self {
            total_executions: executions.len(),
            ..Self::default()
        };

        for execution in executions {
            match execution.status {
                ExecutionState::Pending => stats.pending += 1,
                ExecutionState::Running => stats.running += 1,
                ExecutionState::Completed => stats.completed += 1,
                ExecutionState::Failed => stats.failed += 1,
                ExecutionState::RolledBack => stats.rolled_back += 1,
            }
        }

        if !executions.is_empty() {
            let completed_steps: usize = executions.iter().map(|e| e.completed_steps).sum();
            stats.average_completed_steps = completed_steps as f64 / executions.len() as f64;
        }

        let terminal = stats.completed + stats.failed + stats.rolled_back;
        if terminal > 0 {
            stats.success_rate = stats.completed as f64 / terminal as f64;
        }

        stats
    }
}
