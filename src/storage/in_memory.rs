//! In-process execution store backed by a concurrent map.

use super::{ExecutionStore, StorageError, StorageResult};
use crate::models::{Execution, StepResult};
use crate::state_machine::ExecutionState;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct InMemoryExecutionStore {
    executions: Arc<DashMap<String, Execution>>,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.executions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executions.is_empty()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn save_execution(
        &self,
        execution_id: &str,
        plan_request_id: &str,
        total_steps: usize,
        initial_results: &[StepResult],
    ) -> StorageResult<()> {
        let mut execution = Execution::new(execution_id, plan_request_id, initial_results.to_vec());
        execution.total_steps = total_steps;
        execution.refresh_counts();

        debug!(
            execution_id = execution_id,
            total_steps = total_steps,
            "Saving execution record"
        );
        self.executions.insert(execution_id.to_string(), execution);
        Ok(())
    }

    async fn update_execution_status(
        &self,
        execution_id: &str,
        status: ExecutionState,
        error: Option<&str>,
    ) -> StorageResult<()> {
        let mut entry =
            self.executions
                .get_mut(execution_id)
                .ok_or_else(|| StorageError::NotFound {
                    execution_id: execution_id.to_string(),
                })?;

        if entry.status.is_terminal() {
            return Err(StorageError::TerminalState {
                execution_id: execution_id.to_string(),
                status: entry.status,
            });
        }

        entry.status = status;
        if let Some(message) = error {
            entry.error = Some(message.to_string());
        }
        if status.is_terminal() {
            entry.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn update_step_result(
        &self,
        execution_id: &str,
        step_index: usize,
        result: &StepResult,
    ) -> StorageResult<()> {
        let mut entry =
            self.executions
                .get_mut(execution_id)
                .ok_or_else(|| StorageError::NotFound {
                    execution_id: execution_id.to_string(),
                })?;

        let slot = entry
            .results
            .iter_mut()
            .find(|r| r.step_index == step_index)
            .ok_or_else(|| StorageError::UnknownStep {
                execution_id: execution_id.to_string(),
                step_index,
            })?;
        *slot = result.clone();
        Ok(())
    }

    async fn update_execution_progress(
        &self,
        execution_id: &str,
        completed_count: usize,
        failed_count: usize,
    ) -> StorageResult<()> {
        let mut entry =
            self.executions
                .get_mut(execution_id)
                .ok_or_else(|| StorageError::NotFound {
                    execution_id: execution_id.to_string(),
                })?;
        entry.completed_steps = completed_count;
        entry.failed_steps = failed_count;
        Ok(())
    }

    async fn get_execution_by_id(&self, execution_id: &str) -> StorageResult<Option<Execution>> {
        Ok(self
            .executions
            .get(execution_id)
            .map(|entry| entry.value().clone()))
    }

    async fn list_executions(
        &self,
        plan_request_id: Option<&str>,
    ) -> StorageResult<Vec<Execution>> {
        let mut executions: Vec<Execution> = self
            .executions
            .iter()
            .filter(|entry| plan_request_id.is_none_or(|id| entry.plan_request_id == id))
            .map(|entry| entry.value().clone())
            .collect();
        executions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(executions)
    }
}
