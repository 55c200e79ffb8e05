//! Persisted execution aggregate, exposed to callers and API layers.

use super::step_result::StepResult;
use crate::state_machine::transitions::execution_target_state;
use crate::state_machine::{ExecutionEvent, ExecutionState, StateMachineResult, StepState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub execution_id: String,
    pub plan_request_id: String,
    pub status: ExecutionState,
    pub total_steps: usize,
    pub completed_steps: usize,
    pub failed_steps: usize,
    pub results: Vec<StepResult>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Execution {
    pub fn new(
        execution_id: impl Into<String>,
        plan_request_id: impl Into<String>,
        results: Vec<StepResult>,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            plan_request_id: plan_request_id.into(),
            status: ExecutionState::Pending,
            total_steps: results.len(),
            completed_steps: 0,
            failed_steps: 0,
            results,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    /// Apply a lifecycle event. Terminal transitions stamp `completed_at` and
    /// record the error message carried by the event.
    pub fn apply(&mut self, event: ExecutionEvent) -> StateMachineResult<ExecutionState> {
        let target = execution_target_state(self.status, &event)?;

        match event {
            ExecutionEvent::Fail(message) | ExecutionEvent::RollBack(message) => {
                self.error = Some(message);
            }
            ExecutionEvent::Cancel => {
                self.error = Some(crate::constants::CANCELLED_MESSAGE.to_string());
            }
            ExecutionEvent::Start | ExecutionEvent::Complete => {}
        }

        if target.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        self.status = target;
        Ok(target)
    }

    /// Recompute completed/failed counters from the step results
    pub fn refresh_counts(&mut self) {
        self.completed_steps = self
            .results
            .iter()
            .filter(|r| r.status == StepState::Completed)
            .count();
        self.failed_steps = self
            .results
            .iter()
            .filter(|r| r.status == StepState::Failed)
            .count();
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn step(&self, index: usize) -> Option<&StepResult> {
        self.results.iter().find(|r| r.step_index == index)
    }
}
