//! Run-time record of one step's execution, owned by a single execution run.

use super::plan::Step;
use crate::state_machine::transitions::step_target_state;
use crate::state_machine::{StateMachineResult, StepEvent, StepState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub step_index: usize,
    pub tool: String,
    /// Parameters as sent to the tool (after reference resolution)
    pub params: Value,
    pub status: StepState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub retry_count: u32,
    pub dependencies: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl StepResult {
    /// Fresh PENDING record for a plan step
    pub fn pending(step_index: usize, step: &Step) -> Self {
        Self {
            step_index,
            tool: step.tool.clone(),
            params: step.params.clone(),
            status: StepState::Pending,
            result: None,
            error: None,
            retry_count: 0,
            dependencies: step.depends_on.clone(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Apply a lifecycle event, stamping timestamps and payloads
    pub fn apply(&mut self, event: StepEvent) -> StateMachineResult<StepState> {
        let target = step_target_state(self.status, &event)?;
        let now = Utc::now();

        match event {
            StepEvent::Start => {
                self.started_at = Some(now);
            }
            StepEvent::Complete(data) => {
                self.result = Some(data);
                self.error = None;
                self.completed_at = Some(now);
            }
            StepEvent::Fail(message) | StepEvent::Skip(message) => {
                self.error = Some(message);
                self.completed_at = Some(now);
            }
        }

        self.status = target;
        Ok(target)
    }

    pub fn is_completed(&self) -> bool {
        self.status == StepState::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.status == StepState::Failed
    }

    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}
