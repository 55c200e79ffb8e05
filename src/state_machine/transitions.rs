use super::errors::{StateMachineError, StateMachineResult};
use super::events::{ExecutionEvent, StepEvent};
use super::states::{ExecutionState, StepState};

/// Target state for a step event, or an error for an illegal transition
pub fn step_target_state(current: StepState, event: &StepEvent) -> StateMachineResult<StepState> {
    let target = match (current, event) {
        (StepState::Pending, StepEvent::Start) => StepState::Running,
        (StepState::Running, StepEvent::Complete(_)) => StepState::Completed,
        (StepState::Running, StepEvent::Fail(_)) => StepState::Failed,
        (StepState::Pending, StepEvent::Skip(_)) => StepState::Failed,
        (from, event) => {
            return Err(StateMachineError::InvalidTransition {
                from: from.to_string(),
                event: event.event_type().to_string(),
            })
        }
    };
    Ok(target)
}

/// Target state for an execution event, or an error for an illegal transition
pub fn execution_target_state(
    current: ExecutionState,
    event: &ExecutionEvent,
) -> StateMachineResult<ExecutionState> {
    let target = match (current, event) {
        (ExecutionState::Pending, ExecutionEvent::Start) => ExecutionState::Running,
        (ExecutionState::Running, ExecutionEvent::Complete) => ExecutionState::Completed,
        (ExecutionState::Pending | ExecutionState::Running, ExecutionEvent::Fail(_)) => {
            ExecutionState::Failed
        }
        (ExecutionState::Running, ExecutionEvent::RollBack(_)) => ExecutionState::RolledBack,
        (ExecutionState::Pending | ExecutionState::Running, ExecutionEvent::Cancel) => {
            ExecutionState::Failed
        }
        (from, event) => {
            return Err(StateMachineError::InvalidTransition {
                from: from.to_string(),
                event: event.event_type().to_string(),
            })
        }
    };
    Ok(target)
}
