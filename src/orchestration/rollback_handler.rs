//! # Rollback Handler
//!
//! Best-effort reversal of completed side-effecting steps. Inverses are
//! derived from tool naming: `_create` is undone by `_delete`, `_delete` by
//! `_create`, and `_update` by re-applying itself. The update inverse does not
//! restore prior values.
//!
//! Rollback steps run one at a time in strictly decreasing original step
//! index, each with a single attempt. A failing rollback step is recorded and
//! the remaining steps still run.

use crate::models::{Step, StepResult};
use crate::state_machine::StepState;
use crate::tools::ToolExecutor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One inverse operation, tied to the step it undoes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackStep {
    pub original_step_index: usize,
    pub original_tool: String,
    pub step: Step,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackPlan {
    /// Reverse chronological order
    pub steps: Vec<RollbackStep>,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl RollbackPlan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackStepResult {
    pub original_step_index: usize,
    pub tool: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackReport {
    pub success: bool,
    pub results: Vec<RollbackStepResult>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackStats {
    pub total_steps: usize,
    pub supported_steps: usize,
    pub unsupported_steps: usize,
    /// 0.0 - 1.0; zero for an empty plan
    pub support_rate: f64,
}

/// Inverse tool for a side-effecting tool, by naming convention
pub fn get_inverse_operation(tool_name: &str) -> Option<String> {
    let inverse = if let Some(entity) = tool_name.strip_suffix("_create") {
        Some(format!("{entity}_delete"))
    } else if let Some(entity) = tool_name.strip_suffix("_delete") {
        Some(format!("{entity}_create"))
    } else if tool_name.ends_with("_update") {
        Some(tool_name.to_string())
    } else {
        None
    };
    // A bare suffix names no entity
    inverse.filter(|inverse| !inverse.starts_with('_'))
}

pub fn supports_rollback(tool_name: &str) -> bool {
    get_inverse_operation(tool_name).is_some()
}

/// Identifier of the entity a `_create` step produced
fn extract_created_id(result: &Value) -> Option<Value> {
    let object = match result {
        Value::Array(items) => items.first()?.as_object()?,
        other => other.as_object()?,
    };

    let usable = |value: &Value| match value {
        Value::String(s) if !s.is_empty() => Some(value.clone()),
        Value::Number(_) => Some(value.clone()),
        _ => None,
    };

    object
        .get("id")
        .and_then(usable)
        .or_else(|| object.get("_id").and_then(usable))
        .or_else(|| {
            object
                .iter()
                .filter(|(key, _)| key.ends_with("_id"))
                .find_map(|(_, value)| usable(value))
        })
        .or_else(|| object.get("data").and_then(extract_created_id))
}

pub struct RollbackHandler {
    tool_executor: Arc<dyn ToolExecutor>,
}

impl RollbackHandler {
    pub fn new(tool_executor: Arc<dyn ToolExecutor>) -> Self {
        Self { tool_executor }
    }

    /// Inverse operations for the COMPLETED entries of `step_results`, most
    /// recent step first. Steps without an inverse, or creates whose result
    /// carries no identifier, are left out.
    pub fn generate_rollback_plan(
        &self,
        step_results: &[StepResult],
        reason: impl Into<String>,
    ) -> RollbackPlan {
        let mut steps: Vec<RollbackStep> = step_results
            .iter()
            .filter(|result| result.status == StepState::Completed)
            .filter_map(|result| self.rollback_step_for(result))
            .collect();
        steps.sort_by(|a, b| b.original_step_index.cmp(&a.original_step_index));

        let plan = RollbackPlan {
            steps,
            reason: reason.into(),
            created_at: Utc::now(),
        };
        debug!(
            rollback_steps = plan.steps.len(),
            reason = %plan.reason,
            "Generated rollback plan"
        );
        plan
    }

    fn rollback_step_for(&self, result: &StepResult) -> Option<RollbackStep> {
        let inverse = get_inverse_operation(&result.tool)?;

        let params = if result.tool.ends_with("_create") {
            match result.result.as_ref().and_then(extract_created_id) {
                Some(id) => json!({ "id": id }),
                None => {
                    warn!(
                        step_index = result.step_index,
                        tool = %result.tool,
                        "Created entity has no identifier; step cannot be rolled back"
                    );
                    return None;
                }
            }
        } else {
            result.params.clone()
        };

        Some(RollbackStep {
            original_step_index: result.step_index,
            original_tool: result.tool.clone(),
            step: Step::new(inverse, params).with_description(format!(
                "Rollback of step {} ({})",
                result.step_index, result.tool
            )),
        })
    }

    /// Run every rollback step sequentially; failures are collected, not raised
    pub async fn execute_rollback(&self, plan: &RollbackPlan) -> RollbackReport {
        let mut results = Vec::with_capacity(plan.steps.len());
        let mut errors = Vec::new();

        for rollback_step in &plan.steps {
            let tool = &rollback_step.step.tool;
            let outcome = match self
                .tool_executor
                .execute(tool, &rollback_step.step.params)
                .await
            {
                Ok(response) => response.into_data(tool),
                Err(error) => Err(error),
            };

            match outcome {
                Ok(data) => {
                    debug!(
                        original_step_index = rollback_step.original_step_index,
                        tool = %tool,
                        "Rollback step succeeded"
                    );
                    results.push(RollbackStepResult {
                        original_step_index: rollback_step.original_step_index,
                        tool: tool.clone(),
                        success: true,
                        data: Some(data),
                        error: None,
                    });
                }
                Err(error) => {
                    let message = format!(
                        "Rollback of step {} via {} failed: {}",
                        rollback_step.original_step_index, tool, error
                    );
                    warn!(
                        original_step_index = rollback_step.original_step_index,
                        tool = %tool,
                        error = %error,
                        "Rollback step failed"
                    );
                    results.push(RollbackStepResult {
                        original_step_index: rollback_step.original_step_index,
                        tool: tool.clone(),
                        success: false,
                        data: None,
                        error: Some(error.to_string()),
                    });
                    errors.push(message);
                }
            }
        }

        info!(
            rollback_steps = plan.steps.len(),
            failures = errors.len(),
            "Rollback finished"
        );

        RollbackReport {
            success: errors.is_empty(),
            results,
            errors,
        }
    }

    pub fn supports_rollback(&self, tool_name: &str) -> bool {
        supports_rollback(tool_name)
    }

    /// Rollback coverage of a plan's steps
    pub fn get_rollback_stats(&self, steps: &[Step]) -> RollbackStats {
        let total_steps = steps.len();
        let supported_steps = steps
            .iter()
            .filter(|step| supports_rollback(&step.tool))
            .count();
        let support_rate = if total_steps == 0 {
            0.0
        } else {
            supported_steps as f64 / total_steps as f64
        };

        RollbackStats {
            total_steps,
            supported_steps,
            unsupported_steps: total_steps - supported_steps,
            support_rate,
        }
    }

    /// Structural problems in a rollback plan; empty when the plan is sound
    pub fn validate_rollback_plan(&self, plan: &RollbackPlan) -> Vec<String> {
        let mut errors = Vec::new();
        for (position, rollback_step) in plan.steps.iter().enumerate() {
            let step = &rollback_step.step;
            if step.tool.trim().is_empty() {
                errors.push(format!("Rollback step {position} has an empty tool name"));
                continue;
            }
            if !step.params.is_object() {
                errors.push(format!(
                    "Rollback step {position} ({}) has missing or invalid params",
                    step.tool
                ));
            }
            if !supports_rollback(&step.tool) {
                errors.push(format!(
                    "Rollback step {position} uses unsupported tool {}",
                    step.tool
                ));
            }
        }
        errors
    }
}
