//! Plan input contract: an ordered list of steps with 0-based dependency indices.

use crate::error::{Result, ToolplanError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

/// One declared unit of work. Immutable once execution starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub tool: String,
    #[serde(default = "empty_params")]
    pub params: Value,
    #[serde(default)]
    pub depends_on: Vec<usize>,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default)]
    pub description: String,
}

fn empty_params() -> Value {
    Value::Object(serde_json::Map::new())
}

impl Step {
    pub fn new(tool: impl Into<String>, params: Value) -> Self {
        Self {
            tool: tool.into(),
            params,
            depends_on: Vec::new(),
            parallel: false,
            description: String::new(),
        }
    }

    pub fn depends_on(mut self, dependencies: impl IntoIterator<Item = usize>) -> Self {
        self.depends_on = dependencies.into_iter().collect();
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Free-form planner metadata (model, confidence, reasoning, ...)
pub type PlanMetadata = HashMap<String, Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<Step>,
    #[serde(default)]
    pub metadata: PlanMetadata,
}

impl Plan {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            metadata: PlanMetadata::new(),
        }
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.steps.iter().map(|step| step.tool.clone()).collect()
    }

    /// Reject structurally broken plans before any step runs.
    ///
    /// Forward references are tolerated (and logged); a dependency cycle is
    /// left to the driving loop, where it surfaces as a stuck execution.
    pub fn validate(&self) -> Result<()> {
        let total = self.steps.len();

        for (index, step) in self.steps.iter().enumerate() {
            if step.tool.trim().is_empty() {
                return Err(ToolplanError::InvalidPlan(format!(
                    "step {index} has an empty tool name"
                )));
            }

            if !(step.params.is_object() || step.params.is_null()) {
                return Err(ToolplanError::InvalidPlan(format!(
                    "step {index} params must be an object"
                )));
            }

            for &dependency in &step.depends_on {
                if dependency == index {
                    return Err(ToolplanError::InvalidPlan(format!(
                        "step {index} depends on itself"
                    )));
                }
                if dependency >= total {
                    return Err(ToolplanError::InvalidPlan(format!(
                        "step {index} depends on step {dependency}, but the plan has {total} steps"
                    )));
                }
                if dependency > index {
                    warn!(
                        step_index = index,
                        dependency = dependency,
                        "Step depends on a later step"
                    );
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plan_deserializes_camel_case_contract() {
        let plan: Plan = serde_json::from_value(json!({
            "steps": [
                {"tool": "facilities_list", "params": {"page": 1}, "dependsOn": [], "parallel": true, "description": "list"},
                {"tool": "facility_get", "params": {"facility_id": "${step_0.result[0].id}"}, "dependsOn": [0]}
            ],
            "metadata": {"confidence": 0.9}
        }))
        .unwrap();

        assert_eq!(plan.steps.len(), 2);
        assert!(plan.steps[0].parallel);
        assert_eq!(plan.steps[1].depends_on, vec![0]);
        assert!(!plan.steps[1].parallel);
        assert_eq!(plan.metadata["confidence"], json!(0.9));
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_self_and_out_of_range_references() {
        let plan = Plan::new(vec![Step::new("a_list", json!({})).depends_on([0])]);
        assert!(matches!(plan.validate(), Err(ToolplanError::InvalidPlan(_))));

        let plan = Plan::new(vec![Step::new("a_list", json!({})).depends_on([4])]);
        assert!(matches!(plan.validate(), Err(ToolplanError::InvalidPlan(_))));

        let plan = Plan::new(vec![Step::new("  ", json!({}))]);
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_validate_tolerates_forward_references() {
        let plan = Plan::new(vec![
            Step::new("a_get", json!({})).depends_on([1]),
            Step::new("b_list", json!({})),
        ]);
        assert!(plan.validate().is_ok());
    }
}
