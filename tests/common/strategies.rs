use proptest::prelude::*;
use serde_json::{json, Value};
use toolplan_core::models::{Plan, Step, StepResult};
use toolplan_core::state_machine::StepEvent;

/// Random acyclic plan of 1-7 `_list` steps. Every dependency points to an
/// earlier step, and each step gets a distinct tool name so calls can be
/// mapped back to step indices.
pub fn acyclic_plan_strategy() -> impl Strategy<Value = Plan> {
    (1usize..=7).prop_flat_map(|size| {
        prop::collection::vec((prop::collection::vec(any::<bool>(), size), any::<bool>()), size)
            .prop_map(move |rows| {
                let steps = rows
                    .into_iter()
                    .enumerate()
                    .map(|(index, (mask, parallel))| {
                        let depends_on: Vec<usize> =
                            (0..index).filter(|&earlier| mask[earlier]).collect();
                        Step::new(list_tool(index), json!({}))
                            .depends_on(depends_on)
                            .parallel(parallel)
                    })
                    .collect();
                Plan::new(steps)
            })
    })
}

pub fn list_tool(index: usize) -> String {
    format!("entity{index}_list")
}

/// Index in the plan for a tool produced by [`acyclic_plan_strategy`]
pub fn step_index_of(tool: &str) -> Option<usize> {
    tool.strip_prefix("entity")?
        .strip_suffix("_list")?
        .parse()
        .ok()
}

fn tool_name_strategy() -> impl Strategy<Value = String> {
    (
        prop_oneof![Just("facility"), Just("shipment"), Just("client")],
        prop_oneof![
            Just("create"),
            Just("update"),
            Just("delete"),
            Just("list"),
            Just("get"),
        ],
    )
        .prop_map(|(entity, verb)| format!("{entity}_{verb}"))
}

/// Step results in mixed terminal states, as a finished execution would hold
pub fn settled_results_strategy() -> impl Strategy<Value = Vec<StepResult>> {
    prop::collection::vec((tool_name_strategy(), any::<bool>()), 0..10).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(index, (tool, completed))| {
                let step = Step::new(tool, json!({"name": format!("n{index}")}));
                let mut result = StepResult::pending(index, &step);
                result.apply(StepEvent::Start).unwrap();
                if completed {
                    result
                        .apply(StepEvent::Complete(json!({"id": format!("id-{index}")})))
                        .unwrap();
                } else {
                    result.apply(StepEvent::Fail("boom".to_string())).unwrap();
                }
                result
            })
            .collect()
    })
}

/// Small JSON documents with nested objects and arrays
pub fn json_payload_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-1000i64..1000).prop_map(|n| json!(n)),
        "[a-z0-9]{0,8}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

/// Reference expressions over steps 0-3 with short field/index paths
pub fn reference_expression_strategy() -> impl Strategy<Value = String> {
    (
        0usize..4,
        prop::collection::vec(
            prop_oneof![
                "[a-z]{1,6}".prop_map(|field| format!(".{field}")),
                (0usize..3).prop_map(|index| format!("[{index}]")),
            ],
            0..3,
        ),
    )
        .prop_map(|(step, segments)| format!("${{step_{step}.result{}}}", segments.concat()))
}
