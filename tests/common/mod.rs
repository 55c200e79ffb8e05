//! Shared test doubles for the integration tests.
//!
//! `MockToolExecutor` stands in for the remote tool catalog: it records every
//! call, tracks how many calls are in flight at once and follows a scripted
//! behaviour per tool. `FlakyStore` wraps the in-memory store and can be told
//! to fail specific storage operations.

#![allow(dead_code)]

pub mod strategies;

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use toolplan_core::config::{ExecutionConfigOverrides, ToolplanConfig};
use toolplan_core::models::{Execution, Plan, StepResult};
use toolplan_core::orchestration::ExecutionAgent;
use toolplan_core::planning::{InMemoryPlanProvider, PlanRequest};
use toolplan_core::state_machine::ExecutionState;
use toolplan_core::storage::{
    ExecutionStore, InMemoryExecutionStore, StorageError, StorageResult,
};
use toolplan_core::tools::{ToolError, ToolExecutor, ToolResponse};

pub const PLAN_ID: &str = "plan-1";

/// Scripted behaviour for one tool
#[derive(Debug, Clone)]
pub enum ToolBehavior {
    /// Always answer with this `data` payload
    Succeed(Value),
    /// Throw for the first `times` calls, then answer with `then`
    FailTimes { times: u32, then: Value },
    /// Throw on every call
    AlwaysFail(String),
    /// Answer `{ success: false, error }` on every call
    Reject(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub tool: String,
    pub params: Value,
}

/// Ordered start/end markers, one pair per call
#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    Start(String),
    End(String),
}

#[derive(Debug, Default, Clone)]
pub struct MockToolState {
    pub calls: Vec<ToolCall>,
    pub events: Vec<CallEvent>,
    pub in_flight: usize,
    pub max_in_flight: usize,
}

pub struct MockToolExecutor {
    state: Arc<Mutex<MockToolState>>,
    behaviors: Mutex<HashMap<String, ToolBehavior>>,
    /// Simulated latency for every call
    execution_delay: Option<Duration>,
}

impl MockToolExecutor {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockToolState::default())),
            behaviors: Mutex::new(HashMap::new()),
            execution_delay: None,
        }
    }

    pub fn with_execution_delay(mut self, delay: Duration) -> Self {
        self.execution_delay = Some(delay);
        self
    }

    pub fn with_behavior(self, tool: &str, behavior: ToolBehavior) -> Self {
        self.set_behavior(tool, behavior);
        self
    }

    pub fn set_behavior(&self, tool: &str, behavior: ToolBehavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(tool.to_string(), behavior);
    }

    pub fn get_state(&self) -> MockToolState {
        self.state.lock().unwrap().clone()
    }

    pub fn calls_to(&self, tool: &str) -> Vec<ToolCall> {
        self.get_state()
            .calls
            .into_iter()
            .filter(|call| call.tool == tool)
            .collect()
    }

    pub fn call_count(&self, tool: &str) -> usize {
        self.calls_to(tool).len()
    }
}

#[async_trait]
impl ToolExecutor for MockToolExecutor {
    async fn execute(&self, tool_name: &str, params: &Value) -> Result<ToolResponse, ToolError> {
        let previous_calls = {
            let mut state = self.state.lock().unwrap();
            let previous = state.calls.iter().filter(|c| c.tool == tool_name).count() as u32;
            state.calls.push(ToolCall {
                tool: tool_name.to_string(),
                params: params.clone(),
            });
            state.events.push(CallEvent::Start(tool_name.to_string()));
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
            previous
        };

        if let Some(delay) = self.execution_delay {
            tokio::time::sleep(delay).await;
        }

        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(tool_name)
            .cloned()
            .unwrap_or_else(|| {
                ToolBehavior::Succeed(json!({"id": format!("{}-1", tool_name.replace('_', "-"))}))
            });

        {
            let mut state = self.state.lock().unwrap();
            state.in_flight -= 1;
            state.events.push(CallEvent::End(tool_name.to_string()));
        }

        match behavior {
            ToolBehavior::Succeed(data) => Ok(ToolResponse::ok(data)),
            ToolBehavior::FailTimes { times, then } if previous_calls >= times => {
                Ok(ToolResponse::ok(then))
            }
            ToolBehavior::FailTimes { .. } => Err(ToolError::failed(
                tool_name,
                format!("transient failure #{}", previous_calls + 1),
            )),
            ToolBehavior::AlwaysFail(message) => Err(ToolError::failed(tool_name, message)),
            ToolBehavior::Reject(message) => Ok(ToolResponse::failed(message)),
        }
    }
}

/// Which storage operations should fail
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreFailures {
    pub save: bool,
    pub step_updates: bool,
    pub status_updates: bool,
}

/// In-memory store with injectable failures
pub struct FlakyStore {
    inner: InMemoryExecutionStore,
    failures: StoreFailures,
}

impl FlakyStore {
    pub fn new(failures: StoreFailures) -> Self {
        Self {
            inner: InMemoryExecutionStore::new(),
            failures,
        }
    }

    fn fail(operation: &str) -> StorageError {
        StorageError::Backend(format!("{operation} unavailable"))
    }
}

#[async_trait]
impl ExecutionStore for FlakyStore {
    async fn save_execution(
        &self,
        execution_id: &str,
        plan_request_id: &str,
        total_steps: usize,
        initial_results: &[StepResult],
    ) -> StorageResult<()> {
        if self.failures.save {
            return Err(Self::fail("save_execution"));
        }
        self.inner
            .save_execution(execution_id, plan_request_id, total_steps, initial_results)
            .await
    }

    async fn update_execution_status(
        &self,
        execution_id: &str,
        status: ExecutionState,
        error: Option<&str>,
    ) -> StorageResult<()> {
        if self.failures.status_updates {
            return Err(Self::fail("update_execution_status"));
        }
        self.inner
            .update_execution_status(execution_id, status, error)
            .await
    }

    async fn update_step_result(
        &self,
        execution_id: &str,
        step_index: usize,
        result: &StepResult,
    ) -> StorageResult<()> {
        if self.failures.step_updates {
            return Err(Self::fail("update_step_result"));
        }
        self.inner
            .update_step_result(execution_id, step_index, result)
            .await
    }

    async fn update_execution_progress(
        &self,
        execution_id: &str,
        completed_count: usize,
        failed_count: usize,
    ) -> StorageResult<()> {
        self.inner
            .update_execution_progress(execution_id, completed_count, failed_count)
            .await
    }

    async fn get_execution_by_id(&self, execution_id: &str) -> StorageResult<Option<Execution>> {
        self.inner.get_execution_by_id(execution_id).await
    }

    async fn list_executions(
        &self,
        plan_request_id: Option<&str>,
    ) -> StorageResult<Vec<Execution>> {
        self.inner.list_executions(plan_request_id).await
    }
}

/// Agent, store and tool double wired around a single stored plan
pub struct Harness {
    pub agent: Arc<ExecutionAgent>,
    pub store: Arc<InMemoryExecutionStore>,
    pub tools: Arc<MockToolExecutor>,
    pub plans: Arc<InMemoryPlanProvider>,
}

impl Harness {
    pub fn new(query: &str, plan: Plan, tools: MockToolExecutor) -> Self {
        Self::with_config(query, plan, tools, ToolplanConfig::default())
    }

    pub fn with_config(
        query: &str,
        plan: Plan,
        tools: MockToolExecutor,
        config: ToolplanConfig,
    ) -> Self {
        let plans = Arc::new(InMemoryPlanProvider::new());
        plans.insert(PlanRequest::new(PLAN_ID, query, plan));
        let store = Arc::new(InMemoryExecutionStore::new());
        let tools = Arc::new(tools);

        let agent = ExecutionAgent::with_config(
            plans.clone(),
            store.clone(),
            tools.clone(),
            config,
        );

        Self {
            agent: Arc::new(agent),
            store,
            tools,
            plans,
        }
    }

    pub async fn run(&self, overrides: ExecutionConfigOverrides) -> Execution {
        self.agent.execute_plan(PLAN_ID, &overrides).await
    }

    pub async fn stored(&self, execution_id: &str) -> Execution {
        self.store
            .get_execution_by_id(execution_id)
            .await
            .unwrap()
            .expect("execution should be persisted")
    }
}

/// Overrides with near-zero retry delays
pub fn fast_overrides() -> ExecutionConfigOverrides {
    ExecutionConfigOverrides {
        retry_delay_ms: Some(1),
        ..Default::default()
    }
}
