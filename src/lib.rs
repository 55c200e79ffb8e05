#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

//! # Toolplan Core
//!
//! Execution orchestration core for multi-step tool plans.
//!
//! ## Overview
//!
//! A plan is an ordered list of steps, each naming a remote tool, its
//! parameters and the earlier steps it depends on. This crate executes such a
//! plan: it works out which steps are ready, runs them with bounded
//! concurrency, threads results from one step into the parameters of the
//! next, retries transient tool failures and rolls back completed side
//! effects when the execution fails.
//!
//! Plan generation, the tool catalog and persistent storage are external
//! collaborators, reached through the [`planning::PlanProvider`],
//! [`tools::ToolExecutor`] and [`storage::ExecutionStore`] traits.
//!
//! ## Module Organization
//!
//! - [`orchestration`] - Execution agent, orchestrator, resolver, retry and rollback
//! - [`models`] - Plans, steps, step results and execution records
//! - [`state_machine`] - Step and execution lifecycle states
//! - [`config`] - Layered configuration
//! - [`error`] - Structured error handling
//! - [`events`] - Lifecycle event broadcasting
//! - [`tools`] - Tool boundary and timeout combinator
//! - [`storage`] - Execution storage contract and in-memory store
//! - [`planning`] - Plan lookup contract
//! - [`logging`] - Tracing subscriber setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use toolplan_core::config::ExecutionConfigOverrides;
//! use toolplan_core::models::{Plan, Step};
//! use toolplan_core::orchestration::ExecutionAgent;
//! use toolplan_core::planning::{InMemoryPlanProvider, PlanRequest};
//! use toolplan_core::storage::InMemoryExecutionStore;
//! # use toolplan_core::tools::{ToolError, ToolExecutor, ToolResponse};
//! # struct Catalog;
//! # #[async_trait::async_trait]
//! # impl ToolExecutor for Catalog {
//! #     async fn execute(&self, _: &str, _: &serde_json::Value) -> Result<ToolResponse, ToolError> {
//! #         Ok(ToolResponse::ok(json!({"id": "f1"})))
//! #     }
//! # }
//!
//! # tokio_test::block_on(async {
//! let plans = Arc::new(InMemoryPlanProvider::new());
//! plans.insert(PlanRequest::new(
//!     "req-1",
//!     "show the first facility",
//!     Plan::new(vec![
//!         Step::new("facilities_list", json!({"limit": 1})),
//!         Step::new("facility_get", json!({"facility_id": "${step_0.result.id}"})).depends_on([0]),
//!     ]),
//! ));
//!
//! let agent = ExecutionAgent::new(plans, Arc::new(InMemoryExecutionStore::new()), Arc::new(Catalog));
//! let execution = agent.execute_plan("req-1", &ExecutionConfigOverrides::default()).await;
//! println!("{}: {}/{} steps", execution.status, execution.completed_steps, execution.total_steps);
//! # });
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod planning;
pub mod state_machine;
pub mod storage;
pub mod tools;

pub use config::{
    BackoffConfig, ConfigManager, ExecutionConfig, ExecutionConfigOverrides, LoggingConfig,
    ToolplanConfig,
};
pub use error::{Result, ToolplanError};
pub use events::EventPublisher;
pub use models::{Execution, Plan, Step, StepResult};
pub use orchestration::{ExecutionAgent, ExecutionStrategy, QueryComplexity, StrategyKind};
pub use planning::{InMemoryPlanProvider, PlanProvider, PlanRequest};
pub use state_machine::{ExecutionState, StepState};
pub use storage::{ExecutionStatistics, ExecutionStore, InMemoryExecutionStore};
pub use tools::{TimeoutToolExecutor, ToolError, ToolExecutor, ToolResponse};
