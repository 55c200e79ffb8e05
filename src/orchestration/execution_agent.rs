//! # Execution Agent
//!
//! Drives one execution from plan lookup to a terminal status. The agent is
//! the only component that talks to storage and to the tool boundary.
//!
//! ## Driving loop
//!
//! Each pass computes the ready set, sorts it, and runs it as concurrent
//! groups separated by hard barriers: intelligent batches under the `complex`
//! and `batched` strategies, otherwise the parallel-flagged steps as one
//! group followed by the sequential steps one at a time. Group members are
//! joined on the calling task; no step is spawned.
//!
//! Per step: mark RUNNING and persist, resolve references, validate
//! parameters, call the tool through the retry handler, record the outcome,
//! update the completion sets and persist progress.
//!
//! ## Terminal outcomes
//!
//! - every step settled without an abort: COMPLETED (failed steps are
//!   tolerated under `continue_on_error`)
//! - a step abort or stuck state with rollback enabled and something to undo:
//!   ROLLED_BACK when every inverse succeeded, FAILED otherwise
//! - storage failures, plan lookup failures and invalid plans: FAILED
//! - cancellation: FAILED with the cancellation message
//!
//! `execute_plan` always returns an [`Execution`] record; failures are
//! reported through its `status` and `error`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use toolplan_core::config::ExecutionConfigOverrides;
//! use toolplan_core::orchestration::ExecutionAgent;
//! use toolplan_core::planning::InMemoryPlanProvider;
//! use toolplan_core::storage::InMemoryExecutionStore;
//! # use toolplan_core::tools::{ToolError, ToolExecutor, ToolResponse};
//! # struct Catalog;
//! # #[async_trait::async_trait]
//! # impl ToolExecutor for Catalog {
//! #     async fn execute(&self, _: &str, _: &serde_json::Value) -> Result<ToolResponse, ToolError> {
//! #         Ok(ToolResponse::ok(serde_json::json!([])))
//! #     }
//! # }
//!
//! # tokio_test::block_on(async {
//! let agent = ExecutionAgent::new(
//!     Arc::new(InMemoryPlanProvider::new()),
//!     Arc::new(InMemoryExecutionStore::new()),
//!     Arc::new(Catalog),
//! );
//! let execution = agent
//!     .execute_plan("plan-request-id", &ExecutionConfigOverrides::default())
//!     .await;
//! println!("{} finished as {}", execution.execution_id, execution.status);
//! # });
//! ```

use super::execution_orchestrator::{ExecutionContext, ExecutionOrchestrator};
use super::parameter_validator::ParameterValidator;
use super::reference_resolver::ReferenceResolver;
use super::retry_handler::{RetryHandler, RetryOutcome, RetryPolicy};
use super::rollback_handler::RollbackHandler;
use crate::config::{ExecutionConfig, ExecutionConfigOverrides, ToolplanConfig};
use crate::constants::{events, CANCELLED_MESSAGE};
use crate::error::{Result, ToolplanError};
use crate::events::EventPublisher;
use crate::logging::{log_error, log_execution_operation, log_step_operation};
use crate::models::{Execution, Step, StepResult};
use crate::planning::{PlanProvider, PlanRequest};
use crate::state_machine::{ExecutionEvent, ExecutionState, StepEvent, StepState};
use crate::storage::{ExecutionStore, StorageError};
use crate::tools::{TimeoutToolExecutor, ToolError, ToolExecutor};
use dashmap::DashSet;
use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Mutable state of one run; the lock is never held across an await
struct RunState {
    context: ExecutionContext,
    results: Vec<StepResult>,
}

/// Everything a run needs, borrowed for the duration of the driving loop
struct Run<'a> {
    execution_id: &'a str,
    steps: &'a [Step],
    config: ExecutionConfig,
    orchestrator: ExecutionOrchestrator,
    retry_handler: RetryHandler,
    state: Mutex<RunState>,
}

impl Run<'_> {
    fn progress(&self) -> (usize, usize) {
        let state = self.state.lock();
        (
            state.context.completed_steps().len(),
            state.context.failed_steps().len(),
        )
    }

    fn results(&self) -> Vec<StepResult> {
        self.state.lock().results.clone()
    }
}

pub struct ExecutionAgent {
    plan_provider: Arc<dyn PlanProvider>,
    store: Arc<dyn ExecutionStore>,
    tool_executor: Arc<dyn ToolExecutor>,
    rollback_handler: RollbackHandler,
    event_publisher: EventPublisher,
    resolver: ReferenceResolver,
    validator: ParameterValidator,
    config: ToolplanConfig,
    cancelled: DashSet<String>,
}

impl ExecutionAgent {
    pub fn new(
        plan_provider: Arc<dyn PlanProvider>,
        store: Arc<dyn ExecutionStore>,
        tool_executor: Arc<dyn ToolExecutor>,
    ) -> Self {
        Self::with_config(plan_provider, store, tool_executor, ToolplanConfig::default())
    }

    /// Build an agent with explicit configuration. When `tool_timeout_ms` is
    /// set, every tool call (including rollback calls) is raced against it.
    pub fn with_config(
        plan_provider: Arc<dyn PlanProvider>,
        store: Arc<dyn ExecutionStore>,
        tool_executor: Arc<dyn ToolExecutor>,
        config: ToolplanConfig,
    ) -> Self {
        let tool_executor: Arc<dyn ToolExecutor> = match config.tool_timeout() {
            Some(limit) => Arc::new(TimeoutToolExecutor::new(tool_executor, limit)),
            None => tool_executor,
        };

        Self {
            plan_provider,
            store,
            rollback_handler: RollbackHandler::new(tool_executor.clone()),
            tool_executor,
            event_publisher: EventPublisher::default(),
            resolver: ReferenceResolver::new(),
            validator: ParameterValidator::new(),
            config,
            cancelled: DashSet::new(),
        }
    }

    pub fn with_event_publisher(mut self, event_publisher: EventPublisher) -> Self {
        self.event_publisher = event_publisher;
        self
    }

    pub fn event_publisher(&self) -> &EventPublisher {
        &self.event_publisher
    }

    pub fn config(&self) -> &ToolplanConfig {
        &self.config
    }

    /// Execute the plan stored under `plan_request_id`
    #[instrument(skip(self, overrides))]
    pub async fn execute_plan(
        &self,
        plan_request_id: &str,
        overrides: &ExecutionConfigOverrides,
    ) -> Execution {
        let execution_id = Uuid::new_v4().to_string();

        let request = match self.plan_provider.get_plan_request(plan_request_id).await {
            Ok(Some(request)) => request,
            Ok(None) => {
                return self.rejected_execution(
                    &execution_id,
                    plan_request_id,
                    ToolplanError::PlanNotFound {
                        plan_request_id: plan_request_id.to_string(),
                    },
                )
            }
            Err(error) => {
                return self.rejected_execution(&execution_id, plan_request_id, error.into())
            }
        };

        let config = self.config.execution.merged_with(overrides);
        self.run_plan(&execution_id, &request, config).await
    }

    /// Start a fresh execution of the plan behind a finished execution
    #[instrument(skip(self, overrides))]
    pub async fn retry_execution(
        &self,
        execution_id: &str,
        overrides: &ExecutionConfigOverrides,
    ) -> Result<Execution> {
        let previous = self
            .store
            .get_execution_by_id(execution_id)
            .await?
            .ok_or_else(|| StorageError::NotFound {
                execution_id: execution_id.to_string(),
            })?;

        if !previous.is_terminal() {
            return Err(ToolplanError::ExecutionInProgress {
                execution_id: execution_id.to_string(),
                status: previous.status,
            });
        }

        info!(
            previous_execution_id = execution_id,
            plan_request_id = %previous.plan_request_id,
            "Retrying execution"
        );
        Ok(self
            .execute_plan(&previous.plan_request_id, overrides)
            .await)
    }

    /// Mark a running execution FAILED. In-flight tool calls are not
    /// interrupted; the driving loop stops before its next readiness pass.
    #[instrument(skip(self))]
    pub async fn cancel_execution(&self, execution_id: &str) -> Result<Execution> {
        self.cancelled.insert(execution_id.to_string());

        let outcome = self
            .store
            .update_execution_status(
                execution_id,
                ExecutionState::Failed,
                Some(CANCELLED_MESSAGE),
            )
            .await;
        if let Err(error) = outcome {
            self.cancelled.remove(execution_id);
            return Err(error.into());
        }

        log_execution_operation("cancel", execution_id, None, "FAILED", None);
        self.publish(events::EXECUTION_CANCELLED, execution_id, json!({}));

        self.store
            .get_execution_by_id(execution_id)
            .await?
            .ok_or_else(|| {
                ToolplanError::from(StorageError::NotFound {
                    execution_id: execution_id.to_string(),
                })
            })
    }

    pub async fn get_execution(&self, execution_id: &str) -> Result<Option<Execution>> {
        Ok(self.store.get_execution_by_id(execution_id).await?)
    }

    /// Executions of one plan request, newest first
    pub async fn list_executions(&self, plan_request_id: Option<&str>) -> Result<Vec<Execution>> {
        Ok(self.store.list_executions(plan_request_id).await?)
    }

    fn publish(&self, name: &str, execution_id: &str, context: Value) {
        if let Err(error) = self.event_publisher.publish(name, execution_id, context) {
            warn!(event = name, execution_id = execution_id, error = %error, "Failed to publish event");
        }
    }

    /// FAILED record for an execution that never started; not persisted
    fn rejected_execution(
        &self,
        execution_id: &str,
        plan_request_id: &str,
        error: ToolplanError,
    ) -> Execution {
        log_error(
            "execution_agent",
            "execute_plan",
            &error.to_string(),
            Some(error.code()),
        );

        let mut execution = Execution::new(execution_id, plan_request_id, Vec::new());
        if let Err(transition) = execution.apply(ExecutionEvent::Fail(error.to_string())) {
            warn!(execution_id = execution_id, error = %transition, "Could not mark execution failed");
        }
        execution
    }

    async fn run_plan(
        &self,
        execution_id: &str,
        request: &PlanRequest,
        config: ExecutionConfig,
    ) -> Execution {
        let steps = &request.plan.steps;

        if let Err(error) = request.plan.validate() {
            return self.rejected_execution(execution_id, &request.id, error);
        }

        let mut orchestrator = ExecutionOrchestrator::new();
        let complexity = orchestrator.analyze_and_set_strategy(&request.query, &request.plan.tool_names());
        self.publish(
            events::STRATEGY_SELECTED,
            execution_id,
            json!({
                "strategy": complexity.strategy,
                "score": complexity.score,
                "opportunities": complexity.parallelization_opportunities,
                "riskFactors": complexity.risk_factors,
            }),
        );

        let initial_results: Vec<StepResult> = steps
            .iter()
            .enumerate()
            .map(|(index, step)| StepResult::pending(index, step))
            .collect();
        let mut execution = Execution::new(execution_id, &request.id, initial_results.clone());

        if let Err(error) = self
            .store
            .save_execution(execution_id, &request.id, steps.len(), &initial_results)
            .await
        {
            return self.rejected_execution(execution_id, &request.id, error.into());
        }

        let retry_handler = RetryHandler::new(RetryPolicy::new(&config, &self.config.backoff));
        let context = orchestrator.create_context(execution_id, config.clone());
        let run = Run {
            execution_id,
            steps,
            config,
            orchestrator,
            retry_handler,
            state: Mutex::new(RunState {
                context,
                results: initial_results,
            }),
        };

        let outcome = match self.start_execution(&mut execution).await {
            Ok(()) => self.drive(&run).await,
            Err(error) => Err(error),
        };

        execution.results = run.results();
        execution.refresh_counts();
        self.cancelled.remove(execution_id);

        match outcome {
            Ok(()) => self.finish(&mut execution, ExecutionEvent::Complete).await,
            Err(ToolplanError::Cancelled { .. }) => {
                // Status was already written by `cancel_execution`
                if let Err(error) = execution.apply(ExecutionEvent::Cancel) {
                    warn!(execution_id = execution_id, error = %error, "Cancelled execution in unexpected state");
                }
            }
            Err(cause) => {
                let event = self.failure_event(&run, &execution, cause).await;
                self.finish(&mut execution, event).await;
            }
        }

        execution
    }

    async fn start_execution(&self, execution: &mut Execution) -> Result<()> {
        execution.apply(ExecutionEvent::Start)?;
        self.store
            .update_execution_status(&execution.execution_id, ExecutionState::Running, None)
            .await?;

        log_execution_operation(
            "start",
            &execution.execution_id,
            Some(&execution.plan_request_id),
            "RUNNING",
            Some(&format!("{} steps", execution.total_steps)),
        );
        self.publish(
            events::EXECUTION_STARTED,
            &execution.execution_id,
            json!({
                "planRequestId": execution.plan_request_id,
                "totalSteps": execution.total_steps,
            }),
        );
        Ok(())
    }

    /// The readiness loop; returns when every step has settled
    async fn drive(&self, run: &Run<'_>) -> Result<()> {
        let total_steps = run.steps.len();

        loop {
            if self.cancelled.contains(run.execution_id) {
                info!(execution_id = run.execution_id, "Execution cancelled, stopping scheduling");
                return Err(ToolplanError::Cancelled {
                    execution_id: run.execution_id.to_string(),
                });
            }

            let (ready, blocked, pending) = {
                let state = run.state.lock();
                debug_assert!(state.context.accounted_steps() <= total_steps);

                if run
                    .orchestrator
                    .is_execution_complete(total_steps, &state.context)
                {
                    return Ok(());
                }

                let ready = run
                    .orchestrator
                    .get_ready_steps(run.steps, &state.results, &state.context);
                let blocked = run
                    .orchestrator
                    .get_blocked_steps(run.steps, &state.results, &state.context);
                let pending: Vec<usize> = state
                    .results
                    .iter()
                    .filter(|result| result.status == StepState::Pending)
                    .map(|result| result.step_index)
                    .collect();
                (ready, blocked, pending)
            };

            if run.config.continue_on_error && !blocked.is_empty() {
                for blocked_step in blocked {
                    self.skip_step(
                        run,
                        blocked_step.step_index,
                        format!("dependency step {} failed", blocked_step.failed_dependency),
                    )
                    .await?;
                }
                continue;
            }

            if ready.is_empty() {
                let error = ToolplanError::StuckExecution {
                    pending: pending.len(),
                    detail: format!("steps {pending:?} are waiting on dependencies that cannot complete"),
                };
                log_error(
                    "execution_agent",
                    "drive",
                    &error.to_string(),
                    Some(run.execution_id),
                );
                return Err(error);
            }

            let sorted = run.orchestrator.sort_steps_by_priority(&ready, run.steps);
            self.publish(
                events::READY_STEPS_DISCOVERED,
                run.execution_id,
                json!({ "readySteps": sorted }),
            );

            if run.orchestrator.strategy().kind.uses_intelligent_batching() {
                let batches = {
                    let state = run.state.lock();
                    run.orchestrator
                        .get_intelligent_batches(&sorted, run.steps, &state.context)
                };
                for batch in batches {
                    self.run_group(run, &batch).await?;
                }
            } else {
                let parallel = run.orchestrator.get_parallel_steps(&sorted, run.steps);
                if !parallel.is_empty() {
                    self.run_group(run, &parallel).await?;
                }
                for step_index in run.orchestrator.get_sequential_steps(&sorted, run.steps) {
                    self.execute_step(run, step_index).await?;
                }
            }
        }
    }

    /// Run a group concurrently; the group settles fully before returning
    async fn run_group(&self, run: &Run<'_>, step_indices: &[usize]) -> Result<()> {
        debug!(
            execution_id = run.execution_id,
            group = ?step_indices,
            "Executing step group"
        );
        let outcomes = join_all(
            step_indices
                .iter()
                .map(|&step_index| self.execute_step(run, step_index)),
        )
        .await;

        for outcome in outcomes {
            outcome?;
        }
        Ok(())
    }

    /// Run one step to a terminal status. Returns an error only when the run
    /// must abort: a step failure without `continue_on_error`, or bookkeeping.
    async fn execute_step(&self, run: &Run<'_>, step_index: usize) -> Result<StepState> {
        let step = &run.steps[step_index];

        let started = {
            let mut state = run.state.lock();
            let RunState { context, results } = &mut *state;
            run.orchestrator.mark_step_running(context, step_index);
            results[step_index].apply(StepEvent::Start)?;
            results[step_index].clone()
        };
        self.store
            .update_step_result(run.execution_id, step_index, &started)
            .await?;
        log_step_operation("start", run.execution_id, step_index, &step.tool, "RUNNING", None);
        self.publish(
            events::STEP_STARTED,
            run.execution_id,
            json!({ "stepIndex": step_index, "tool": step.tool }),
        );

        let params = {
            let mut state = run.state.lock();
            let resolved = self.resolver.resolve_params(&step.params, &state.results);
            state.results[step_index].params = resolved.clone();
            resolved
        };

        let (outcome, retries) = match self.validator.validate(step_index, &params) {
            Err(error) => (Err(error), 0),
            Ok(()) => {
                let retry = self.call_tool(run, step_index, &step.tool, &params).await;
                let outcome = retry.result.map_err(|error| ToolplanError::ToolExecution {
                    step_index,
                    tool: step.tool.clone(),
                    retries: retry.retries,
                    message: error.to_string(),
                });
                (outcome, retry.retries)
            }
        };

        let (status, finished) = {
            let mut state = run.state.lock();
            let RunState { context, results } = &mut *state;
            let result = &mut results[step_index];
            result.retry_count = retries;
            let event = match &outcome {
                Ok(data) => StepEvent::Complete(data.clone()),
                Err(error) => StepEvent::Fail(step_failure_message(error)),
            };
            let status = result.apply(event)?;
            run.orchestrator
                .update_context_after_step(context, step_index, status);
            (status, result.clone())
        };
        self.persist_step(run, &finished).await?;

        match outcome {
            Ok(_) => {
                log_step_operation(
                    "complete",
                    run.execution_id,
                    step_index,
                    &step.tool,
                    "COMPLETED",
                    Some(&format!("retries={retries}")),
                );
                self.publish(
                    events::STEP_COMPLETED,
                    run.execution_id,
                    json!({ "stepIndex": step_index, "tool": step.tool, "retryCount": retries }),
                );
                Ok(status)
            }
            Err(error) => {
                log_step_operation(
                    "fail",
                    run.execution_id,
                    step_index,
                    &step.tool,
                    "FAILED",
                    Some(&error.to_string()),
                );
                self.publish(
                    events::STEP_FAILED,
                    run.execution_id,
                    json!({
                        "stepIndex": step_index,
                        "tool": step.tool,
                        "error": finished.error,
                        "code": error.code(),
                    }),
                );
                if run.config.continue_on_error {
                    Ok(status)
                } else {
                    Err(error)
                }
            }
        }
    }

    async fn call_tool(
        &self,
        run: &Run<'_>,
        step_index: usize,
        tool: &str,
        params: &Value,
    ) -> RetryOutcome<Value, ToolError> {
        let executor = &self.tool_executor;
        let publisher = &self.event_publisher;
        let execution_id = run.execution_id;

        run.retry_handler
            .execute(tool, move |attempt| {
                if attempt > 0 {
                    if let Err(error) = publisher.publish(
                        events::STEP_RETRY,
                        execution_id,
                        json!({ "stepIndex": step_index, "tool": tool, "attempt": attempt }),
                    ) {
                        warn!(error = %error, "Failed to publish retry event");
                    }
                }
                async move {
                    executor
                        .execute(tool, params)
                        .await
                        .and_then(|response| response.into_data(tool))
                }
            })
            .await
    }

    /// FAIL a pending step that can never run
    async fn skip_step(&self, run: &Run<'_>, step_index: usize, reason: String) -> Result<()> {
        let skipped = {
            let mut state = run.state.lock();
            let RunState { context, results } = &mut *state;
            let status = results[step_index].apply(StepEvent::Skip(reason.clone()))?;
            run.orchestrator
                .update_context_after_step(context, step_index, status);
            results[step_index].clone()
        };
        self.persist_step(run, &skipped).await?;

        log_step_operation(
            "skip",
            run.execution_id,
            step_index,
            &skipped.tool,
            "FAILED",
            Some(&reason),
        );
        self.publish(
            events::STEP_FAILED,
            run.execution_id,
            json!({ "stepIndex": step_index, "tool": skipped.tool, "error": reason }),
        );
        Ok(())
    }

    async fn persist_step(&self, run: &Run<'_>, result: &StepResult) -> Result<()> {
        self.store
            .update_step_result(run.execution_id, result.step_index, result)
            .await?;
        let (completed, failed) = run.progress();
        self.store
            .update_execution_progress(run.execution_id, completed, failed)
            .await?;
        Ok(())
    }

    /// Terminal event for an aborted run, rolling back when configured
    async fn failure_event(
        &self,
        run: &Run<'_>,
        execution: &Execution,
        cause: ToolplanError,
    ) -> ExecutionEvent {
        let rollback_applies = matches!(
            cause,
            ToolplanError::ToolExecution { .. }
                | ToolplanError::ParameterValidation { .. }
                | ToolplanError::StuckExecution { .. }
        );

        if !(rollback_applies && run.config.enable_rollback) {
            return ExecutionEvent::Fail(cause.to_string());
        }

        let plan = self
            .rollback_handler
            .generate_rollback_plan(&execution.results, cause.to_string());
        if plan.is_empty() {
            info!(
                execution_id = run.execution_id,
                "No completed steps support rollback"
            );
        }

        log_execution_operation(
            "rollback",
            run.execution_id,
            Some(&execution.plan_request_id),
            "ROLLING_BACK",
            Some(&format!("{} steps", plan.steps.len())),
        );
        let report = self.rollback_handler.execute_rollback(&plan).await;

        if report.success {
            ExecutionEvent::RollBack(format!(
                "{cause} (rolled back {} steps)",
                report.results.len()
            ))
        } else {
            let rollback_error = ToolplanError::Rollback {
                errors: report.errors,
            };
            ExecutionEvent::Fail(format!("{cause}; {rollback_error}"))
        }
    }

    /// Apply the terminal event and persist it
    async fn finish(&self, execution: &mut Execution, event: ExecutionEvent) {
        let event_name = match &event {
            ExecutionEvent::Complete => events::EXECUTION_COMPLETED,
            ExecutionEvent::RollBack(_) => events::EXECUTION_ROLLED_BACK,
            _ => events::EXECUTION_FAILED,
        };

        if let Err(error) = execution.apply(event) {
            warn!(
                execution_id = %execution.execution_id,
                error = %error,
                "Terminal transition rejected"
            );
        }

        let persisted = self
            .store
            .update_execution_status(
                &execution.execution_id,
                execution.status,
                execution.error.as_deref(),
            )
            .await;

        if let Err(error) = persisted {
            let error = ToolplanError::from(error);
            log_error(
                "execution_agent",
                "finish",
                &error.to_string(),
                Some(&execution.execution_id),
            );
            execution.status = ExecutionState::Failed;
            execution.error = Some(match execution.error.take() {
                Some(previous) => format!("{previous}; {error}"),
                None => error.to_string(),
            });
        }

        log_execution_operation(
            "finish",
            &execution.execution_id,
            Some(&execution.plan_request_id),
            &execution.status.to_string(),
            execution.error.as_deref(),
        );
        self.publish(
            event_name,
            &execution.execution_id,
            json!({
                "status": execution.status,
                "completedSteps": execution.completed_steps,
                "failedSteps": execution.failed_steps,
                "error": execution.error,
            }),
        );
    }
}

/// Message recorded on a failed step
fn step_failure_message(error: &ToolplanError) -> String {
    match error {
        ToolplanError::ToolExecution { message, .. } => message.clone(),
        other => other.to_string(),
    }
}
