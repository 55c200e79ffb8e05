//! # Execution Orchestrator
//!
//! Readiness and partitioning for one execution run. Readiness is a pure
//! function of the dependency graph and the completion sets held by
//! [`ExecutionContext`]: a step is ready when it is PENDING, not already
//! running, and every dependency has completed. A step that leaves PENDING is
//! never considered again, so each step runs at most once per execution.
//!
//! The context's sets are private to this module. The only writers are
//! [`ExecutionOrchestrator::mark_step_running`] and
//! [`ExecutionOrchestrator::update_context_after_step`].

use super::complexity_analyzer::ComplexityAnalyzer;
use super::types::{ExecutionStrategy, QueryComplexity};
use crate::config::ExecutionConfig;
use crate::models::{Step, StepResult};
use crate::state_machine::StepState;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Per-run scheduling state. Created at execution start, dropped at the end.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    execution_id: String,
    config: ExecutionConfig,
    strategy: ExecutionStrategy,
    running_steps: BTreeSet<usize>,
    completed_steps: BTreeSet<usize>,
    failed_steps: BTreeSet<usize>,
}

impl ExecutionContext {
    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    pub fn strategy(&self) -> &ExecutionStrategy {
        &self.strategy
    }

    pub fn running_steps(&self) -> &BTreeSet<usize> {
        &self.running_steps
    }

    pub fn completed_steps(&self) -> &BTreeSet<usize> {
        &self.completed_steps
    }

    pub fn failed_steps(&self) -> &BTreeSet<usize> {
        &self.failed_steps
    }

    /// Steps that have left PENDING
    pub fn accounted_steps(&self) -> usize {
        self.running_steps.len() + self.completed_steps.len() + self.failed_steps.len()
    }
}

/// A pending step that can never run because a dependency failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockedStep {
    pub step_index: usize,
    pub failed_dependency: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionOrchestrator {
    analyzer: ComplexityAnalyzer,
    strategy: ExecutionStrategy,
}

impl ExecutionOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the complexity analyzer and keep its strategy for the rest of the run
    pub fn analyze_and_set_strategy(
        &mut self,
        query: &str,
        selected_tools: &[String],
    ) -> QueryComplexity {
        let complexity = self.analyzer.analyze(query, selected_tools);
        self.strategy = complexity.strategy.clone();

        info!(
            strategy = %self.strategy.kind,
            max_parallel = self.strategy.max_parallel,
            score = complexity.score,
            "Execution strategy selected"
        );
        for risk in &complexity.risk_factors {
            warn!(risk = %risk, "Plan risk factor");
        }

        complexity
    }

    pub fn strategy(&self) -> &ExecutionStrategy {
        &self.strategy
    }

    pub fn create_context(
        &self,
        execution_id: impl Into<String>,
        config: ExecutionConfig,
    ) -> ExecutionContext {
        ExecutionContext {
            execution_id: execution_id.into(),
            config,
            strategy: self.strategy.clone(),
            running_steps: BTreeSet::new(),
            completed_steps: BTreeSet::new(),
            failed_steps: BTreeSet::new(),
        }
    }

    pub fn is_execution_complete(&self, total_steps: usize, context: &ExecutionContext) -> bool {
        context.completed_steps.len() + context.failed_steps.len() == total_steps
    }

    pub fn get_ready_steps(
        &self,
        steps: &[Step],
        step_results: &[StepResult],
        context: &ExecutionContext,
    ) -> Vec<usize> {
        let ready: Vec<usize> = steps
            .iter()
            .enumerate()
            .filter(|(index, step)| {
                let pending = step_results
                    .get(*index)
                    .is_some_and(|result| result.status == StepState::Pending);
                pending
                    && !context.running_steps.contains(index)
                    && step
                        .depends_on
                        .iter()
                        .all(|dependency| context.completed_steps.contains(dependency))
            })
            .map(|(index, _)| index)
            .collect();

        debug!(
            execution_id = %context.execution_id,
            ready_steps = ?ready,
            "Computed ready steps"
        );
        ready
    }

    /// Pending steps with at least one FAILED dependency
    pub fn get_blocked_steps(
        &self,
        steps: &[Step],
        step_results: &[StepResult],
        context: &ExecutionContext,
    ) -> Vec<BlockedStep> {
        steps
            .iter()
            .enumerate()
            .filter(|(index, _)| {
                step_results
                    .get(*index)
                    .is_some_and(|result| result.status == StepState::Pending)
            })
            .filter_map(|(index, step)| {
                step.depends_on
                    .iter()
                    .find(|dependency| context.failed_steps.contains(dependency))
                    .map(|&failed_dependency| BlockedStep {
                        step_index: index,
                        failed_dependency,
                    })
            })
            .collect()
    }

    /// Parallel-flagged steps first, plan order as the tie-break
    pub fn sort_steps_by_priority(&self, ready_steps: &[usize], steps: &[Step]) -> Vec<usize> {
        let mut sorted = ready_steps.to_vec();
        sorted.sort_by_key(|&index| {
            let parallel = steps.get(index).is_some_and(|step| step.parallel);
            (!parallel, index)
        });
        sorted
    }

    pub fn get_parallel_steps(&self, sorted_steps: &[usize], steps: &[Step]) -> Vec<usize> {
        sorted_steps
            .iter()
            .copied()
            .filter(|&index| steps.get(index).is_some_and(|step| step.parallel))
            .collect()
    }

    pub fn get_sequential_steps(&self, sorted_steps: &[usize], steps: &[Step]) -> Vec<usize> {
        sorted_steps
            .iter()
            .copied()
            .filter(|&index| steps.get(index).is_some_and(|step| !step.parallel))
            .collect()
    }

    /// Parallel-flagged steps chunked to the configured limit, followed by one
    /// singleton batch per sequential step. Each batch is a concurrent unit
    /// and batches run one after another.
    pub fn get_intelligent_batches(
        &self,
        sorted_steps: &[usize],
        steps: &[Step],
        context: &ExecutionContext,
    ) -> Vec<Vec<usize>> {
        let limit = context.config.parallel_execution_limit.max(1);

        let mut batches: Vec<Vec<usize>> = self
            .get_parallel_steps(sorted_steps, steps)
            .chunks(limit)
            .map(<[usize]>::to_vec)
            .collect();
        batches.extend(
            self.get_sequential_steps(sorted_steps, steps)
                .into_iter()
                .map(|index| vec![index]),
        );

        debug!(
            execution_id = %context.execution_id,
            batch_count = batches.len(),
            limit = limit,
            "Built intelligent batches"
        );
        batches
    }

    pub fn mark_step_running(&self, context: &mut ExecutionContext, step_index: usize) {
        context.running_steps.insert(step_index);
    }

    /// Move a step out of the running set into the set matching its terminal status
    pub fn update_context_after_step(
        &self,
        context: &mut ExecutionContext,
        step_index: usize,
        status: StepState,
    ) {
        context.running_steps.remove(&step_index);
        match status {
            StepState::Completed => {
                context.completed_steps.insert(step_index);
            }
            StepState::Failed => {
                context.failed_steps.insert(step_index);
            }
            StepState::Pending | StepState::Running => {
                warn!(
                    execution_id = %context.execution_id,
                    step_index = step_index,
                    status = %status,
                    "Ignoring non-terminal status in context update"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::types::StrategyKind;
    use crate::state_machine::StepEvent;
    use serde_json::json;

    fn plan() -> Vec<Step> {
        vec![
            Step::new("facilities_list", json!({})).parallel(true),
            Step::new("shipments_list", json!({})).parallel(true),
            Step::new("facility_get", json!({})).depends_on([0]),
            Step::new("shipment_get", json!({})).depends_on([1, 2]),
        ]
    }

    fn pending(steps: &[Step]) -> Vec<StepResult> {
        steps
            .iter()
            .enumerate()
            .map(|(i, s)| StepResult::pending(i, s))
            .collect()
    }

    fn finish(
        orchestrator: &ExecutionOrchestrator,
        context: &mut ExecutionContext,
        results: &mut [StepResult],
        index: usize,
        ok: bool,
    ) {
        orchestrator.mark_step_running(context, index);
        results[index].apply(StepEvent::Start).unwrap();
        let status = if ok {
            results[index].apply(StepEvent::Complete(json!({}))).unwrap()
        } else {
            results[index].apply(StepEvent::Fail("boom".into())).unwrap()
        };
        orchestrator.update_context_after_step(context, index, status);
    }

    #[test]
    fn test_ready_steps_follow_dependencies() {
        let orchestrator = ExecutionOrchestrator::new();
        let steps = plan();
        let mut results = pending(&steps);
        let mut context = orchestrator.create_context("exec-1", ExecutionConfig::default());

        assert_eq!(
            orchestrator.get_ready_steps(&steps, &results, &context),
            vec![0, 1]
        );

        finish(&orchestrator, &mut context, &mut results, 0, true);
        assert_eq!(
            orchestrator.get_ready_steps(&steps, &results, &context),
            vec![1, 2]
        );

        finish(&orchestrator, &mut context, &mut results, 1, true);
        finish(&orchestrator, &mut context, &mut results, 2, true);
        assert_eq!(
            orchestrator.get_ready_steps(&steps, &results, &context),
            vec![3]
        );

        finish(&orchestrator, &mut context, &mut results, 3, true);
        assert!(orchestrator.is_execution_complete(steps.len(), &context));
        assert!(orchestrator
            .get_ready_steps(&steps, &results, &context)
            .is_empty());
    }

    #[test]
    fn test_running_steps_are_not_ready() {
        let orchestrator = ExecutionOrchestrator::new();
        let steps = plan();
        let results = pending(&steps);
        let mut context = orchestrator.create_context("exec-1", ExecutionConfig::default());

        orchestrator.mark_step_running(&mut context, 0);
        assert_eq!(
            orchestrator.get_ready_steps(&steps, &results, &context),
            vec![1]
        );
        assert_eq!(context.accounted_steps(), 1);
    }

    #[test]
    fn test_failed_dependency_blocks_step() {
        let orchestrator = ExecutionOrchestrator::new();
        let steps = plan();
        let mut results = pending(&steps);
        let mut context = orchestrator.create_context("exec-1", ExecutionConfig::default());

        finish(&orchestrator, &mut context, &mut results, 0, false);
        finish(&orchestrator, &mut context, &mut results, 1, true);

        assert!(orchestrator
            .get_ready_steps(&steps, &results, &context)
            .is_empty());
        let blocked = orchestrator.get_blocked_steps(&steps, &results, &context);
        assert_eq!(
            blocked,
            vec![BlockedStep {
                step_index: 2,
                failed_dependency: 0
            }]
        );
        assert!(!orchestrator.is_execution_complete(steps.len(), &context));
    }

    #[test]
    fn test_priority_puts_parallel_steps_first() {
        let orchestrator = ExecutionOrchestrator::new();
        let steps = vec![
            Step::new("a_get", json!({})),
            Step::new("b_list", json!({})).parallel(true),
            Step::new("c_get", json!({})),
            Step::new("d_list", json!({})).parallel(true),
        ];
        let sorted = orchestrator.sort_steps_by_priority(&[0, 1, 2, 3], &steps);
        assert_eq!(sorted, vec![1, 3, 0, 2]);
        assert_eq!(orchestrator.get_parallel_steps(&sorted, &steps), vec![1, 3]);
        assert_eq!(orchestrator.get_sequential_steps(&sorted, &steps), vec![0, 2]);
    }

    #[test]
    fn test_intelligent_batches_respect_limit() {
        let orchestrator = ExecutionOrchestrator::new();
        let steps: Vec<Step> = (0..5)
            .map(|i| Step::new(format!("e{i}_list"), json!({})).parallel(i < 4))
            .collect();
        let config = ExecutionConfig {
            parallel_execution_limit: 3,
            ..ExecutionConfig::default()
        };
        let context = orchestrator.create_context("exec-1", config);

        let sorted = orchestrator.sort_steps_by_priority(&[0, 1, 2, 3, 4], &steps);
        let batches = orchestrator.get_intelligent_batches(&sorted, &steps, &context);
        assert_eq!(batches, vec![vec![0, 1, 2], vec![3], vec![4]]);
    }

    #[test]
    fn test_strategy_is_cached_on_the_orchestrator() {
        let mut orchestrator = ExecutionOrchestrator::new();
        assert_eq!(orchestrator.strategy().kind, StrategyKind::Simple);

        let complexity = orchestrator.analyze_and_set_strategy(
            "list shipments",
            &["shipments_list".to_string()],
        );
        assert_eq!(orchestrator.strategy(), &complexity.strategy);

        let context = orchestrator.create_context("exec-1", ExecutionConfig::default());
        assert_eq!(context.strategy(), &complexity.strategy);
    }
}
