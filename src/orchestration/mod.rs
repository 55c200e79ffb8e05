//! # Orchestration Engine
//!
//! The execution core: given a step graph with data dependencies, decide what
//! can run now, run it with bounded concurrency, resolve inter-step
//! references, retry transient failures and roll back partial side effects.
//!
//! ## Core Components
//!
//! - **ExecutionAgent**: drives an execution from plan lookup to a terminal status
//! - **ExecutionOrchestrator**: readiness, priority and batching over the step graph
//! - **ReferenceResolver**: `${step_N.result...}` substitution from prior results
//! - **ParameterValidator**: shape checks on resolved parameters
//! - **RetryHandler**: bounded exponential backoff around a tool call
//! - **RollbackHandler**: inverse operations for completed side effects
//! - **ComplexityAnalyzer**: strategy selection from the query and tool set

pub mod complexity_analyzer;
pub mod execution_agent;
pub mod execution_orchestrator;
pub mod parameter_validator;
pub mod reference_resolver;
pub mod retry_handler;
pub mod rollback_handler;
pub mod types;

pub use complexity_analyzer::ComplexityAnalyzer;
pub use execution_agent::ExecutionAgent;
pub use execution_orchestrator::{BlockedStep, ExecutionContext, ExecutionOrchestrator};
pub use parameter_validator::ParameterValidator;
pub use reference_resolver::{
    parse_reference, EntityKind, PathSegment, Reference, ReferenceResolver, ReferenceTarget,
    ResolutionError,
};
pub use retry_handler::{RetryHandler, RetryOutcome, RetryPolicy};
pub use rollback_handler::{
    get_inverse_operation, supports_rollback, RollbackHandler, RollbackPlan, RollbackReport,
    RollbackStats, RollbackStep, RollbackStepResult,
};
pub use types::{
    ExecutionStrategy, OpportunityKind, ParallelizationOpportunity, QueryComplexity, StrategyKind,
};
