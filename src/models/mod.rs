//! # Data Model
//!
//! Plans authored by the planning collaborator, the per-step run-time records
//! owned by one execution, and the persisted execution aggregate.

pub mod execution;
pub mod plan;
pub mod step_result;

pub use execution::Execution;
pub use plan::{Plan, PlanMetadata, Step};
pub use step_result::StepResult;
