//! # State Machines
//!
//! Step and execution lifecycle states with their legal transitions. The
//! transition functions are pure: callers own the state value and persist the
//! outcome themselves.

pub mod errors;
pub mod events;
pub mod states;
pub mod transitions;

pub use errors::{StateMachineError, StateMachineResult};
pub use events::{ExecutionEvent, StepEvent};
pub use states::{ExecutionState, StepState};
