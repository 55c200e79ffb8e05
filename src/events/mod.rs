//! # Execution Events
//!
//! Broadcast lifecycle events for observers (progress UIs, statistics
//! collectors). Publishing never blocks and never fails the execution when
//! nobody is listening.

pub mod publisher;

pub use publisher::{EventPublisher, PublishError, PublishedEvent};
