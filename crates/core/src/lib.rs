//! Domain model and pure scheduling logic for the conductor task orchestrator.
//!
//! Nothing in this crate performs I/O: the store, VCS, and dispatcher live in
//! their own crates and feed plain values through [`graph`].

pub mod domain;
pub mod error;
pub mod graph;
pub mod state_machine;

pub use domain::*;
pub use error::{CoreError, Result};
pub use graph::{edges_would_create_cycle, ready_tasks, would_create_cycle, DependencyGraph};
pub use state_machine::TaskStateMachine;
