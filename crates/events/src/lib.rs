//! Live event fan-out for the orchestrator.
//!
//! The session log in the database is the durable record; this bus only
//! serves subscribers that are attached while a session runs.

mod bus;
mod types;

pub use bus::EventBus;
pub use types::*;
