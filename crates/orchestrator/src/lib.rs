//! Session loop, dispatcher, hooks, and checkpoints.

pub mod checkpoint;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod hooks;
pub mod resources;
pub mod session;
pub mod session_log;
pub mod worker;

pub use checkpoint::{Boundary, Checkpoint, CheckpointController};
pub use config::Config;
pub use dispatcher::{
    CriticalHook, CycleReport, DispatchSettings, Dispatcher, PendingDisposition, TaskOutcome,
};
pub use error::{OrchestratorError, Result};
pub use hooks::{
    builtin_registry, ActionOutcome, ActionRegistry, ActionResult, FireReport, HookAction,
    HookContext, HookEngine, HookPoint, HooksConfig,
};
pub use session::{BlockedTask, Orchestrator, PauseReason, PauseSummary, RunOutcome, StopHandle};
pub use session_log::SessionLog;
pub use worker::{CommandWorker, TaskContext, TaskResult, Worker, WorkerStatus};
