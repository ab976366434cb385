//! Actions that ship with the orchestrator. Projects can shadow any of them
//! by registering their own action under the same name.

use async_trait::async_trait;
use conductor_core::{DependencyGraph, TaskStatus, TaskType};
use db::TaskStore;
use std::sync::Arc;
use tracing::info;
use vcs::VersionControl;

use super::{ActionOutcome, ActionRegistry, HookAction, HookContext};

/// Warns when the main checkout has uncommitted changes.
pub struct VerifyClean {
    vcs: Arc<dyn VersionControl>,
}

impl VerifyClean {
    pub fn new(vcs: Arc<dyn VersionControl>) -> Self {
        Self { vcs }
    }
}

#[async_trait]
impl HookAction for VerifyClean {
    fn name(&self) -> &str {
        "verify-clean"
    }

    async fn run(&self, _ctx: &HookContext) -> ActionOutcome {
        match self.vcs.has_uncommitted_changes(self.vcs.repo_path()).await {
            Ok(false) => ActionOutcome::Ok,
            Ok(true) => ActionOutcome::Warning("main checkout has uncommitted changes".to_string()),
            Err(e) => ActionOutcome::Warning(format!("could not inspect checkout: {}", e)),
        }
    }
}

/// Critical when the task about to start still has unfinished blockers.
pub struct CheckBlockers {
    store: TaskStore,
}

impl CheckBlockers {
    pub fn new(store: TaskStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl HookAction for CheckBlockers {
    fn name(&self) -> &str {
        "check-blockers"
    }

    async fn run(&self, ctx: &HookContext) -> ActionOutcome {
        let Some(task_id) = ctx.task_id.as_deref() else {
            return ActionOutcome::Ok;
        };
        let snapshot = match self.store.snapshot().await {
            Ok(s) => s,
            Err(e) => return ActionOutcome::Warning(format!("could not read tasks: {}", e)),
        };

        let graph = DependencyGraph::new(&snapshot.tasks);
        match graph.get(task_id) {
            Some(task) => {
                let pending = graph.pending_blockers(task);
                if pending.is_empty() {
                    ActionOutcome::Ok
                } else {
                    ActionOutcome::Critical(format!("unfinished blockers: {}", pending.join(", ")))
                }
            }
            None => ActionOutcome::Warning(format!("task {} not found", task_id)),
        }
    }
}

/// Reminds the operator to write down what a finished spike learned.
pub struct DetectSpike;

#[async_trait]
impl HookAction for DetectSpike {
    fn name(&self) -> &str {
        "detect-spike"
    }

    async fn run(&self, ctx: &HookContext) -> ActionOutcome {
        if ctx.task_type.as_deref() == Some(TaskType::Spike.as_str()) {
            ActionOutcome::Warning(format!(
                "spike {} finished; record its findings before building on it",
                ctx.task_id.as_deref().unwrap_or("?")
            ))
        } else {
            ActionOutcome::Ok
        }
    }
}

/// Logs task counts at the end of a session.
pub struct SessionSummary {
    store: TaskStore,
}

impl SessionSummary {
    pub fn new(store: TaskStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl HookAction for SessionSummary {
    fn name(&self) -> &str {
        "session-summary"
    }

    async fn run(&self, ctx: &HookContext) -> ActionOutcome {
        match self.store.snapshot().await {
            Ok(snapshot) => {
                info!(
                    mode = ctx.session_mode.map(|m| m.as_str()).unwrap_or("-"),
                    done = snapshot.count_by_status(TaskStatus::Done),
                    todo = snapshot.count_by_status(TaskStatus::Todo),
                    blocked = snapshot.count_by_status(TaskStatus::Blocked),
                    "Session summary"
                );
                ActionOutcome::Ok
            }
            Err(e) => ActionOutcome::Warning(format!("could not read tasks: {}", e)),
        }
    }
}

/// Registry preloaded with the built-in actions.
pub fn builtin_registry(store: TaskStore, vcs: Arc<dyn VersionControl>) -> ActionRegistry {
    ActionRegistry::new()
        .with(Arc::new(VerifyClean::new(vcs)))
        .with(Arc::new(CheckBlockers::new(store.clone())))
        .with(Arc::new(DetectSpike))
        .with(Arc::new(SessionSummary::new(store)))
}
