//! The session loop: cycles until a checkpoint, a critical hook, a stop, or
//! an empty backlog.

use conductor_core::{Mode, Session, SessionEventKind, SessionStatus, TaskStatus};
use db::TaskStore;
use events::{Event, EventBus};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};
use uuid::Uuid;
use vcs::WorktreeManager;

use crate::checkpoint::{Boundary, CheckpointController};
use crate::dispatcher::{CriticalHook, DispatchSettings, Dispatcher, PendingDisposition, TaskOutcome};
use crate::error::{OrchestratorError, Result};
use crate::hooks::{HookContext, HookEngine, HookPoint};
use crate::resources::SessionGuard;
use crate::session_log::SessionLog;
use crate::worker::Worker;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PauseReason {
    /// The mode's checkpoint table paused at this boundary.
    Checkpoint { boundary: Boundary, id: String },
    /// A critical hook result. Forces a pause in every mode.
    HookCritical {
        point: String,
        action: String,
        message: String,
        task_id: Option<String>,
    },
    /// Nothing is ready but unfinished tasks remain.
    NeedsAttention,
}

impl From<CriticalHook> for PauseReason {
    fn from(hook: CriticalHook) -> Self {
        Self::HookCritical {
            point: hook.point,
            action: hook.action,
            message: hook.message,
            task_id: hook.task_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedTask {
    pub id: String,
    pub reason: Option<String>,
}

/// Stored as the session's pause reason and returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PauseSummary {
    pub reason: PauseReason,
    /// Tasks settled since the session last started or resumed.
    pub ran: Vec<TaskOutcome>,
    /// Ready task ids, in dispatch order.
    pub next: Vec<String>,
    pub blocked: Vec<BlockedTask>,
    pub pending_dispositions: Vec<PendingDisposition>,
    pub suggested_action: String,
}

fn suggest(reason: &PauseReason, pending: &[PendingDisposition]) -> String {
    let mut action = match reason {
        PauseReason::Checkpoint { boundary, id } => {
            format!("review {} {}, then run `conductor resume`", boundary.as_str(), id)
        }
        PauseReason::HookCritical {
            action,
            task_id: Some(task_id),
            ..
        } => format!(
            "fix what {} reported, `conductor unblock {}`, then `conductor resume`",
            action, task_id
        ),
        PauseReason::HookCritical { action, .. } => {
            format!("fix what {} reported, then `conductor resume`", action)
        }
        PauseReason::NeedsAttention => {
            "resolve blocked tasks with `conductor unblock <id>`, then `conductor resume`"
                .to_string()
        }
    };
    if !pending.is_empty() {
        action.push_str("; finish worktrees with `conductor worktree complete`");
    }
    action
}

/// Result of `start` or `resume`: the session either paused, stopped, or
/// completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub ran: Vec<TaskOutcome>,
    pub pause: Option<PauseSummary>,
    /// Finished worktrees still waiting for a disposition.
    pub pending_dispositions: Vec<PendingDisposition>,
}

/// Asks the running loop to stop after in-flight workers finish.
#[derive(Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    fn reset(&self) {
        self.tx.send_replace(false);
    }
}

/// Owns the collaborators of a session and runs it.
///
/// One orchestrator drives at most one session at a time per repository.
pub struct Orchestrator {
    store: TaskStore,
    worktrees: Arc<WorktreeManager>,
    hooks: Arc<HookEngine>,
    worker: Arc<dyn Worker>,
    bus: EventBus,
    settings: DispatchSettings,
    gate: Arc<Mutex<()>>,
    stop: StopHandle,
}

impl Orchestrator {
    pub fn new(
        store: TaskStore,
        worktrees: WorktreeManager,
        hooks: HookEngine,
        worker: Arc<dyn Worker>,
    ) -> Self {
        Self {
            store,
            worktrees: Arc::new(worktrees),
            hooks: Arc::new(hooks),
            worker,
            bus: EventBus::new(),
            settings: DispatchSettings::default(),
            gate: Arc::new(Mutex::new(())),
            stop: StopHandle::new(),
        }
    }

    pub fn with_settings(mut self, settings: DispatchSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.bus = bus;
        self
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn worktrees(&self) -> &WorktreeManager {
        &self.worktrees
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub async fn current_session(&self) -> Result<Option<Session>> {
        Ok(self.store.sessions().find_latest().await?)
    }

    fn log_for(&self, session_id: Uuid) -> SessionLog {
        SessionLog::new(session_id, self.store.events().clone(), self.bus.clone())
    }

    /// Start a new session in `mode` and run it until it pauses, stops, or
    /// completes.
    pub async fn start(&self, mode: Mode) -> Result<RunOutcome> {
        let previous = self.current_session().await?;
        let mut stale = None;
        if let Some(prev) = &previous {
            match prev.status {
                SessionStatus::Paused => return Err(OrchestratorError::SessionPaused),
                SessionStatus::Running => {
                    warn!(session_id = %prev.id, "Previous session was left running, marking it stopped");
                    self.store
                        .sessions()
                        .update_status(prev.id, SessionStatus::Stopped, None)
                        .await?;
                    stale = Some(prev.id);
                }
                SessionStatus::Stopped | SessionStatus::Completed => {}
            }
        }

        let session = self.store.sessions().create(&Session::new(mode)).await?;
        let log = self.log_for(session.id);
        self.stop.reset();

        let reset = self.store.reset_in_progress().await?;
        if stale.is_some() || !reset.is_empty() {
            let message = format!(
                "recovered from an interrupted session; {} task(s) returned to todo",
                reset.len()
            );
            warn!(session_id = %session.id, reset = reset.len(), "Recovered stale work");
            log.record(
                SessionEventKind::Error,
                json!({
                    "message": message,
                    "previous_session": stale,
                    "reset_tasks": reset,
                }),
            )
            .await;
            log.emit(Event::Error {
                message,
                context: Some("stale-session recovery".to_string()),
            });
        }

        log.record(SessionEventKind::Started, json!({ "mode": mode.as_str() }))
            .await;
        log.emit(Event::SessionStarted {
            session_id: session.id,
            mode: mode.as_str().to_string(),
        });
        info!(session_id = %session.id, mode = mode.as_str(), "Session started");

        let fired = self
            .hooks
            .fire(HookPoint::PreSession, &HookContext::session(mode))
            .await;
        log.record_firing(&fired, None).await;
        if let Some(critical) = CriticalHook::from_report(&fired, None) {
            return self
                .pause(&session, &log, critical.into(), Vec::new(), Vec::new())
                .await;
        }

        self.drive(session, log).await
    }

    /// Resume the paused session with its (possibly changed) mode.
    pub async fn resume(&self) -> Result<RunOutcome> {
        let session = self
            .current_session()
            .await?
            .filter(|s| s.status == SessionStatus::Paused)
            .ok_or(OrchestratorError::NoSession("resume"))?;

        let session = self
            .store
            .sessions()
            .update_status(session.id, SessionStatus::Running, None)
            .await?;
        let log = self.log_for(session.id);
        self.stop.reset();

        log.record(SessionEventKind::Resumed, json!({ "mode": session.mode.as_str() }))
            .await;
        log.emit(Event::SessionResumed {
            session_id: session.id,
        });
        info!(session_id = %session.id, mode = session.mode.as_str(), "Session resumed");

        self.drive(session, log).await
    }

    /// Stop the current session. A paused session is finished here; a
    /// running one is marked stopped and its loop exits before the next
    /// cycle.
    pub async fn stop(&self) -> Result<Session> {
        let session = self
            .current_session()
            .await?
            .filter(|s| matches!(s.status, SessionStatus::Running | SessionStatus::Paused))
            .ok_or(OrchestratorError::NoSession("stop"))?;

        self.stop.stop();
        match session.status {
            SessionStatus::Paused => {
                let log = self.log_for(session.id);
                self.finish_stopped(&session, &log).await
            }
            _ => {
                info!(session_id = %session.id, "Stop requested for running session");
                let sessions = self.store.sessions();
                match sessions
                    .transition(session.id, SessionStatus::Running, SessionStatus::Stopped, None)
                    .await?
                {
                    Some(stopped) => Ok(stopped),
                    // The loop paused between our read and the update.
                    None => match sessions.get(session.id).await? {
                        paused if paused.status == SessionStatus::Paused => {
                            self.finish_stopped(&paused, &self.log_for(paused.id)).await
                        }
                        other => Ok(other),
                    },
                }
            }
        }
    }

    /// Change the mode of a paused session. Takes effect on resume.
    pub async fn set_mode(&self, mode: Mode) -> Result<Session> {
        let session = self
            .current_session()
            .await?
            .ok_or(OrchestratorError::NoSession("change the mode of"))?;

        match session.status {
            SessionStatus::Running => Err(OrchestratorError::SessionRunning),
            SessionStatus::Paused => {
                let updated = self.store.sessions().update_mode(session.id, mode).await?;
                self.log_for(session.id)
                    .record(
                        SessionEventKind::ModeChanged,
                        json!({ "from": session.mode.as_str(), "to": mode.as_str() }),
                    )
                    .await;
                info!(session_id = %session.id, from = session.mode.as_str(), to = mode.as_str(), "Mode changed");
                Ok(updated)
            }
            SessionStatus::Stopped | SessionStatus::Completed => {
                Err(OrchestratorError::NoSession("change the mode of"))
            }
        }
    }

    async fn stop_requested(&self, session_id: Uuid) -> Result<bool> {
        if self.stop.is_stopped() {
            return Ok(true);
        }
        let session = self.store.sessions().get(session_id).await?;
        Ok(session.status == SessionStatus::Stopped)
    }

    async fn drive(&self, session: Session, log: SessionLog) -> Result<RunOutcome> {
        let mut guard = SessionGuard::new(session.id, self.bus.clone());
        let controller = CheckpointController::new(session.mode);
        let dispatcher = Dispatcher::new(
            self.store.clone(),
            Arc::clone(&self.worktrees),
            Arc::clone(&self.hooks),
            Arc::clone(&self.worker),
            log.clone(),
            session.mode,
            self.settings.clone(),
            Arc::clone(&self.gate),
        );

        let mut ran: Vec<TaskOutcome> = Vec::new();
        let mut pending: Vec<PendingDisposition> = Vec::new();

        let outcome = loop {
            if self.stop_requested(session.id).await? {
                break self.stopped(&session, &log, ran, pending).await?;
            }

            let report = dispatcher.run_cycle(self.settings.max_parallel).await?;
            let reached: Vec<(Boundary, String)> = report
                .outcomes
                .iter()
                .flat_map(TaskOutcome::boundaries)
                .collect();
            let idle = report.is_idle();
            ran.extend(report.outcomes);
            pending.extend(report.pending_dispositions);

            // In-flight workers were allowed to finish; nothing after them runs.
            if self.stop_requested(session.id).await? {
                break self.stopped(&session, &log, ran, pending).await?;
            }

            if let Some(critical) = report.critical.into_iter().next() {
                break self
                    .pause(&session, &log, critical.into(), ran, pending)
                    .await?;
            }

            if let Some(boundary) = controller.first_pause(reached.iter().map(|(b, _)| *b)) {
                let id = reached
                    .iter()
                    .rev()
                    .find(|(b, _)| *b == boundary)
                    .map(|(_, id)| id.clone())
                    .unwrap_or_default();
                break self
                    .pause(
                        &session,
                        &log,
                        PauseReason::Checkpoint { boundary, id },
                        ran,
                        pending,
                    )
                    .await?;
            }

            if idle {
                break self.finish_idle(&session, &log, ran, pending).await?;
            }
        };

        guard.settle();
        Ok(outcome)
    }

    /// Nothing was ready: either pause for a human or complete.
    async fn finish_idle(
        &self,
        session: &Session,
        log: &SessionLog,
        ran: Vec<TaskOutcome>,
        pending: Vec<PendingDisposition>,
    ) -> Result<RunOutcome> {
        let snapshot = self.store.snapshot().await?;
        let unfinished = snapshot
            .tasks
            .iter()
            .any(|t| !t.archived && t.status != TaskStatus::Done);
        if unfinished {
            return self
                .pause(session, log, PauseReason::NeedsAttention, ran, pending)
                .await;
        }

        let fired = self
            .hooks
            .fire(HookPoint::PostSession, &HookContext::session(session.mode))
            .await;
        log.record_firing(&fired, None).await;
        if let Some(critical) = CriticalHook::from_report(&fired, None) {
            return self
                .pause(session, log, critical.into(), ran, pending)
                .await;
        }

        let Some(completed) = self
            .store
            .sessions()
            .transition(session.id, SessionStatus::Running, SessionStatus::Completed, None)
            .await?
        else {
            return self.stopped(session, log, ran, pending).await;
        };
        log.record(
            SessionEventKind::Stopped,
            json!({ "status": "completed", "ran": ran.len() }),
        )
        .await;
        log.emit(Event::SessionFinished {
            session_id: session.id,
            status: SessionStatus::Completed.as_str().to_string(),
        });
        info!(session_id = %session.id, ran = ran.len(), "Session completed");

        Ok(RunOutcome {
            session_id: completed.id,
            status: completed.status,
            ran,
            pause: None,
            pending_dispositions: pending,
        })
    }

    async fn stopped(
        &self,
        session: &Session,
        log: &SessionLog,
        ran: Vec<TaskOutcome>,
        pending: Vec<PendingDisposition>,
    ) -> Result<RunOutcome> {
        let stopped = self.finish_stopped(session, log).await?;
        Ok(RunOutcome {
            session_id: stopped.id,
            status: stopped.status,
            ran,
            pause: None,
            pending_dispositions: pending,
        })
    }

    async fn finish_stopped(&self, session: &Session, log: &SessionLog) -> Result<Session> {
        let stopped = self
            .store
            .sessions()
            .update_status(session.id, SessionStatus::Stopped, None)
            .await?;
        log.record(SessionEventKind::Stopped, json!({ "status": "stopped" }))
            .await;

        let fired = self
            .hooks
            .fire(HookPoint::PostSession, &HookContext::session(session.mode))
            .await;
        log.record_firing(&fired, None).await;

        log.emit(Event::SessionFinished {
            session_id: session.id,
            status: SessionStatus::Stopped.as_str().to_string(),
        });
        info!(session_id = %session.id, "Session stopped");
        Ok(stopped)
    }

    async fn pause(
        &self,
        session: &Session,
        log: &SessionLog,
        reason: PauseReason,
        ran: Vec<TaskOutcome>,
        pending: Vec<PendingDisposition>,
    ) -> Result<RunOutcome> {
        let snapshot = self.store.snapshot().await?;
        let next = snapshot.ready().iter().map(|t| t.id.clone()).collect();
        let blocked = snapshot
            .tasks
            .iter()
            .filter(|t| !t.archived && t.status == TaskStatus::Blocked)
            .map(|t| BlockedTask {
                id: t.id.clone(),
                reason: t.blocked_reason.clone(),
            })
            .collect();

        let summary = PauseSummary {
            suggested_action: suggest(&reason, &pending),
            reason,
            ran: ran.clone(),
            next,
            blocked,
            pending_dispositions: pending.clone(),
        };
        let payload = serde_json::to_value(&summary)?;

        let moved = self
            .store
            .sessions()
            .transition(
                session.id,
                SessionStatus::Running,
                SessionStatus::Paused,
                Some(&payload),
            )
            .await?;
        if moved.is_none() {
            return self.stopped(session, log, ran, pending).await;
        }
        log.record(SessionEventKind::CheckpointPaused, payload.clone())
            .await;
        log.emit(Event::SessionPaused {
            session_id: session.id,
            reason: payload,
        });
        info!(
            session_id = %session.id,
            suggested_action = %summary.suggested_action,
            "Session paused"
        );

        Ok(RunOutcome {
            session_id: session.id,
            status: SessionStatus::Paused,
            ran,
            pause: Some(summary),
            pending_dispositions: pending,
        })
    }
}
