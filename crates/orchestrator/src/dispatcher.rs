//! One scheduling cycle: pick ready tasks, place them, run them, settle them.

use conductor_core::{
    Disposition, IsolationOverride, Mode, SessionEventKind, Story, Task, TaskStatus, Worktree,
};
use db::TaskStore;
use events::Event;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use vcs::{WorktreeLease, WorktreeManager};

use crate::checkpoint::{self, Boundary};
use crate::config::Config;
use crate::error::{OrchestratorError, Result};
use crate::hooks::{FireReport, HookContext, HookEngine, HookPoint};
use crate::session_log::SessionLog;
use crate::worker::{TaskContext, TaskResult, Worker};

/// Rebase-and-retry rounds after a conflicting commit.
pub const COMMIT_RETRIES: u32 = 3;

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub max_parallel: usize,
    pub task_timeout: Option<Duration>,
    pub isolation: Option<IsolationOverride>,
    pub auto_disposition: Option<Disposition>,
    pub commit_retries: u32,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            max_parallel: 1,
            task_timeout: None,
            isolation: None,
            auto_disposition: None,
            commit_retries: COMMIT_RETRIES,
        }
    }
}

impl DispatchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_parallel: Config::effective_parallelism(config.session.max_parallel),
            task_timeout: config.session.task_timeout(),
            isolation: config.worktree.isolation,
            auto_disposition: config.worktree.auto_disposition,
            commit_retries: COMMIT_RETRIES,
        }
    }
}

/// How one selected task ended this cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub task_id: String,
    pub title: String,
    /// `done` or `blocked`.
    pub status: TaskStatus,
    /// Present when the worker ran to completion.
    pub result: Option<TaskResult>,
    pub reason: Option<String>,
    pub commit: Option<String>,
    pub story_completed: Option<String>,
    pub epic_completed: Option<String>,
}

impl TaskOutcome {
    fn blocked(task: &Task, reason: &str, result: Option<TaskResult>) -> Self {
        Self {
            task_id: task.id.clone(),
            title: task.title.clone(),
            status: TaskStatus::Blocked,
            result,
            reason: Some(reason.to_string()),
            commit: None,
            story_completed: None,
            epic_completed: None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.status == TaskStatus::Done
    }

    /// Boundaries this outcome reached, task first.
    pub fn boundaries(&self) -> Vec<(Boundary, String)> {
        if !self.is_done() {
            return Vec::new();
        }
        let mut reached = vec![(Boundary::Task, self.task_id.clone())];
        if let Some(story) = &self.story_completed {
            reached.push((Boundary::Story, story.clone()));
        }
        if let Some(epic) = &self.epic_completed {
            reached.push((Boundary::Epic, epic.clone()));
        }
        reached
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticalHook {
    pub point: String,
    pub action: String,
    pub message: String,
    pub task_id: Option<String>,
}

impl CriticalHook {
    pub fn from_report(fired: &FireReport, task_id: Option<&str>) -> Option<Self> {
        let critical = fired.critical()?;
        Some(Self {
            point: fired.point.clone(),
            action: critical.action.clone(),
            message: critical.outcome.message().unwrap_or_default().to_string(),
            task_id: task_id.map(str::to_string),
        })
    }
}

/// A finished worktree waiting for a human to pick merge, PR, keep, or
/// discard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDisposition {
    pub worktree: String,
    pub owner_id: String,
    pub branch: String,
    /// Why an automatic disposition did not apply, if one was configured.
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Tasks started this cycle, in dispatch order.
    pub selected: Vec<String>,
    pub outcomes: Vec<TaskOutcome>,
    pub critical: Vec<CriticalHook>,
    pub pending_dispositions: Vec<PendingDisposition>,
}

impl CycleReport {
    /// Nothing was ready.
    pub fn is_idle(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn outcome(&self, task_id: &str) -> Option<&TaskOutcome> {
        self.outcomes.iter().find(|o| o.task_id == task_id)
    }
}

/// A task whose worker has been launched.
struct Launched {
    task: Task,
    epic_id: Option<String>,
    worktree: Worktree,
    lease: WorktreeLease,
}

enum WorkerRun {
    Finished(Result<TaskResult>),
    TimedOut(Duration),
}

/// Runs cycles for one session.
///
/// Store mutation, hook firing, and log appends happen under `gate`;
/// only worker execution runs concurrently.
#[derive(Clone)]
pub struct Dispatcher {
    store: TaskStore,
    worktrees: Arc<WorktreeManager>,
    hooks: Arc<HookEngine>,
    worker: Arc<dyn Worker>,
    log: SessionLog,
    mode: Mode,
    settings: DispatchSettings,
    gate: Arc<Mutex<()>>,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: TaskStore,
        worktrees: Arc<WorktreeManager>,
        hooks: Arc<HookEngine>,
        worker: Arc<dyn Worker>,
        log: SessionLog,
        mode: Mode,
        settings: DispatchSettings,
        gate: Arc<Mutex<()>>,
    ) -> Self {
        Self {
            store,
            worktrees,
            hooks,
            worker,
            log,
            mode,
            settings,
            gate,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Run one cycle with at most `max_parallel` concurrent workers.
    pub async fn run_cycle(&self, max_parallel: usize) -> Result<CycleReport> {
        let max_parallel = Config::effective_parallelism(max_parallel);
        let mut report = CycleReport::default();

        let launched = {
            let _gate = self.gate.lock().await;
            self.launch(max_parallel, &mut report).await?
        };

        if !report.selected.is_empty() {
            self.log.emit(Event::CycleStarted {
                session_id: self.log.session_id(),
                task_ids: report.selected.clone(),
            });
        }

        let mut running: HashSet<String> = HashSet::new();
        let mut workers = JoinSet::new();
        for (ctx, launch) in launched {
            running.insert(ctx.task.id.clone());
            let worker = Arc::clone(&self.worker);
            let timeout = self.settings.task_timeout;
            workers.spawn(async move {
                let run = match timeout {
                    Some(limit) => match tokio::time::timeout(limit, worker.execute(&ctx)).await {
                        Ok(result) => WorkerRun::Finished(result),
                        Err(_) => WorkerRun::TimedOut(limit),
                    },
                    None => WorkerRun::Finished(worker.execute(&ctx).await),
                };
                (launch, run)
            });
        }

        while let Some(joined) = workers.join_next().await {
            let (launch, run) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "Worker task aborted");
                    continue;
                }
            };
            running.remove(&launch.task.id);

            let _gate = self.gate.lock().await;
            self.settle(launch, run, &mut report).await;
        }

        // A worker that panicked never reported back.
        for task_id in running {
            let _gate = self.gate.lock().await;
            match self.store.task(&task_id).await {
                Ok(task) => {
                    self.block(&task, None, None, "worker crashed", None, &mut report)
                        .await
                }
                Err(e) => error!(task_id = %task_id, error = %e, "Lost track of crashed task"),
            }
        }

        info!(
            selected = report.selected.len(),
            done = report.outcomes.iter().filter(|o| o.is_done()).count(),
            critical = report.critical.len(),
            "Cycle finished"
        );
        Ok(report)
    }

    /// Select, start, place, and gate the cycle's tasks.
    async fn launch(
        &self,
        max_parallel: usize,
        report: &mut CycleReport,
    ) -> Result<Vec<(TaskContext, Launched)>> {
        let snapshot = self.store.snapshot().await?;
        let ready: Vec<Task> = snapshot
            .ready()
            .into_iter()
            .take(max_parallel)
            .cloned()
            .collect();
        debug!(ready = ready.len(), max_parallel, "Selected ready tasks");

        let mut launched = Vec::with_capacity(ready.len());
        for candidate in ready {
            let task = match self.store.start_task(&candidate.id).await {
                Ok(task) => task,
                Err(e) => {
                    warn!(task_id = %candidate.id, error = %e, "Could not start task, skipping");
                    continue;
                }
            };
            report.selected.push(task.id.clone());
            self.log.emit(Event::TaskStatusChanged {
                task_id: task.id.clone(),
                from_status: candidate.status.as_str().to_string(),
                to_status: task.status.as_str().to_string(),
            });

            let story: Option<Story> = task
                .story_id
                .as_deref()
                .and_then(|sid| snapshot.story(sid))
                .cloned();
            let epic_id = snapshot.epic_of(&task).map(str::to_string);

            let worktree = match self
                .worktrees
                .prepare(&task, story.as_ref(), self.settings.isolation)
                .await
            {
                Ok(wt) => wt,
                Err(e) => {
                    let reason = format!("worktree preparation failed: {}", e);
                    self.block(&task, None, epic_id.as_deref(), &reason, None, report)
                        .await;
                    continue;
                }
            };
            self.log.emit(Event::WorktreePrepared {
                task_id: task.id.clone(),
                worktree: worktree.name.clone(),
                isolated: worktree.isolated,
            });

            let hook_ctx = self.hook_context(&task, epic_id.as_deref(), &worktree);
            let fired = self.hooks.fire(HookPoint::PreTask, &hook_ctx).await;
            if let Some(reason) = self.record_hooks(&fired, Some(&task.id), report).await {
                self.block(&task, Some(&worktree), epic_id.as_deref(), &reason, None, report)
                    .await;
                continue;
            }

            let lease = self.worktrees.lease(&worktree);
            let ctx = TaskContext {
                session_id: self.log.session_id(),
                mode: self.mode,
                task: task.clone(),
                story,
                epic_id: epic_id.clone(),
                worktree: worktree.clone(),
            };
            launched.push((
                ctx,
                Launched {
                    task,
                    epic_id,
                    worktree,
                    lease,
                },
            ));
        }

        Ok(launched)
    }

    fn hook_context(&self, task: &Task, epic_id: Option<&str>, worktree: &Worktree) -> HookContext {
        HookContext::for_task(task, epic_id, self.mode).with_workdir(worktree.path.clone())
    }

    /// Turn a worker's answer into a final task status. Never fails: any
    /// error blocks the task instead.
    async fn settle(&self, launch: Launched, run: WorkerRun, report: &mut CycleReport) {
        let Launched {
            task,
            epic_id,
            worktree,
            lease,
        } = launch;

        let result = match run {
            WorkerRun::TimedOut(limit) => {
                warn!(task_id = %task.id, seconds = limit.as_secs(), "Worker timed out");
                drop(lease);
                let err = OrchestratorError::Timeout {
                    task_id: task.id.clone(),
                    seconds: limit.as_secs(),
                };
                self.log
                    .record(SessionEventKind::Error, json!({ "message": err.to_string(), "task_id": task.id }))
                    .await;
                self.block(&task, Some(&worktree), epic_id.as_deref(), "timeout", None, report)
                    .await;
                return;
            }
            WorkerRun::Finished(Err(e)) => {
                lease.release();
                let reason = e.to_string();
                self.block(&task, Some(&worktree), epic_id.as_deref(), &reason, None, report)
                    .await;
                return;
            }
            WorkerRun::Finished(Ok(result)) if !result.is_done() => {
                lease.release();
                let reason = result.block_reason();
                self.block(
                    &task,
                    Some(&worktree),
                    epic_id.as_deref(),
                    &reason,
                    Some(result),
                    report,
                )
                .await;
                return;
            }
            WorkerRun::Finished(Ok(result)) => result,
        };

        match self
            .complete(&task, epic_id.as_deref(), &worktree, lease, &result, report)
            .await
        {
            Ok(outcome) => report.outcomes.push(outcome),
            Err(e) => {
                let reason = match &e {
                    OrchestratorError::HookCritical { .. } | OrchestratorError::Conflict { .. } => {
                        e.to_string()
                    }
                    other => format!("completion failed: {}", other),
                };
                self.block(
                    &task,
                    Some(&worktree),
                    epic_id.as_deref(),
                    &reason,
                    Some(result),
                    report,
                )
                .await;
            }
        }
    }

    /// post-task hooks, pre-commit hooks, commit, mark done, boundaries.
    async fn complete(
        &self,
        task: &Task,
        epic_id: Option<&str>,
        worktree: &Worktree,
        lease: WorktreeLease,
        result: &TaskResult,
        report: &mut CycleReport,
    ) -> Result<TaskOutcome> {
        let hook_ctx = self.hook_context(task, epic_id, worktree);

        for point in [HookPoint::PostTask, HookPoint::PreCommit] {
            let fired = self.hooks.fire(point, &hook_ctx).await;
            self.record_hooks(&fired, Some(&task.id), report).await;
            if let Some(critical) = CriticalHook::from_report(&fired, Some(&task.id)) {
                lease.release();
                return Err(OrchestratorError::HookCritical {
                    point: critical.point,
                    action: critical.action,
                    message: critical.message,
                });
            }
        }

        let message = format!("{}: {}", task.id, task.title);
        let commit = self.commit_with_retry(worktree, &message).await;
        lease.release();
        let commit = commit?;

        let (done, boundaries) = self.store.complete_task(&task.id).await?;
        self.log.emit(Event::TaskStatusChanged {
            task_id: done.id.clone(),
            from_status: TaskStatus::InProgress.as_str().to_string(),
            to_status: done.status.as_str().to_string(),
        });

        if checkpoint::decide(self.mode, Boundary::Task).logs() {
            self.log
                .record(
                    SessionEventKind::TaskCompleted,
                    json!({
                        "task_id": done.id,
                        "commit": commit,
                        "notes": result.notes,
                        "artifacts": result.artifacts,
                    }),
                )
                .await;
        }

        let outcome = TaskOutcome {
            task_id: done.id.clone(),
            title: done.title.clone(),
            status: done.status,
            result: Some(result.clone()),
            reason: None,
            commit,
            story_completed: boundaries.story_completed.clone(),
            epic_completed: boundaries.epic_completed.clone(),
        };

        if let Some(story_id) = &boundaries.story_completed {
            self.reach_boundary(Boundary::Story, story_id, task, epic_id, worktree, report)
                .await;
        }
        if let Some(epic) = &boundaries.epic_completed {
            self.reach_boundary(Boundary::Epic, epic, task, epic_id, worktree, report)
                .await;
        }

        let finishes_worktree = task.story_id.is_none() || boundaries.story_completed.is_some();
        if worktree.isolated && finishes_worktree {
            self.dispose(worktree, report).await;
        }

        Ok(outcome)
    }

    async fn reach_boundary(
        &self,
        boundary: Boundary,
        id: &str,
        task: &Task,
        epic_id: Option<&str>,
        worktree: &Worktree,
        report: &mut CycleReport,
    ) {
        info!(boundary = boundary.as_str(), id, "Boundary reached");
        if checkpoint::decide(self.mode, boundary).logs() {
            self.log
                .record(
                    SessionEventKind::BoundaryReached,
                    json!({ "boundary": boundary.as_str(), "id": id, "task_id": task.id }),
                )
                .await;
        }

        let point = match boundary {
            Boundary::Story => HookPoint::PostStory,
            Boundary::Epic => HookPoint::PostEpic,
            Boundary::Task => HookPoint::PostTask,
        };
        let ctx = self
            .hook_context(task, epic_id, worktree)
            .with_boundary(boundary.as_str());
        let fired = self.hooks.fire(point, &ctx).await;
        self.record_hooks(&fired, Some(&task.id), report).await;
    }

    /// Commit, rebasing onto the default branch and retrying on conflict.
    async fn commit_with_retry(&self, worktree: &Worktree, message: &str) -> Result<Option<String>> {
        let mut rebases = 0;
        loop {
            match self.worktrees.commit(worktree, message).await {
                Ok(rev) => return Ok(rev),
                Err(e) if e.is_conflict() && rebases < self.settings.commit_retries => {
                    rebases += 1;
                    warn!(
                        worktree = %worktree.name,
                        attempt = rebases,
                        error = %e,
                        "Commit conflicted, rebasing"
                    );
                    if let Err(e) = self.worktrees.rebase(worktree).await {
                        if !e.is_conflict() {
                            return Err(e.into());
                        }
                        warn!(worktree = %worktree.name, error = %e, "Rebase conflicted");
                    }
                }
                Err(e) if e.is_conflict() => {
                    return Err(OrchestratorError::Conflict {
                        worktree: worktree.name.clone(),
                        attempts: rebases,
                        detail: e.to_string(),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn dispose(&self, worktree: &Worktree, report: &mut CycleReport) {
        let pending = |note: Option<String>| PendingDisposition {
            worktree: worktree.name.clone(),
            owner_id: worktree.owner_id.clone(),
            branch: worktree.branch.clone(),
            note,
        };

        let Some(disposition) = self.settings.auto_disposition else {
            report.pending_dispositions.push(pending(None));
            return;
        };

        match self.worktrees.complete(worktree, disposition).await {
            Ok(completion) => {
                info!(worktree = %worktree.name, ?completion, "Worktree completed");
                self.log.emit(Event::WorktreeCompleted {
                    worktree: worktree.name.clone(),
                    disposition: disposition.as_str().to_string(),
                });
            }
            Err(e) => {
                warn!(worktree = %worktree.name, error = %e, "Automatic disposition failed");
                self.log
                    .record(
                        SessionEventKind::Error,
                        json!({ "message": e.to_string(), "worktree": worktree.name }),
                    )
                    .await;
                report.pending_dispositions.push(pending(Some(e.to_string())));
            }
        }
    }

    /// Block `task`, record it, and fire `on-blocker`.
    async fn block(
        &self,
        task: &Task,
        worktree: Option<&Worktree>,
        epic_id: Option<&str>,
        reason: &str,
        result: Option<TaskResult>,
        report: &mut CycleReport,
    ) {
        match self.store.block_task(&task.id, reason).await {
            Ok(blocked) => {
                self.log.emit(Event::TaskStatusChanged {
                    task_id: task.id.clone(),
                    from_status: TaskStatus::InProgress.as_str().to_string(),
                    to_status: blocked.status.as_str().to_string(),
                });
            }
            Err(e) => {
                error!(task_id = %task.id, error = %e, "Failed to block task");
            }
        }

        self.log.emit(Event::TaskBlocked {
            task_id: task.id.clone(),
            reason: reason.to_string(),
        });
        self.log
            .record(
                SessionEventKind::TaskBlocked,
                json!({ "task_id": task.id, "reason": reason }),
            )
            .await;

        let mut ctx = HookContext::for_task(task, epic_id, self.mode).with_blocker_reason(reason);
        if let Some(wt) = worktree {
            ctx = ctx.with_workdir(wt.path.clone());
        }
        let fired = self.hooks.fire(HookPoint::OnBlocker, &ctx).await;
        self.record_hooks(&fired, Some(&task.id), report).await;

        report.outcomes.push(TaskOutcome::blocked(task, reason, result));
    }

    /// Log every result of a firing. Returns a block reason when the firing
    /// ended in a critical result.
    async fn record_hooks(
        &self,
        fired: &FireReport,
        task_id: Option<&str>,
        report: &mut CycleReport,
    ) -> Option<String> {
        self.log.record_firing(fired, task_id).await;
        let critical = CriticalHook::from_report(fired, task_id)?;
        let reason =
            OrchestratorError::hook_critical(&critical.point, &critical.action, &critical.message)
                .to_string();
        report.critical.push(critical);
        Some(reason)
    }
}
