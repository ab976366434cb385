//! Hand-written fakes for the orchestrator integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use conductor_core::{Epic, EpicPriority, Mode, Session, Story, Task, TaskType};
use db::{TaskStore, WorktreeRepository};
use events::EventBus;
use orchestrator::hooks::{ActionSpec, HookBindings};
use orchestrator::{
    ActionOutcome, ActionRegistry, DispatchSettings, Dispatcher, HookAction, HookContext,
    HookEngine, Orchestrator, SessionLog, TaskContext, TaskResult, Worker,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Mutex;
use vcs::{
    MergeOutcome, Result as VcsResult, VcsError, VersionControl, WorktreeConfig, WorktreeEntry,
    WorktreeManager,
};

/// Records calls; commits conflict a scripted number of times.
pub struct FakeVcs {
    repo: PathBuf,
    calls: StdMutex<Vec<String>>,
    commit_conflicts: AtomicU32,
    merge_conflicts: AtomicBool,
}

impl FakeVcs {
    pub fn new(repo: &Path) -> Self {
        Self {
            repo: repo.to_path_buf(),
            calls: StdMutex::new(Vec::new()),
            commit_conflicts: AtomicU32::new(0),
            merge_conflicts: AtomicBool::new(false),
        }
    }

    /// Every merge from now on stops on a conflict.
    pub fn conflict_merges(&self) {
        self.merge_conflicts.store(true, Ordering::SeqCst);
    }

    /// The next `n` commits fail with a conflict.
    pub fn conflict_next_commits(&self, n: u32) {
        self.commit_conflicts.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl VersionControl for FakeVcs {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn repo_path(&self) -> &Path {
        &self.repo
    }

    async fn default_branch(&self) -> VcsResult<String> {
        Ok("main".to_string())
    }

    async fn create_worktree(&self, branch: &str, path: &Path, base: &str) -> VcsResult<()> {
        tokio::fs::create_dir_all(path).await?;
        self.record(format!("create {} {}", branch, base));
        Ok(())
    }

    async fn remove_worktree(&self, path: &Path, branch: &str) -> VcsResult<()> {
        if path.exists() {
            tokio::fs::remove_dir_all(path).await?;
        }
        self.record(format!("remove {}", branch));
        Ok(())
    }

    async fn commit(&self, _path: &Path, message: &str) -> VcsResult<Option<String>> {
        self.record(format!("commit {}", message));
        let remaining = self.commit_conflicts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.commit_conflicts.store(remaining - 1, Ordering::SeqCst);
            return Err(VcsError::MergeConflict("src/lib.rs".to_string()));
        }
        Ok(Some("abc123".to_string()))
    }

    async fn rebase(&self, _path: &Path, onto: &str) -> VcsResult<()> {
        self.record(format!("rebase {}", onto));
        Ok(())
    }

    async fn merge(&self, branch: &str, into: &str, _message: &str) -> VcsResult<MergeOutcome> {
        self.record(format!("merge {} {}", branch, into));
        if self.merge_conflicts.load(Ordering::SeqCst) {
            return Ok(MergeOutcome::Conflicted {
                paths: vec![PathBuf::from("src/lib.rs")],
            });
        }
        Ok(MergeOutcome::Merged)
    }

    async fn push(&self, _path: &Path, remote: &str, branch: &str) -> VcsResult<()> {
        self.record(format!("push {} {}", remote, branch));
        Ok(())
    }

    async fn list_worktrees(&self) -> VcsResult<Vec<WorktreeEntry>> {
        Ok(Vec::new())
    }

    async fn has_uncommitted_changes(&self, _path: &Path) -> VcsResult<bool> {
        Ok(false)
    }
}

#[derive(Debug, Clone)]
pub enum Script {
    Done,
    Fail(String),
    NeedsInput(String),
    Sleep(Duration),
}

/// Answers per task id; unscripted tasks finish `done` after a short delay
/// so parallel runs overlap.
#[derive(Default)]
pub struct ScriptedWorker {
    scripts: StdMutex<HashMap<String, Script>>,
    executed: StdMutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedWorker {
    pub fn script(&self, task_id: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .insert(task_id.to_string(), script);
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Worker for ScriptedWorker {
    async fn execute(&self, ctx: &TaskContext) -> orchestrator::Result<TaskResult> {
        self.executed.lock().unwrap().push(ctx.task.id.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&ctx.task.id)
            .cloned()
            .unwrap_or(Script::Sleep(Duration::from_millis(20)));

        let result = match script {
            Script::Done => TaskResult::done(),
            Script::Fail(notes) => TaskResult::failed(notes),
            Script::NeedsInput(notes) => TaskResult::needs_input(notes),
            Script::Sleep(d) => {
                tokio::time::sleep(d).await;
                TaskResult::done()
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(result)
    }
}

/// A hook action with a fixed outcome that records every call.
pub struct RecordingAction {
    name: String,
    outcome: ActionOutcome,
    calls: Arc<StdMutex<Vec<String>>>,
}

impl RecordingAction {
    pub fn new(name: &str, outcome: ActionOutcome, calls: Arc<StdMutex<Vec<String>>>) -> Self {
        Self {
            name: name.to_string(),
            outcome,
            calls,
        }
    }
}

#[async_trait]
impl HookAction for RecordingAction {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &HookContext) -> ActionOutcome {
        self.calls.lock().unwrap().push(format!(
            "{}:{}",
            self.name,
            ctx.task_id.as_deref().unwrap_or("-")
        ));
        self.outcome.clone()
    }
}

pub type Calls = Arc<StdMutex<Vec<String>>>;

pub fn calls() -> Calls {
    Arc::new(StdMutex::new(Vec::new()))
}

/// Engine binding each `(point, action, outcome)` to a recording action.
pub fn engine(bindings: &[(&str, &str, ActionOutcome)], calls: &Calls) -> HookEngine {
    let mut points: HashMap<&str, Vec<ActionSpec>> = HashMap::new();
    let mut registry = ActionRegistry::new();
    for (point, action, outcome) in bindings {
        points
            .entry(*point)
            .or_default()
            .push(ActionSpec::new(*action));
        registry = registry.with(Arc::new(RecordingAction::new(
            action,
            outcome.clone(),
            Arc::clone(calls),
        )));
    }

    let mut hook_bindings = HookBindings::empty();
    for (point, actions) in points {
        hook_bindings.set(point, actions);
    }
    HookEngine::new(hook_bindings, registry)
}

pub struct Harness {
    pub repo: TempDir,
    pub base: TempDir,
    pub store: TaskStore,
    pub vcs: Arc<FakeVcs>,
    pub worker: Arc<ScriptedWorker>,
    pub bus: EventBus,
}

impl Harness {
    pub async fn new() -> Self {
        let repo = TempDir::new().unwrap();
        let base = TempDir::new().unwrap();
        let store = TaskStore::open("sqlite::memory:").await.unwrap();
        let vcs = Arc::new(FakeVcs::new(repo.path()));
        Self {
            repo,
            base,
            store,
            vcs,
            worker: Arc::new(ScriptedWorker::default()),
            bus: EventBus::new(),
        }
    }

    pub fn worktree_manager(&self) -> WorktreeManager {
        let mut config = WorktreeConfig::new(self.base.path().to_path_buf());
        config.install_dependencies = false;
        let vcs: Arc<dyn VersionControl> = self.vcs.clone();
        WorktreeManager::new(
            vcs,
            WorktreeRepository::new(self.store.pool().clone()),
            config,
        )
    }

    pub fn orchestrator(&self, hooks: HookEngine, settings: DispatchSettings) -> Orchestrator {
        let worker: Arc<dyn Worker> = self.worker.clone();
        Orchestrator::new(self.store.clone(), self.worktree_manager(), hooks, worker)
            .with_settings(settings)
            .with_event_bus(self.bus.clone())
    }

    /// A dispatcher bound to a fresh running session.
    pub async fn dispatcher(
        &self,
        hooks: HookEngine,
        mode: Mode,
        settings: DispatchSettings,
    ) -> Dispatcher {
        let session = self
            .store
            .sessions()
            .create(&Session::new(mode))
            .await
            .unwrap();
        let log = SessionLog::new(session.id, self.store.events().clone(), self.bus.clone());
        let worker: Arc<dyn Worker> = self.worker.clone();
        Dispatcher::new(
            self.store.clone(),
            Arc::new(self.worktree_manager()),
            Arc::new(hooks),
            worker,
            log,
            mode,
            settings,
            Arc::new(Mutex::new(())),
        )
    }

    pub async fn epic(&self, id: &str) {
        self.store
            .create_epic(&Epic::new(id, format!("Epic {}", id), EpicPriority::P1))
            .await
            .unwrap();
    }

    pub async fn story(&self, id: &str, epic_id: &str) {
        self.store
            .create_story(&Story::new(id, epic_id, format!("Story {}", id)))
            .await
            .unwrap();
    }

    pub async fn task(&self, id: &str, task_type: TaskType, story: Option<&str>) -> Task {
        let mut task = Task::new(format!("Task {}", id), task_type).with_id(id);
        if let Some(story) = story {
            task = task.with_story(story);
        }
        self.store.create_task(&task).await.unwrap()
    }

    pub async fn depends(&self, blocked: &str, blocker: &str) {
        self.store.add_dependency(blocked, blocker).await.unwrap();
    }
}
