use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use db::TaskStore;
use github::{GhCli, GitHubClient, GitHubError, RepoSlug};
use orchestrator::{
    builtin_registry, CommandWorker, Config, DispatchSettings, HookEngine, Orchestrator,
    OrchestratorError, TaskContext, TaskResult, Worker,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use vcs::{GitVcs, PullRequestHost, VersionControl, WorktreeManager};

/// An initialized repository: its root, config, and task store.
pub struct Project {
    pub root: PathBuf,
    pub config: Config,
    pub store: TaskStore,
}

impl Project {
    /// Walk up from `start` to the nearest directory holding `.conductor/`.
    pub fn find_root(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .find(|dir| Config::dir(dir).is_dir())
            .map(Path::to_path_buf)
    }

    pub async fn open(repo: Option<PathBuf>) -> Result<Self> {
        let start = match repo {
            Some(path) => path,
            None => std::env::current_dir()?,
        };
        let Some(root) = Self::find_root(&start) else {
            bail!(
                "No {} directory found from {}. Run 'conductor init' first.",
                orchestrator::config::CONDUCTOR_DIR,
                start.display()
            );
        };

        let config = Config::load(&root)
            .await
            .context("Failed to load configuration")?;
        let store = TaskStore::open(&database_url(&root))
            .await
            .context("Failed to open task database")?;

        Ok(Self {
            root,
            config,
            store,
        })
    }

    pub fn vcs(&self) -> Arc<dyn VersionControl> {
        Arc::new(
            GitVcs::new(self.root.clone())
                .with_fallback_branch(self.config.worktree.fallback_branch.clone()),
        )
    }

    /// `gh` unless the config asks for the token-based API client.
    async fn pull_request_host(&self) -> Result<Option<Arc<dyn PullRequestHost>>> {
        match self.config.worktree.pr_host.as_deref() {
            Some("api") => {
                let repo = RepoSlug::from_origin(&self.root)
                    .await
                    .ok_or_else(|| GitHubError::UnknownRepository(self.root.display().to_string()))?;
                let client = GitHubClient::from_env(repo).context("Failed to create GitHub client")?;
                Ok(Some(Arc::new(client)))
            }
            Some("gh") => Ok(Some(Arc::new(GhCli::new(&self.root)))),
            Some(other) => bail!("Unknown worktree.pr_host '{}', expected 'gh' or 'api'", other),
            None if GhCli::is_available().await => Ok(Some(Arc::new(GhCli::new(&self.root)))),
            None => Ok(None),
        }
    }

    pub async fn worktrees(&self) -> Result<WorktreeManager> {
        let manager = WorktreeManager::new(
            self.vcs(),
            self.store.worktrees().clone(),
            self.config.worktree.to_worktree_config(),
        );
        Ok(match self.pull_request_host().await? {
            Some(host) => manager.with_pull_request_host(host),
            None => manager,
        })
    }

    /// Orchestrator that runs tasks with the configured worker command.
    pub async fn orchestrator(&self, settings: DispatchSettings) -> Result<Orchestrator> {
        if self.config.worker.command.is_empty() {
            bail!(
                "No worker configured. Set worker.command in {}",
                Config::path(&self.root).display()
            );
        }
        let worker = Arc::new(CommandWorker::from_command(&self.config.worker.command)?);
        self.build(worker, settings).await
    }

    /// Orchestrator for `stop` and `mode`, which change session state but
    /// never dispatch.
    pub async fn orchestrator_for_control(&self) -> Result<Orchestrator> {
        self.build(Arc::new(ControlOnly), DispatchSettings::from_config(&self.config))
            .await
    }

    async fn build(&self, worker: Arc<dyn Worker>, settings: DispatchSettings) -> Result<Orchestrator> {
        let registry = builtin_registry(self.store.clone(), self.vcs());
        let hooks = HookEngine::from_config(&self.config.hooks, registry, &self.root)
            .context("Invalid hook configuration")?;

        Ok(Orchestrator::new(self.store.clone(), self.worktrees().await?, hooks, worker)
            .with_settings(settings))
    }
}

struct ControlOnly;

#[async_trait]
impl Worker for ControlOnly {
    async fn execute(&self, ctx: &TaskContext) -> orchestrator::Result<TaskResult> {
        Err(OrchestratorError::worker_failure(
            &ctx.task.id,
            "control commands do not run tasks",
        ))
    }
}

pub fn database_url(root: &Path) -> String {
    format!("sqlite:{}", Config::database_path(root).display())
}
