//! Project configuration, stored as `.conductor/config.toml`.

use conductor_core::{Disposition, IsolationOverride, Mode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::error::{OrchestratorError, Result};
use crate::hooks::HooksConfig;

pub const CONDUCTOR_DIR: &str = ".conductor";
pub const CONFIG_FILE: &str = "config.toml";
pub const DB_FILE: &str = "conductor.db";

/// Parallelism above this is clamped.
pub const MAX_PARALLEL_CEILING: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub session: SessionConfig,
    pub worktree: WorktreeSettings,
    pub hooks: HooksConfig,
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub mode: Mode,
    pub max_parallel: usize,
    /// Per-task worker timeout in seconds. Unset means no timeout.
    pub task_timeout_secs: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Supervised,
            max_parallel: 1,
            task_timeout_secs: None,
        }
    }
}

impl SessionConfig {
    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorktreeSettings {
    /// Relative paths resolve against the repository root.
    pub base: PathBuf,
    pub branch_prefix: String,
    pub remote: String,
    /// Used when neither `origin/HEAD`, `main`, nor `master` exist.
    pub fallback_branch: String,
    pub copy_files: Vec<String>,
    pub symlink_dirs: Vec<String>,
    pub install_dependencies: bool,
    /// Applied by the dispatcher when a standalone task or a story
    /// finishes. Unset leaves the worktree for `conductor worktree complete`.
    pub auto_disposition: Option<Disposition>,
    pub isolation: Option<IsolationOverride>,
    /// `gh` (GitHub CLI) or `api` (token-based client).
    pub pr_host: Option<String>,
}

impl Default for WorktreeSettings {
    fn default() -> Self {
        let defaults = vcs::WorktreeConfig::default();
        Self {
            base: defaults.worktree_base,
            branch_prefix: defaults.branch_prefix,
            remote: defaults.remote,
            fallback_branch: "main".to_string(),
            copy_files: defaults.copy_files,
            symlink_dirs: defaults.symlink_dirs,
            install_dependencies: defaults.install_dependencies,
            auto_disposition: None,
            isolation: None,
            pr_host: None,
        }
    }
}

impl WorktreeSettings {
    pub fn to_worktree_config(&self) -> vcs::WorktreeConfig {
        vcs::WorktreeConfig {
            worktree_base: self.base.clone(),
            branch_prefix: self.branch_prefix.clone(),
            remote: self.remote.clone(),
            copy_files: self.copy_files.clone(),
            symlink_dirs: self.symlink_dirs.clone(),
            install_dependencies: self.install_dependencies,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// `[program, args...]` run in the task's worktree.
    pub command: Vec<String>,
}

impl Config {
    pub fn dir(repo_root: &Path) -> PathBuf {
        repo_root.join(CONDUCTOR_DIR)
    }

    pub fn path(repo_root: &Path) -> PathBuf {
        Self::dir(repo_root).join(CONFIG_FILE)
    }

    pub fn database_path(repo_root: &Path) -> PathBuf {
        Self::dir(repo_root).join(DB_FILE)
    }

    /// Load the project config. A missing file yields defaults; a file that
    /// does not parse is an error.
    pub async fn load(repo_root: &Path) -> Result<Self> {
        let path = Self::path(repo_root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(&path).await?;
        Self::parse(&content)
            .map_err(|e| OrchestratorError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.hooks.bindings()?;
        Ok(config)
    }

    pub async fn save(&self, repo_root: &Path) -> Result<()> {
        let dir = Self::dir(repo_root);
        tokio::fs::create_dir_all(&dir).await?;
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(dir.join(CONFIG_FILE), content).await?;
        Ok(())
    }

    /// `max_parallel` from config or the command line, clamped to
    /// `1..=MAX_PARALLEL_CEILING`.
    pub fn effective_parallelism(requested: usize) -> usize {
        if requested > MAX_PARALLEL_CEILING {
            warn!(
                requested,
                ceiling = MAX_PARALLEL_CEILING,
                "max_parallel above ceiling, clamping"
            );
        }
        requested.clamp(1, MAX_PARALLEL_CEILING)
    }
}
