use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Result of merging a finished branch into the base branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MergeOutcome {
    Merged,
    /// The merge was aborted; the base branch is unchanged.
    Conflicted { paths: Vec<PathBuf> },
}

/// One checkout reported by the VCS itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeEntry {
    pub path: PathBuf,
    pub branch: Option<String>,
}

/// Version control operations the worktree manager needs.
///
/// Paths are absolute checkout paths; the repository root is fixed per
/// implementation.
#[async_trait]
pub trait VersionControl: Send + Sync {
    fn name(&self) -> &'static str;

    fn repo_path(&self) -> &Path;

    /// Branch new worktrees start from and merges land on.
    async fn default_branch(&self) -> Result<String>;

    /// Add a checkout at `path` on a new branch `branch` started from `base`.
    async fn create_worktree(&self, branch: &str, path: &Path, base: &str) -> Result<()>;

    /// Force-remove the checkout and delete its branch.
    async fn remove_worktree(&self, path: &Path, branch: &str) -> Result<()>;

    /// Stage everything and commit. Returns the new revision, or `None`
    /// when there was nothing to commit. Conflicts surface as
    /// [`VcsError::MergeConflict`](crate::VcsError::MergeConflict).
    async fn commit(&self, path: &Path, message: &str) -> Result<Option<String>>;

    /// Rebase the checkout's branch onto `onto`, aborting on conflict.
    async fn rebase(&self, path: &Path, onto: &str) -> Result<()>;

    /// No-fast-forward merge of `branch` into `into` in the main checkout.
    async fn merge(&self, branch: &str, into: &str, message: &str) -> Result<MergeOutcome>;

    async fn push(&self, path: &Path, remote: &str, branch: &str) -> Result<()>;

    async fn list_worktrees(&self) -> Result<Vec<WorktreeEntry>>;

    async fn has_uncommitted_changes(&self, path: &Path) -> Result<bool>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub title: String,
    pub body: String,
    /// Branch holding the changes.
    pub head: String,
    /// Branch to merge into.
    pub base: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestInfo {
    pub number: u64,
    pub url: String,
}

/// Somewhere a pushed branch can be proposed for review.
#[async_trait]
pub trait PullRequestHost: Send + Sync {
    async fn open_pull_request(&self, pr: &PullRequest) -> Result<PullRequestInfo>;
}
