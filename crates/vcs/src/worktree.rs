use conductor_core::{
    Disposition, IsolationOverride, Story, Task, TaskType, Worktree, WorktreeScope, WorktreeStatus,
};
use db::WorktreeRepository;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Result, VcsError};
use crate::install::install_dependencies;
use crate::traits::{MergeOutcome, PullRequest, PullRequestHost, PullRequestInfo, VersionControl};

#[derive(Debug, Clone)]
pub struct WorktreeConfig {
    /// Where worktrees are created. Relative paths resolve against the
    /// repository root.
    pub worktree_base: PathBuf,
    pub branch_prefix: String,
    pub remote: String,
    pub copy_files: Vec<String>,
    pub symlink_dirs: Vec<String>,
    pub install_dependencies: bool,
}

impl Default for WorktreeConfig {
    fn default() -> Self {
        Self {
            worktree_base: PathBuf::from("../.conductor-worktrees"),
            branch_prefix: "conductor".to_string(),
            remote: "origin".to_string(),
            copy_files: vec![".env".to_string(), ".env.local".to_string()],
            symlink_dirs: Vec::new(),
            install_dependencies: true,
        }
    }
}

impl WorktreeConfig {
    pub fn new(worktree_base: PathBuf) -> Self {
        Self {
            worktree_base,
            ..Default::default()
        }
    }
}

/// What [`WorktreeManager::complete`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Merged,
    PullRequest(PullRequestInfo),
    Kept,
    Discarded,
    /// The task ran in the main checkout; there was nothing to finish.
    InPlace,
}

/// Lowercase ASCII slug: alphanumerics kept, everything else collapsed to
/// single dashes, capped at 40 characters.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let mut slug: String = slug.chars().take(40).collect();
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Isolation policy: an explicit override wins, then the task type, and
/// chores and tests follow whatever their story already decided.
pub fn decide_isolation(
    task_type: TaskType,
    story_decision: Option<bool>,
    force: Option<IsolationOverride>,
) -> bool {
    match force {
        Some(IsolationOverride::AlwaysIsolate) => return true,
        Some(IsolationOverride::NeverIsolate) => return false,
        None => {}
    }
    match task_type {
        TaskType::Feature | TaskType::Bug | TaskType::Spike => true,
        TaskType::Chore | TaskType::Test => story_decision.unwrap_or(true),
        TaskType::Research | TaskType::Other => true,
    }
}

type LeaseTable = Arc<StdMutex<HashMap<String, usize>>>;

/// Marks a worktree as in use by an in-flight task.
///
/// Dropping the lease releases it. A lease dropped without [`release`]
/// (the task was cancelled or timed out) is logged.
///
/// [`release`]: WorktreeLease::release
pub struct WorktreeLease {
    name: String,
    leases: LeaseTable,
    released: bool,
}

impl WorktreeLease {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn release(mut self) {
        self.released = true;
    }
}

impl Drop for WorktreeLease {
    fn drop(&mut self) {
        if !self.released {
            warn!(worktree = %self.name, "Worktree lease dropped without release");
        }
        if let Ok(mut leases) = self.leases.lock() {
            if let Some(count) = leases.get_mut(&self.name) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    leases.remove(&self.name);
                }
            }
        }
    }
}

/// Prepares, shares, and finishes worktrees.
///
/// Story → worktree is looked up through the `worktrees` table by owner id;
/// tasks never hold a pointer to their worktree.
pub struct WorktreeManager {
    vcs: Arc<dyn VersionControl>,
    pr_host: Option<Arc<dyn PullRequestHost>>,
    records: WorktreeRepository,
    config: WorktreeConfig,
    leases: LeaseTable,
    prepare_lock: Mutex<()>,
}

impl WorktreeManager {
    pub fn new(vcs: Arc<dyn VersionControl>, records: WorktreeRepository, config: WorktreeConfig) -> Self {
        Self {
            vcs,
            pr_host: None,
            records,
            config,
            leases: Arc::new(StdMutex::new(HashMap::new())),
            prepare_lock: Mutex::new(()),
        }
    }

    pub fn with_pull_request_host(mut self, host: Arc<dyn PullRequestHost>) -> Self {
        self.pr_host = Some(host);
        self
    }

    pub fn vcs(&self) -> &dyn VersionControl {
        self.vcs.as_ref()
    }

    pub fn repo_path(&self) -> &Path {
        self.vcs.repo_path()
    }

    fn worktree_base(&self) -> PathBuf {
        if self.config.worktree_base.is_absolute() {
            self.config.worktree_base.clone()
        } else {
            self.repo_path().join(&self.config.worktree_base)
        }
    }

    /// Find or create the checkout `task` should run in.
    ///
    /// Calls are serialized so a story's shared worktree is created at most
    /// once even when sibling tasks are prepared concurrently.
    pub async fn prepare(
        &self,
        task: &Task,
        story: Option<&Story>,
        force: Option<IsolationOverride>,
    ) -> Result<Worktree> {
        let _guard = self.prepare_lock.lock().await;

        let recorded = match &task.story_id {
            Some(story_id) => self.records.story_isolation(story_id).await?,
            None => None,
        };
        let isolate = decide_isolation(task.task_type, recorded, force);
        if let Some(story_id) = &task.story_id {
            self.records.record_story_isolation(story_id, isolate).await?;
        }

        if !isolate {
            let branch = self.vcs.default_branch().await?;
            info!(task_id = %task.id, "Running task in the main checkout");
            return Ok(Worktree::in_place(
                task.id.clone(),
                self.repo_path().to_path_buf(),
                branch,
            ));
        }

        let (owner_id, scope, title) = match &task.story_id {
            Some(story_id) => (
                story_id.clone(),
                WorktreeScope::Story,
                story.map_or(task.title.as_str(), |s| s.title.as_str()),
            ),
            None => (task.id.clone(), WorktreeScope::Task, task.title.as_str()),
        };

        if let Some(existing) = self.records.find_live_by_owner(&owner_id).await? {
            if existing.path.exists() {
                debug!(task_id = %task.id, worktree = %existing.name, "Reusing worktree");
                self.records.touch(&existing.name).await?;
                return Ok(existing);
            }
            warn!(worktree = %existing.name, "Recorded worktree is missing on disk, recreating");
            self.records
                .update_status(&existing.name, WorktreeStatus::Discarded)
                .await?;
        }

        self.create(owner_id, scope, title).await
    }

    async fn create(&self, owner_id: String, scope: WorktreeScope, title: &str) -> Result<Worktree> {
        let slug = slugify(title);
        let name = if slug.is_empty() {
            owner_id.clone()
        } else {
            format!("{}-{}", owner_id, slug)
        };
        let branch = format!("{}/{}", self.config.branch_prefix, name);
        let path = self.worktree_base().join(&name);
        let base = self.vcs.default_branch().await?;

        info!(worktree = %name, %branch, %base, "Creating worktree");
        self.vcs.create_worktree(&branch, &path, &base).await?;

        if let Err(e) = self.setup_files(&path).await {
            warn!(worktree = %name, error = %e, "File setup failed, removing worktree");
            let _ = self.vcs.remove_worktree(&path, &branch).await;
            return Err(e);
        }

        if self.config.install_dependencies {
            install_dependencies(&path).await;
        }

        let worktree = Worktree::new(name, branch, owner_id, scope, path);
        self.records.upsert(&worktree).await?;
        Ok(worktree)
    }

    async fn setup_files(&self, path: &Path) -> Result<()> {
        let repo = self.repo_path();

        for file in &self.config.copy_files {
            let src = repo.join(file);
            let dst = path.join(file);

            if src.exists() {
                debug!(file, "Copying into worktree");
                if let Some(parent) = dst.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::copy(&src, &dst).await?;
            }
        }

        for dir in &self.config.symlink_dirs {
            let src = repo.join(dir);
            let dst = path.join(dir);

            if src.exists() && !dst.exists() {
                debug!(dir, "Symlinking into worktree");
                #[cfg(unix)]
                tokio::fs::symlink(&src, &dst).await?;
                #[cfg(windows)]
                tokio::fs::symlink_dir(&src, &dst).await?;
            }
        }

        Ok(())
    }

    /// Mark `worktree` as in use until the returned lease is dropped.
    pub fn lease(&self, worktree: &Worktree) -> WorktreeLease {
        if let Ok(mut leases) = self.leases.lock() {
            *leases.entry(worktree.name.clone()).or_insert(0) += 1;
        }
        WorktreeLease {
            name: worktree.name.clone(),
            leases: Arc::clone(&self.leases),
            released: false,
        }
    }

    pub fn is_leased(&self, name: &str) -> bool {
        self.leases
            .lock()
            .map(|leases| leases.get(name).copied().unwrap_or(0) > 0)
            .unwrap_or(false)
    }

    /// Commit everything in the worktree. Non-isolated placements are never
    /// committed on a task's behalf.
    pub async fn commit(&self, worktree: &Worktree, message: &str) -> Result<Option<String>> {
        if !worktree.isolated {
            return Ok(None);
        }
        let rev = self.vcs.commit(&worktree.path, message).await?;
        self.records.touch(&worktree.name).await?;
        Ok(rev)
    }

    /// Rebase the worktree branch onto the default branch.
    pub async fn rebase(&self, worktree: &Worktree) -> Result<()> {
        if !worktree.isolated {
            return Ok(());
        }
        let base = self.vcs.default_branch().await?;
        self.vcs.rebase(&worktree.path, &base).await
    }

    pub async fn complete(&self, worktree: &Worktree, disposition: Disposition) -> Result<Completion> {
        if !worktree.isolated {
            return Ok(Completion::InPlace);
        }
        if disposition != Disposition::Keep && self.is_leased(&worktree.name) {
            return Err(VcsError::WorktreeBusy(worktree.name.clone()));
        }

        info!(worktree = %worktree.name, disposition = disposition.as_str(), "Completing worktree");

        match disposition {
            Disposition::Keep => {
                self.records.touch(&worktree.name).await?;
                Ok(Completion::Kept)
            }
            Disposition::Discard => {
                self.vcs
                    .remove_worktree(&worktree.path, &worktree.branch)
                    .await?;
                self.records
                    .update_status(&worktree.name, WorktreeStatus::Discarded)
                    .await?;
                Ok(Completion::Discarded)
            }
            Disposition::Merge => {
                self.finalize(worktree).await?;
                let base = self.vcs.default_branch().await?;
                let message = format!("Merge {} into {}", worktree.branch, base);

                match self.vcs.merge(&worktree.branch, &base, &message).await? {
                    MergeOutcome::Merged => {
                        self.vcs
                            .remove_worktree(&worktree.path, &worktree.branch)
                            .await?;
                        self.records
                            .update_status(&worktree.name, WorktreeStatus::Merged)
                            .await?;
                        Ok(Completion::Merged)
                    }
                    MergeOutcome::Conflicted { paths } => {
                        let files: Vec<String> =
                            paths.iter().map(|p| p.display().to_string()).collect();
                        Err(VcsError::MergeConflict(format!(
                            "{} into {}: {}",
                            worktree.branch,
                            base,
                            files.join(", ")
                        )))
                    }
                }
            }
            Disposition::PullRequest => {
                let host = self.pr_host.as_ref().ok_or(VcsError::NoPullRequestHost)?;
                self.finalize(worktree).await?;
                self.vcs
                    .push(&worktree.path, &self.config.remote, &worktree.branch)
                    .await?;

                let base = self.vcs.default_branch().await?;
                let info = host
                    .open_pull_request(&PullRequest {
                        title: format!("conductor: {}", worktree.name),
                        body: format!(
                            "Changes for `{}` prepared in worktree `{}`.",
                            worktree.owner_id, worktree.name
                        ),
                        head: worktree.branch.clone(),
                        base,
                    })
                    .await?;

                self.records
                    .update_status(&worktree.name, WorktreeStatus::PullRequest)
                    .await?;
                info!(worktree = %worktree.name, url = %info.url, "Pull request opened");
                Ok(Completion::PullRequest(info))
            }
        }
    }

    async fn finalize(&self, worktree: &Worktree) -> Result<()> {
        if worktree.path.exists() {
            self.vcs
                .commit(&worktree.path, &format!("conductor: finalize {}", worktree.name))
                .await?;
        }
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<Worktree>> {
        Ok(self.records.find_all().await?)
    }

    pub async fn find(&self, name: &str) -> Result<Worktree> {
        self.records
            .find_by_name(name)
            .await?
            .ok_or_else(|| VcsError::WorktreeNotFound(name.to_string()))
    }

    /// Live worktree for a story, if one exists.
    pub async fn story_worktree(&self, story_id: &str) -> Result<Option<Worktree>> {
        Ok(self.records.find_live_by_owner(story_id).await?)
    }
}
