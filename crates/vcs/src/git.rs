use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Result, VcsError};
use crate::traits::{MergeOutcome, VersionControl, WorktreeEntry};

/// Stderr fragments git prints when a commit or rebase hits a conflict or
/// another writer holds the index.
const CONFLICT_MARKERS: &[&str] = &["CONFLICT", "conflict", "unmerged", "index.lock"];

pub struct GitVcs {
    repo_path: PathBuf,
    fallback_branch: String,
}

impl GitVcs {
    pub fn new(repo_path: PathBuf) -> Self {
        Self {
            repo_path,
            fallback_branch: "main".to_string(),
        }
    }

    /// Branch used when neither `origin/HEAD`, `main`, nor `master` resolve.
    pub fn with_fallback_branch(mut self, branch: impl Into<String>) -> Self {
        self.fallback_branch = branch.into();
        self
    }

    async fn run_git(&self, args: &[&str], cwd: &Path) -> Result<String> {
        debug!(?args, cwd = %cwd.display(), "Running git");

        let output = Command::new("git")
            .args(args)
            .current_dir(cwd)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => VcsError::CommandNotFound("git".to_string()),
                _ => VcsError::Io(e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let detail = format!("git {} failed: {}{}", args.join(" "), stderr, stdout);
            if CONFLICT_MARKERS
                .iter()
                .any(|m| stderr.contains(m) || stdout.contains(m))
            {
                return Err(VcsError::MergeConflict(detail));
            }
            return Err(VcsError::CommandFailed(detail));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn ref_exists(&self, reference: &str) -> bool {
        self.run_git(&["rev-parse", "--verify", "--quiet", reference], &self.repo_path)
            .await
            .is_ok()
    }

    async fn unmerged_paths(&self) -> Vec<PathBuf> {
        self.run_git(&["diff", "--name-only", "--diff-filter=U"], &self.repo_path)
            .await
            .map(|text| text.lines().filter(|l| !l.is_empty()).map(PathBuf::from).collect())
            .unwrap_or_default()
    }
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| VcsError::InvalidPath(path.display().to_string()))
}

/// Parse `git worktree list --porcelain`.
pub(crate) fn parse_worktree_list(output: &str) -> Vec<WorktreeEntry> {
    let mut entries = Vec::new();
    let mut current: Option<WorktreeEntry> = None;

    for line in output.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            if let Some(entry) = current.take() {
                entries.push(entry);
            }
            current = Some(WorktreeEntry {
                path: PathBuf::from(path),
                branch: None,
            });
        } else if let Some(branch) = line.strip_prefix("branch refs/heads/") {
            if let Some(entry) = current.as_mut() {
                entry.branch = Some(branch.to_string());
            }
        }
    }

    if let Some(entry) = current {
        entries.push(entry);
    }
    entries
}

#[async_trait]
impl VersionControl for GitVcs {
    fn name(&self) -> &'static str {
        "git"
    }

    fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    async fn default_branch(&self) -> Result<String> {
        if let Ok(head) = self
            .run_git(
                &["symbolic-ref", "--short", "refs/remotes/origin/HEAD"],
                &self.repo_path,
            )
            .await
        {
            let head = head.trim();
            if let Some(branch) = head.strip_prefix("origin/") {
                return Ok(branch.to_string());
            }
        }

        for candidate in ["main", "master"] {
            if self.ref_exists(&format!("refs/heads/{}", candidate)).await {
                return Ok(candidate.to_string());
            }
        }

        Ok(self.fallback_branch.clone())
    }

    async fn create_worktree(&self, branch: &str, path: &Path, base: &str) -> Result<()> {
        if path.exists() {
            return Err(VcsError::WorktreeAlreadyExists(path.display().to_string()));
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let target = path_str(path)?;
        if self.ref_exists(&format!("refs/heads/{}", branch)).await {
            self.run_git(&["worktree", "add", target, branch], &self.repo_path)
                .await?;
        } else {
            self.run_git(
                &["worktree", "add", "-b", branch, target, base],
                &self.repo_path,
            )
            .await?;
        }

        Ok(())
    }

    async fn remove_worktree(&self, path: &Path, branch: &str) -> Result<()> {
        if let Err(e) = self
            .run_git(&["worktree", "remove", "--force", path_str(path)?], &self.repo_path)
            .await
        {
            warn!(path = %path.display(), error = %e, "git worktree remove failed");
        }

        if let Err(e) = self
            .run_git(&["branch", "-D", branch], &self.repo_path)
            .await
        {
            warn!(branch, error = %e, "git branch delete failed");
        }

        if path.exists() {
            tokio::fs::remove_dir_all(path).await?;
        }
        let _ = self.run_git(&["worktree", "prune"], &self.repo_path).await;

        Ok(())
    }

    async fn commit(&self, path: &Path, message: &str) -> Result<Option<String>> {
        if !path.exists() {
            return Err(VcsError::WorktreeNotFound(path.display().to_string()));
        }
        if !self.has_uncommitted_changes(path).await? {
            return Ok(None);
        }

        self.run_git(&["add", "-A"], path).await?;
        self.run_git(&["commit", "-m", message], path).await?;

        let output = self.run_git(&["rev-parse", "HEAD"], path).await?;
        Ok(Some(output.trim().to_string()))
    }

    async fn rebase(&self, path: &Path, onto: &str) -> Result<()> {
        match self.run_git(&["rebase", "--autostash", onto], path).await {
            Ok(_) => Ok(()),
            Err(e) => {
                let _ = self.run_git(&["rebase", "--abort"], path).await;
                Err(e)
            }
        }
    }

    async fn merge(&self, branch: &str, into: &str, message: &str) -> Result<MergeOutcome> {
        self.run_git(&["checkout", into], &self.repo_path).await?;

        match self
            .run_git(&["merge", "--no-ff", branch, "-m", message], &self.repo_path)
            .await
        {
            Ok(_) => Ok(MergeOutcome::Merged),
            Err(e) => {
                warn!(branch, into, error = %e, "Merge failed");
                let paths = self.unmerged_paths().await;
                let _ = self.run_git(&["merge", "--abort"], &self.repo_path).await;
                if paths.is_empty() && !e.is_conflict() {
                    Err(e)
                } else {
                    Ok(MergeOutcome::Conflicted { paths })
                }
            }
        }
    }

    async fn push(&self, path: &Path, remote: &str, branch: &str) -> Result<()> {
        if !path.exists() {
            return Err(VcsError::WorktreeNotFound(path.display().to_string()));
        }

        self.run_git(&["push", "-u", remote, branch], path).await?;
        Ok(())
    }

    async fn list_worktrees(&self) -> Result<Vec<WorktreeEntry>> {
        let output = self
            .run_git(&["worktree", "list", "--porcelain"], &self.repo_path)
            .await?;
        Ok(parse_worktree_list(&output))
    }

    async fn has_uncommitted_changes(&self, path: &Path) -> Result<bool> {
        let status = self.run_git(&["status", "--porcelain"], path).await?;
        Ok(!status.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_fallback_branch() {
        let vcs = GitVcs::new(PathBuf::from("/repo")).with_fallback_branch("trunk");
        assert_eq!(vcs.fallback_branch, "trunk");
        assert_eq!(vcs.repo_path(), Path::new("/repo"));
    }

    #[test]
    fn test_parse_worktree_list() {
        let output = "\
worktree /repo
HEAD 1111111111111111111111111111111111111111
branch refs/heads/main

worktree /wt/story-1-login
HEAD 2222222222222222222222222222222222222222
branch refs/heads/conductor/story-1-login

worktree /wt/detached
HEAD 3333333333333333333333333333333333333333
detached
";
        let entries = parse_worktree_list(output);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].path, PathBuf::from("/wt/story-1-login"));
        assert_eq!(entries[1].branch.as_deref(), Some("conductor/story-1-login"));
        assert!(entries[2].branch.is_none());
    }
}
