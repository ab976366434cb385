use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{GitHubError, Result};
use crate::types::{number_from_url, OpenedPullRequest, RepoSlug};

/// Opens pull requests with the `gh` binary, so the user's existing
/// `gh auth login` is all the setup needed.
pub struct GhCli {
    root: PathBuf,
}

impl GhCli {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// True when `gh` is installed and logged in.
    pub async fn is_available() -> bool {
        Command::new("gh")
            .args(["auth", "status"])
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    async fn gh(&self, args: &[&str]) -> Result<String> {
        debug!(?args, "gh");
        let output = Command::new("gh")
            .args(args)
            .current_dir(&self.root)
            .output()
            .await?;
        if !output.status.success() {
            return Err(GitHubError::Gh {
                command: args.iter().take(2).copied().collect::<Vec<_>>().join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    pub async fn repo_slug(&self) -> Result<RepoSlug> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct View {
            name_with_owner: String,
        }

        let out = self.gh(&["repo", "view", "--json", "nameWithOwner"]).await?;
        let view: View = serde_json::from_str(&out)
            .map_err(|e| GitHubError::UnexpectedOutput(e.to_string()))?;
        RepoSlug::parse(&view.name_with_owner)
            .ok_or(GitHubError::UnexpectedOutput(view.name_with_owner))
    }

    pub async fn open(&self, pr: &vcs::PullRequest) -> Result<OpenedPullRequest> {
        info!(head = %pr.head, base = %pr.base, "Opening pull request with gh");
        let out = self
            .gh(&[
                "pr", "create", "--title", &pr.title, "--body", &pr.body, "--base", &pr.base,
                "--head", &pr.head,
            ])
            .await?;

        let url = last_url(&out).ok_or_else(|| GitHubError::UnexpectedOutput(out.trim().to_string()))?;
        Ok(OpenedPullRequest {
            number: number_from_url(url).unwrap_or_default(),
            url: url.to_string(),
            head: pr.head.clone(),
            base: pr.base.clone(),
        })
    }
}

/// `gh pr create` may print progress before the URL.
fn last_url(out: &str) -> Option<&str> {
    out.lines().map(str::trim).filter(|l| l.starts_with("https://")).last()
}

#[async_trait]
impl vcs::PullRequestHost for GhCli {
    async fn open_pull_request(&self, pr: &vcs::PullRequest) -> vcs::Result<vcs::PullRequestInfo> {
        Ok(self.open(pr).await?.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_url_skips_progress_lines() {
        let out = "Creating pull request for conductor/s-login into main\n\nhttps://github.com/acme/api/pull/42\n";
        assert_eq!(last_url(out), Some("https://github.com/acme/api/pull/42"));
        assert_eq!(last_url("warning: 1 uncommitted change\n"), None);
    }

    #[tokio::test]
    async fn test_gh_failure_surfaces_as_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let cli = GhCli::new(dir.path());
        // Either gh is missing (Io) or it fails outside a repository (Gh).
        assert!(cli.repo_slug().await.is_err());
    }
}
