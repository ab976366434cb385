use async_trait::async_trait;
use octocrab::Octocrab;
use tracing::info;

use crate::error::{GitHubError, Result};
use crate::types::{OpenedPullRequest, RepoSlug};

/// Opens pull requests through the REST API with a personal token.
pub struct GitHubClient {
    api: Octocrab,
    repo: RepoSlug,
}

impl GitHubClient {
    pub fn with_token(token: impl Into<String>, repo: RepoSlug) -> Result<Self> {
        let token: String = token.into();
        let api = Octocrab::builder().personal_token(token).build()?;
        Ok(Self { api, repo })
    }

    /// Token from `GITHUB_TOKEN`.
    pub fn from_env(repo: RepoSlug) -> Result<Self> {
        match std::env::var("GITHUB_TOKEN") {
            Ok(token) if !token.is_empty() => Self::with_token(token, repo),
            _ => Err(GitHubError::MissingToken),
        }
    }

    pub fn repo(&self) -> &RepoSlug {
        &self.repo
    }

    pub async fn open(&self, pr: &vcs::PullRequest) -> Result<OpenedPullRequest> {
        info!(repo = %self.repo, head = %pr.head, base = %pr.base, "Opening pull request");
        let created = self
            .api
            .pulls(&self.repo.owner, &self.repo.name)
            .create(&pr.title, &pr.head, &pr.base)
            .body(&pr.body)
            .send()
            .await?;

        Ok(OpenedPullRequest {
            number: created.number,
            url: created.html_url.map(|u| u.to_string()).unwrap_or_default(),
            head: created.head.ref_field,
            base: created.base.ref_field,
        })
    }
}

#[async_trait]
impl vcs::PullRequestHost for GitHubClient {
    async fn open_pull_request(&self, pr: &vcs::PullRequest) -> vcs::Result<vcs::PullRequestInfo> {
        Ok(self.open(pr).await?.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_token_is_reported() {
        if std::env::var("GITHUB_TOKEN").map(|t| !t.is_empty()).unwrap_or(false) {
            return;
        }
        let err = GitHubClient::from_env(RepoSlug::new("acme", "api")).err().unwrap();
        assert!(matches!(err, GitHubError::MissingToken));
        assert!(err.to_string().contains("GITHUB_TOKEN"));
    }

    #[test]
    fn test_host_error_becomes_vcs_error() {
        let err: vcs::VcsError = GitHubError::RateLimited.into();
        assert!(err.to_string().contains("rate limit"));
    }
}
