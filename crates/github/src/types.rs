use std::path::Path;

/// `owner/name` of a GitHub repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSlug {
    pub owner: String,
    pub name: String,
}

impl RepoSlug {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Parse `owner/name`.
    pub fn parse(slug: &str) -> Option<Self> {
        let (owner, name) = slug.trim().split_once('/')?;
        let name = name.strip_suffix(".git").unwrap_or(name);
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some(Self::new(owner, name))
    }

    /// Parse an ssh (`git@github.com:o/r.git`) or https remote URL.
    pub fn from_remote_url(url: &str) -> Option<Self> {
        let url = url.trim();
        let path = url
            .strip_prefix("git@github.com:")
            .or_else(|| url.strip_prefix("ssh://git@github.com/"))
            .or_else(|| url.strip_prefix("https://github.com/"))
            .or_else(|| url.strip_prefix("http://github.com/"))?;
        Self::parse(path.trim_end_matches('/'))
    }

    /// Read the `origin` remote of the checkout at `root`.
    pub async fn from_origin(root: &Path) -> Option<Self> {
        let output = tokio::process::Command::new("git")
            .args(["config", "--get", "remote.origin.url"])
            .current_dir(root)
            .output()
            .await
            .ok()?;
        if !output.status.success() {
            return None;
        }
        Self::from_remote_url(&String::from_utf8_lossy(&output.stdout))
    }
}

impl std::fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// A pull request conductor asked GitHub to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedPullRequest {
    pub number: u64,
    pub url: String,
    pub head: String,
    pub base: String,
}

impl From<OpenedPullRequest> for vcs::PullRequestInfo {
    fn from(pr: OpenedPullRequest) -> Self {
        Self {
            number: pr.number,
            url: pr.url,
        }
    }
}

/// Number at the end of a `.../pull/<n>` URL.
pub(crate) fn number_from_url(url: &str) -> Option<u64> {
    let (_, tail) = url.trim().trim_end_matches('/').rsplit_once("/pull/")?;
    tail.parse().ok()
}
