use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GITHUB_TOKEN is not set")]
    MissingToken,

    #[error("Could not determine the GitHub repository for {0}")]
    UnknownRepository(String),

    #[error("GitHub rejected the request: {0}")]
    Rejected(String),

    #[error("GitHub rate limit hit")]
    RateLimited,

    #[error("`gh {command}` failed: {stderr}")]
    Gh { command: String, stderr: String },

    #[error("Unexpected output from gh: {0}")]
    UnexpectedOutput(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<octocrab::Error> for GitHubError {
    fn from(err: octocrab::Error) -> Self {
        match err {
            octocrab::Error::GitHub { source, .. } if source.message.contains("rate limit") => {
                GitHubError::RateLimited
            }
            octocrab::Error::GitHub { source, .. } => GitHubError::Rejected(source.message),
            other => GitHubError::Rejected(other.to_string()),
        }
    }
}

impl From<GitHubError> for vcs::VcsError {
    fn from(err: GitHubError) -> Self {
        vcs::VcsError::PullRequest(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GitHubError>;
