use thiserror::Error;

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("Command execution failed: {0}")]
    CommandFailed(String),

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Worktree not found: {0}")]
    WorktreeNotFound(String),

    #[error("Worktree already exists: {0}")]
    WorktreeAlreadyExists(String),

    #[error("Worktree {0} is in use by a running task")]
    WorktreeBusy(String),

    #[error("Invalid worktree path: {0}")]
    InvalidPath(String),

    #[error("Merge conflict: {0}")]
    MergeConflict(String),

    #[error("No pull request host configured")]
    NoPullRequestHost,

    #[error("Pull request failed: {0}")]
    PullRequest(String),

    #[error(transparent)]
    Db(#[from] db::DbError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VcsError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::MergeConflict(_))
    }
}

pub type Result<T> = std::result::Result<T, VcsError>;
