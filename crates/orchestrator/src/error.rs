use conductor_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Dependency {blocker} -> {blocked} would create a cycle")]
    Cycle { blocked: String, blocker: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Commit conflict in {worktree} after {attempts} rebase attempts: {detail}")]
    Conflict {
        worktree: String,
        attempts: u32,
        detail: String,
    },

    #[error("Task {task_id} timed out after {seconds}s")]
    Timeout { task_id: String, seconds: u64 },

    #[error("Hook {action} at {point} reported a critical failure: {message}")]
    HookCritical {
        point: String,
        action: String,
        message: String,
    },

    #[error("Worker failed on task {task_id}: {reason}")]
    WorkerFailure { task_id: String, reason: String },

    #[error("Session is paused; resume or stop it first")]
    SessionPaused,

    #[error("A session is running; change the mode after it pauses")]
    SessionRunning,

    #[error("No session to {0}")]
    NoSession(&'static str),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(db::DbError),

    #[error("VCS error: {0}")]
    Vcs(vcs::VcsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OrchestratorError {
    pub fn worker_failure(task_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::WorkerFailure {
            task_id: task_id.into(),
            reason: reason.into(),
        }
    }

    pub fn hook_critical(
        point: impl Into<String>,
        action: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::HookCritical {
            point: point.into(),
            action: action.into(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Store errors are split so callers can match cycles and missing records
/// without reaching into the db crate.
impl From<db::DbError> for OrchestratorError {
    fn from(err: db::DbError) -> Self {
        match err {
            db::DbError::Core(CoreError::CycleDetected { blocked, blocker }) => {
                Self::Cycle { blocked, blocker }
            }
            db::DbError::Core(CoreError::TaskNotFound(id)) => Self::NotFound(format!("task {}", id)),
            e if e.is_not_found() => Self::NotFound(e.to_string()),
            e => Self::Database(e),
        }
    }
}

impl From<vcs::VcsError> for OrchestratorError {
    fn from(err: vcs::VcsError) -> Self {
        match err {
            vcs::VcsError::Db(e) => e.into(),
            vcs::VcsError::WorktreeNotFound(name) => Self::NotFound(format!("worktree {}", name)),
            e => Self::Vcs(e),
        }
    }
}

impl From<toml::de::Error> for OrchestratorError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for OrchestratorError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
