use conductor_core::CoreError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Story not found: {0}")]
    StoryNotFound(String),

    #[error("Epic not found: {0}")]
    EpicNotFound(String),

    #[error("Dependency not found: {blocker} -> {blocked}")]
    DependencyNotFound { blocked: String, blocker: String },

    #[error("Worktree not found: {0}")]
    WorktreeNotFound(String),

    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    /// A row holds a value this build cannot interpret.
    #[error("Corrupt {table} row {id}: {detail}")]
    Corrupt {
        table: &'static str,
        id: String,
        detail: String,
    },
}

impl DbError {
    pub(crate) fn corrupt(table: &'static str, id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Corrupt {
            table,
            id: id.into(),
            detail: detail.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::TaskNotFound(_)
                | Self::StoryNotFound(_)
                | Self::EpicNotFound(_)
                | Self::DependencyNotFound { .. }
                | Self::WorktreeNotFound(_)
                | Self::SessionNotFound(_)
                | Self::Core(CoreError::TaskNotFound(_))
        )
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
