use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorktreeScope {
    Task,
    Story,
}

impl WorktreeScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Story => "story",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "task" => Some(Self::Task),
            "story" => Some(Self::Story),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorktreeStatus {
    #[default]
    Active,
    Merged,
    PullRequest,
    Discarded,
}

impl WorktreeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Merged => "merged",
            Self::PullRequest => "pull_request",
            Self::Discarded => "discarded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "merged" => Some(Self::Merged),
            "pull_request" => Some(Self::PullRequest),
            "discarded" => Some(Self::Discarded),
            _ => None,
        }
    }

    /// A live worktree may still be handed to new tasks.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Outcome chosen for a worktree once its task or story is finished.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Disposition {
    Merge,
    PullRequest,
    Keep,
    Discard,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::PullRequest => "pull-request",
            Self::Keep => "keep",
            Self::Discard => "discard",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "merge" => Some(Self::Merge),
            "pull-request" | "pr" => Some(Self::PullRequest),
            "keep" => Some(Self::Keep),
            "discard" => Some(Self::Discard),
            _ => None,
        }
    }
}

/// Caller override of the isolation policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum IsolationOverride {
    AlwaysIsolate,
    NeverIsolate,
}

impl IsolationOverride {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "always" | "always-isolate" => Some(Self::AlwaysIsolate),
            "never" | "never-isolate" => Some(Self::NeverIsolate),
            _ => None,
        }
    }
}

/// A branch-bound checkout used to run one task or one story's tasks.
///
/// When `isolated` is false the record points at the main checkout and
/// nothing is committed on the task's behalf.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Worktree {
    pub name: String,
    pub branch: String,
    pub owner_id: String,
    pub scope: WorktreeScope,
    pub path: PathBuf,
    pub isolated: bool,
    pub status: WorktreeStatus,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl Worktree {
    pub fn new(
        name: impl Into<String>,
        branch: impl Into<String>,
        owner_id: impl Into<String>,
        scope: WorktreeScope,
        path: PathBuf,
    ) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            branch: branch.into(),
            owner_id: owner_id.into(),
            scope,
            path,
            isolated: true,
            status: WorktreeStatus::Active,
            created_at: now,
            last_activity_at: now,
        }
    }

    /// Placement in the main checkout for tasks that opt out of isolation.
    pub fn in_place(owner_id: impl Into<String>, repo_path: PathBuf, branch: impl Into<String>) -> Self {
        let owner_id = owner_id.into();
        let mut worktree = Self::new(
            format!("{}-in-place", owner_id),
            branch,
            owner_id,
            WorktreeScope::Task,
            repo_path,
        );
        worktree.isolated = false;
        worktree
    }
}
