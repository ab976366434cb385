//! Worktree isolation over git, plus the pull-request host seam.

pub mod error;
pub mod git;
pub mod install;
pub mod traits;
pub mod worktree;

pub use error::{Result, VcsError};
pub use git::GitVcs;
pub use install::{detect_install_steps, install_dependencies, InstallOutcome, InstallStep};
pub use traits::{
    MergeOutcome, PullRequest, PullRequestHost, PullRequestInfo, VersionControl, WorktreeEntry,
};
pub use worktree::{slugify, Completion, WorktreeConfig, WorktreeLease, WorktreeManager};
