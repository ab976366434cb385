//! Opens pull requests on GitHub, through either the `gh` CLI or the REST API.

pub mod client;
pub mod error;
pub mod gh_cli;
pub mod types;

pub use client::GitHubClient;
pub use error::{GitHubError, Result};
pub use gh_cli::GhCli;
pub use types::{OpenedPullRequest, RepoSlug};
