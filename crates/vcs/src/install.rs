//! Dependency installation for freshly created worktrees.
//!
//! The package manager is picked from marker files in the checkout. Failures
//! are reported and logged; they never fail worktree creation.

use std::path::Path;
use tokio::process::Command;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallStep {
    pub program: &'static str,
    pub args: &'static [&'static str],
}

impl InstallStep {
    const fn new(program: &'static str, args: &'static [&'static str]) -> Self {
        Self { program, args }
    }

    pub fn display(&self) -> String {
        std::iter::once(self.program)
            .chain(self.args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub command: String,
    pub success: bool,
}

/// Install steps for the ecosystems found at `dir`, one per ecosystem.
pub fn detect_install_steps(dir: &Path) -> Vec<InstallStep> {
    let has = |name: &str| dir.join(name).exists();
    let mut steps = Vec::new();

    if has("pnpm-lock.yaml") {
        steps.push(InstallStep::new("pnpm", &["install", "--frozen-lockfile"]));
    } else if has("yarn.lock") {
        steps.push(InstallStep::new("yarn", &["install", "--frozen-lockfile"]));
    } else if has("package-lock.json") {
        steps.push(InstallStep::new("npm", &["ci"]));
    } else if has("package.json") {
        steps.push(InstallStep::new("npm", &["install"]));
    }

    if has("Cargo.toml") {
        steps.push(InstallStep::new("cargo", &["fetch"]));
    }

    if has("poetry.lock") {
        steps.push(InstallStep::new("poetry", &["install"]));
    } else if has("requirements.txt") {
        steps.push(InstallStep::new("pip", &["install", "-r", "requirements.txt"]));
    }

    if has("go.mod") {
        steps.push(InstallStep::new("go", &["mod", "download"]));
    }

    if has("Gemfile") {
        steps.push(InstallStep::new("bundle", &["install"]));
    }

    steps
}

pub async fn install_dependencies(dir: &Path) -> Vec<InstallOutcome> {
    let mut outcomes = Vec::new();

    for step in detect_install_steps(dir) {
        let command = step.display();
        info!(dir = %dir.display(), %command, "Installing dependencies");

        let success = match Command::new(step.program)
            .args(step.args)
            .current_dir(dir)
            .output()
            .await
        {
            Ok(output) if output.status.success() => true,
            Ok(output) => {
                warn!(
                    %command,
                    code = ?output.status.code(),
                    stderr = %String::from_utf8_lossy(&output.stderr),
                    "Dependency install failed"
                );
                false
            }
            Err(e) => {
                warn!(%command, error = %e, "Dependency install could not start");
                false
            }
        };

        outcomes.push(InstallOutcome { command, success });
    }

    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &TempDir, name: &str) {
        std::fs::write(dir.path().join(name), "").unwrap();
    }

    #[test]
    fn test_no_markers() {
        let dir = TempDir::new().unwrap();
        assert!(detect_install_steps(dir.path()).is_empty());
    }

    #[test]
    fn test_lockfile_picks_package_manager() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "package.json");
        touch(&dir, "pnpm-lock.yaml");

        let steps = detect_install_steps(dir.path());
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].display(), "pnpm install --frozen-lockfile");
    }

    #[test]
    fn test_multiple_ecosystems() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "Cargo.toml");
        touch(&dir, "requirements.txt");
        touch(&dir, "go.mod");

        let programs: Vec<&str> = detect_install_steps(dir.path())
            .iter()
            .map(|s| s.program)
            .collect();
        assert_eq!(programs, vec!["cargo", "pip", "go"]);
    }

    #[tokio::test]
    async fn test_install_failure_is_reported_not_raised() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "Gemfile");

        // Whether or not bundler exists here, an empty Gemfile outside a
        // project never panics and always yields one outcome.
        let outcomes = install_dependencies(dir.path()).await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].command, "bundle install");
    }
}
