use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{ActionOutcome, HookAction, HookContext};

/// Characters that would let a context value break out of a shell word.
const SHELL_METACHARACTERS: &[char] = &[';', '|', '&', '$', '`', '(', ')', '<', '>'];

/// Exit code a script uses to report a critical failure.
const CRITICAL_EXIT_CODE: i32 = 2;

/// Strip non-printable characters and refuse values carrying shell
/// metacharacters. The error names the variable and the offending
/// characters, never the value itself.
pub fn sanitize_env_value(name: &str, value: &str) -> Result<String, String> {
    let cleaned: String = value
        .chars()
        .filter(|c| !c.is_control() || *c == '\t')
        .collect();

    let found: BTreeSet<char> = cleaned
        .chars()
        .filter(|c| SHELL_METACHARACTERS.contains(c))
        .collect();
    if !found.is_empty() {
        let chars: Vec<String> = found.iter().map(|c| format!("'{}'", c)).collect();
        return Err(format!(
            "{} contains shell metacharacters: {}",
            name,
            chars.join(", ")
        ));
    }

    Ok(cleaned)
}

/// Runs `<actions_dir>/<name>.sh` through `sh` with the hook context in its
/// environment.
///
/// Exit 0 is ok, exit 2 is critical, anything else (including a timeout or
/// a missing, unreadable or unstartable script) is a warning.
pub struct ScriptAction {
    name: String,
    path: PathBuf,
    timeout: Duration,
}

impl ScriptAction {
    pub fn new(name: impl Into<String>, path: PathBuf, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            path,
            timeout,
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

fn tail(output: &[u8]) -> String {
    let text = String::from_utf8_lossy(output);
    let lines: Vec<&str> = text.trim().lines().collect();
    let start = lines.len().saturating_sub(5);
    lines[start..].join("\n")
}

#[async_trait]
impl HookAction for ScriptAction {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &HookContext) -> ActionOutcome {
        let mut env = Vec::new();
        for (key, value) in ctx.env() {
            match sanitize_env_value(key, &value) {
                Ok(clean) => env.push((key, clean)),
                Err(reason) => {
                    warn!(action = %self.name, %reason, "Refusing to run hook script");
                    return ActionOutcome::Warning(format!("not run: {}", reason));
                }
            }
        }

        // `sh` exits 2 when it cannot open its script, which would read as critical.
        let script = match &ctx.workdir {
            Some(dir) if self.path.is_relative() => dir.join(&self.path),
            _ => self.path.clone(),
        };
        let readable = match tokio::fs::metadata(&script).await {
            Ok(meta) if meta.is_file() => tokio::fs::File::open(&script).await.is_ok(),
            _ => false,
        };
        if !readable {
            warn!(action = %self.name, path = %script.display(), "Hook script missing or unreadable");
            return ActionOutcome::Warning(format!("script not found: {}", script.display()));
        }

        let mut command = Command::new("sh");
        command.arg(&self.path).envs(env).kill_on_drop(true);
        if let Some(dir) = &ctx.workdir {
            command.current_dir(dir);
        }

        debug!(action = %self.name, path = %self.path.display(), "Running hook script");
        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return ActionOutcome::Warning(format!("script could not start: {}", e));
            }
            Err(_) => {
                return ActionOutcome::Warning(format!("timed out after {:?}", self.timeout));
            }
        };

        let detail = {
            let stderr = tail(&output.stderr);
            if stderr.is_empty() {
                tail(&output.stdout)
            } else {
                stderr
            }
        };

        match output.status.code() {
            Some(0) => ActionOutcome::Ok,
            Some(CRITICAL_EXIT_CODE) => ActionOutcome::Critical(if detail.is_empty() {
                "script exited with 2".to_string()
            } else {
                detail
            }),
            code => ActionOutcome::Warning(format!(
                "script exited with {}{}",
                code.map_or_else(|| "signal".to_string(), |c| c.to_string()),
                if detail.is_empty() {
                    String::new()
                } else {
                    format!(": {}", detail)
                }
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_strips_non_printable() {
        assert_eq!(
            sanitize_env_value("TASK_TITLE", "Add\u{7} login\n page").unwrap(),
            "Add login page"
        );
        assert_eq!(sanitize_env_value("X", "a\tb").unwrap(), "a\tb");
    }

    #[test]
    fn test_sanitize_refuses_metacharacters() {
        let err = sanitize_env_value("TASK_NOTES", "ok; rm -rf / && echo $HOME").unwrap_err();
        assert!(err.starts_with("TASK_NOTES contains shell metacharacters"));
        assert!(err.contains("';'"));
        assert!(err.contains("'&'"));
        assert!(err.contains("'$'"));
        assert!(!err.contains("rm -rf"));
    }

    fn script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(format!("{}.sh", name));
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_codes_map_to_outcomes() {
        let dir = TempDir::new().unwrap();
        let ctx = HookContext::default();
        let timeout = Duration::from_secs(10);

        let ok = ScriptAction::new("ok", script(&dir, "ok", "exit 0"), timeout);
        assert_eq!(ok.run(&ctx).await, ActionOutcome::Ok);

        let critical = ScriptAction::new(
            "gate",
            script(&dir, "gate", "echo 'audit failed' >&2\nexit 2"),
            timeout,
        );
        assert_eq!(
            critical.run(&ctx).await,
            ActionOutcome::Critical("audit failed".to_string())
        );

        let warn = ScriptAction::new("warn", script(&dir, "warn", "exit 1"), timeout);
        assert_eq!(
            warn.run(&ctx).await,
            ActionOutcome::Warning("script exited with 1".to_string())
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_context_reaches_script_environment() {
        let dir = TempDir::new().unwrap();
        let action = ScriptAction::new(
            "check",
            script(&dir, "check", "[ \"$TASK_ID\" = \"t-9\" ] || exit 2"),
            Duration::from_secs(10),
        );

        let ctx = HookContext {
            task_id: Some("t-9".to_string()),
            ..Default::default()
        };
        assert_eq!(action.run(&ctx).await, ActionOutcome::Ok);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dangerous_context_is_not_run() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("ran");
        let action = ScriptAction::new(
            "touch",
            script(&dir, "touch", &format!("touch {}", marker.display())),
            Duration::from_secs(10),
        );

        let ctx = HookContext {
            task_title: Some("$(reboot)".to_string()),
            ..Default::default()
        };
        let outcome = action.run(&ctx).await;
        assert!(matches!(outcome, ActionOutcome::Warning(ref m) if m.contains("TASK_TITLE")));
        assert!(!marker.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_is_a_warning() {
        let dir = TempDir::new().unwrap();
        let action = ScriptAction::new(
            "slow",
            script(&dir, "slow", "sleep 5"),
            Duration::from_millis(100),
        );
        let outcome = action.run(&HookContext::default()).await;
        assert_eq!(outcome, ActionOutcome::Warning("timed out after 100ms".to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_script_is_a_warning() {
        let action = ScriptAction::new(
            "gone",
            PathBuf::from("/nonexistent/gone.sh"),
            Duration::from_secs(1),
        );
        match action.run(&HookContext::default()).await {
            ActionOutcome::Warning(message) => assert!(message.contains("script not found")),
            other => panic!("missing script must warn, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_directory_in_place_of_script_is_a_warning() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("lint.sh")).unwrap();

        let action = ScriptAction::new("lint", PathBuf::from("lint.sh"), Duration::from_secs(1));
        let ctx = HookContext::default().with_workdir(dir.path().to_path_buf());
        assert!(matches!(action.run(&ctx).await, ActionOutcome::Warning(_)));
    }
}
