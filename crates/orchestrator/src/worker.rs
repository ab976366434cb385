//! The seam between the orchestrator and whatever does the actual work.

use async_trait::async_trait;
use conductor_core::{Mode, Story, Task, Worktree};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{OrchestratorError, Result};

/// Everything a worker gets to know about the task it runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskContext {
    pub session_id: Uuid,
    pub mode: Mode,
    pub task: Task,
    pub story: Option<Story>,
    pub epic_id: Option<String>,
    pub worktree: Worktree,
}

impl TaskContext {
    pub fn workdir(&self) -> &std::path::Path {
        &self.worktree.path
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerStatus {
    Done,
    Failed,
    NeedsInput,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::Failed => "failed",
            Self::NeedsInput => "needs-input",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub status: WorkerStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub artifacts: Vec<String>,
}

impl TaskResult {
    pub fn done() -> Self {
        Self {
            status: WorkerStatus::Done,
            notes: None,
            artifacts: Vec::new(),
        }
    }

    pub fn failed(notes: impl Into<String>) -> Self {
        Self {
            status: WorkerStatus::Failed,
            notes: Some(notes.into()),
            artifacts: Vec::new(),
        }
    }

    pub fn needs_input(notes: impl Into<String>) -> Self {
        Self {
            status: WorkerStatus::NeedsInput,
            notes: Some(notes.into()),
            artifacts: Vec::new(),
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn is_done(&self) -> bool {
        self.status == WorkerStatus::Done
    }

    /// Human-readable block reason for a result that is not `done`.
    pub fn block_reason(&self) -> String {
        let label = match self.status {
            WorkerStatus::Done => "done",
            WorkerStatus::Failed => "worker failed",
            WorkerStatus::NeedsInput => "needs input",
        };
        match self.notes.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            Some(notes) => format!("{}: {}", label, notes),
            None => label.to_string(),
        }
    }
}

/// Executes one task inside its worktree.
///
/// An `Err` is an infrastructure failure (the worker could not run at
/// all); a task the worker ran but could not finish is an `Ok` result with
/// status `failed` or `needs-input`.
#[async_trait]
pub trait Worker: Send + Sync {
    async fn execute(&self, ctx: &TaskContext) -> Result<TaskResult>;
}

/// Runs a configured external command in the task's worktree.
///
/// Task variables are passed in the environment. If stdout carries a JSON
/// `TaskResult` (the whole output or its last non-empty line) it is used;
/// otherwise a zero exit status means `done` and anything else `failed`.
pub struct CommandWorker {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandWorker {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from a `[program, args...]` list as written in config.
    pub fn from_command(command: &[String]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| OrchestratorError::Config("worker.command is empty".to_string()))?;
        Ok(Self::new(program, args.to_vec()))
    }

    fn env(ctx: &TaskContext) -> Vec<(&'static str, String)> {
        let mut env = vec![
            ("CONDUCTOR_SESSION_ID", ctx.session_id.to_string()),
            ("SESSION_MODE", ctx.mode.as_str().to_string()),
            ("TASK_ID", ctx.task.id.clone()),
            ("TASK_TITLE", ctx.task.title.clone()),
            ("TASK_TYPE", ctx.task.task_type.as_str().to_string()),
            ("WORKTREE_PATH", ctx.worktree.path.display().to_string()),
            ("WORKTREE_BRANCH", ctx.worktree.branch.clone()),
        ];
        if let Some(notes) = &ctx.task.notes {
            env.push(("TASK_NOTES", notes.clone()));
        }
        if let Some(story) = &ctx.story {
            env.push(("STORY_ID", story.id.clone()));
            env.push(("STORY_TITLE", story.title.clone()));
        }
        if let Some(epic_id) = &ctx.epic_id {
            env.push(("EPIC_ID", epic_id.clone()));
        }
        env
    }
}

/// Parse a `TaskResult` from worker stdout.
pub fn parse_task_result(stdout: &str) -> Option<TaskResult> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(result) = serde_json::from_str(trimmed) {
        return Some(result);
    }
    trimmed
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .and_then(|line| serde_json::from_str(line).ok())
}

#[async_trait]
impl Worker for CommandWorker {
    async fn execute(&self, ctx: &TaskContext) -> Result<TaskResult> {
        debug!(
            task_id = %ctx.task.id,
            program = %self.program.display(),
            workdir = %ctx.workdir().display(),
            "Starting worker command"
        );

        let output = Command::new(&self.program)
            .args(&self.args)
            .envs(Self::env(ctx))
            .current_dir(ctx.workdir())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                OrchestratorError::worker_failure(
                    &ctx.task.id,
                    format!("could not start {}: {}", self.program.display(), e),
                )
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if let Some(result) = parse_task_result(&stdout) {
            return Ok(result);
        }

        if output.status.success() {
            let notes = stdout.trim();
            let result = TaskResult::done();
            return Ok(if notes.is_empty() {
                result
            } else {
                result.with_notes(notes)
            });
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(
            task_id = %ctx.task.id,
            code = ?output.status.code(),
            "Worker command failed"
        );
        let detail = stderr.trim();
        Ok(TaskResult::failed(if detail.is_empty() {
            format!("exit status {}", output.status)
        } else {
            detail.to_string()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_core::TaskType;
    use tempfile::TempDir;

    fn context(dir: &std::path::Path) -> TaskContext {
        let task = Task::new("Write docs", TaskType::Chore).with_id("t-1");
        TaskContext {
            session_id: Uuid::new_v4(),
            mode: Mode::Autonomous,
            worktree: Worktree::in_place("t-1", dir.to_path_buf(), "main"),
            task,
            story: None,
            epic_id: None,
        }
    }

    fn sh(script: &str) -> CommandWorker {
        CommandWorker::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    #[test]
    fn test_parse_task_result() {
        assert_eq!(
            parse_task_result(r#"{"status":"done","notes":"ok"}"#),
            Some(TaskResult::done().with_notes("ok"))
        );
        assert_eq!(
            parse_task_result("working...\n{\"status\":\"needs-input\",\"notes\":\"which db?\"}\n"),
            Some(TaskResult::needs_input("which db?"))
        );
        assert_eq!(parse_task_result("all good"), None);
        assert_eq!(parse_task_result(""), None);
    }

    #[test]
    fn test_block_reason() {
        assert_eq!(TaskResult::failed("tests red").block_reason(), "worker failed: tests red");
        assert_eq!(
            TaskResult {
                status: WorkerStatus::NeedsInput,
                notes: None,
                artifacts: Vec::new(),
            }
            .block_reason(),
            "needs input"
        );
    }

    #[test]
    fn test_from_command_rejects_empty() {
        assert!(CommandWorker::from_command(&[]).is_err());
        assert!(CommandWorker::from_command(&["claude".to_string()]).is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_status_decides_without_json() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path());

        let result = sh("echo \"finished $TASK_ID\"").execute(&ctx).await.unwrap();
        assert_eq!(result, TaskResult::done().with_notes("finished t-1"));

        let result = sh("echo boom >&2; exit 3").execute(&ctx).await.unwrap();
        assert_eq!(result, TaskResult::failed("boom"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_json_result_wins_over_exit_status() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path());

        let worker = sh(r#"echo '{"status":"needs-input","notes":"pick a license"}'; exit 1"#);
        let result = worker.execute(&ctx).await.unwrap();
        assert_eq!(result.status, WorkerStatus::NeedsInput);
        assert_eq!(result.notes.as_deref(), Some("pick a license"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runs_in_worktree() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path());

        sh("touch made-here").execute(&ctx).await.unwrap();
        assert!(dir.path().join("made-here").exists());
    }

    #[tokio::test]
    async fn test_missing_program_is_worker_failure() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path());
        let err = CommandWorker::new("/nonexistent/worker", Vec::new())
            .execute(&ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::WorkerFailure { .. }));
    }
}
