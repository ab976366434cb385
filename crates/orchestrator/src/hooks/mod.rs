//! Lifecycle hooks.
//!
//! A hook point is a named moment in the session (`pre-task`, `post-story`,
//! ...). Configuration binds an ordered list of action names to each point;
//! the [`ActionRegistry`] maps names to runnable [`HookAction`]s. Actions
//! report `ok`, `warning`, or `critical`, and a critical result stops the
//! rest of that firing.

mod action;
pub mod builtin;
mod config;
mod engine;
mod script;

pub use action::{ActionRegistry, HookAction};
pub use builtin::builtin_registry;
pub use config::{
    default_timeout_secs, is_valid_action_name, ActionSpec, HookBindings, HookOverride,
    HooksConfig, OverrideMode,
};
pub use engine::{FireReport, HookEngine};
pub use script::{sanitize_env_value, ScriptAction};

use conductor_core::{Mode, Task};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookPoint {
    PreSession,
    PostSession,
    PreTask,
    PostTask,
    PostStory,
    PostEpic,
    OnBlocker,
    PreCommit,
}

impl HookPoint {
    pub const ALL: [HookPoint; 8] = [
        HookPoint::PreSession,
        HookPoint::PostSession,
        HookPoint::PreTask,
        HookPoint::PostTask,
        HookPoint::PostStory,
        HookPoint::PostEpic,
        HookPoint::OnBlocker,
        HookPoint::PreCommit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreSession => "pre-session",
            Self::PostSession => "post-session",
            Self::PreTask => "pre-task",
            Self::PostTask => "post-task",
            Self::PostStory => "post-story",
            Self::PostEpic => "post-epic",
            Self::OnBlocker => "on-blocker",
            Self::PreCommit => "pre-commit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == s)
    }
}

impl AsRef<str> for HookPoint {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl std::fmt::Display for HookPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "message", rename_all = "snake_case")]
pub enum ActionOutcome {
    Ok,
    Warning(String),
    Critical(String),
}

impl ActionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warning(_) => "warning",
            Self::Critical(_) => "critical",
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Ok => None,
            Self::Warning(m) | Self::Critical(m) => Some(m),
        }
    }

    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Critical(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub action: String,
    #[serde(flatten)]
    pub outcome: ActionOutcome,
}

/// Variables an action sees. Script actions receive them as environment
/// variables (see [`HookContext::env`]).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HookContext {
    pub task_id: Option<String>,
    pub task_title: Option<String>,
    pub task_type: Option<String>,
    pub task_notes: Option<String>,
    pub story_id: Option<String>,
    pub epic_id: Option<String>,
    /// `story` or `epic` for boundary hooks.
    pub boundary_type: Option<String>,
    pub session_mode: Option<Mode>,
    pub blocker_reason: Option<String>,
    /// Directory the task runs in; scripts use it as their working directory.
    pub workdir: Option<PathBuf>,
}

impl HookContext {
    pub fn session(mode: Mode) -> Self {
        Self {
            session_mode: Some(mode),
            ..Default::default()
        }
    }

    pub fn for_task(task: &Task, epic_id: Option<&str>, mode: Mode) -> Self {
        Self {
            task_id: Some(task.id.clone()),
            task_title: Some(task.title.clone()),
            task_type: Some(task.task_type.as_str().to_string()),
            task_notes: task.notes.clone(),
            story_id: task.story_id.clone(),
            epic_id: epic_id.map(str::to_string),
            session_mode: Some(mode),
            ..Default::default()
        }
    }

    pub fn with_boundary(mut self, boundary: &str) -> Self {
        self.boundary_type = Some(boundary.to_string());
        self
    }

    pub fn with_blocker_reason(mut self, reason: impl Into<String>) -> Self {
        self.blocker_reason = Some(reason.into());
        self
    }

    pub fn with_workdir(mut self, dir: PathBuf) -> Self {
        self.workdir = Some(dir);
        self
    }

    /// Set variables as `(NAME, value)` pairs; unset ones are omitted.
    pub fn env(&self) -> Vec<(&'static str, String)> {
        let vars = [
            ("TASK_ID", self.task_id.clone()),
            ("TASK_TITLE", self.task_title.clone()),
            ("TASK_TYPE", self.task_type.clone()),
            ("TASK_NOTES", self.task_notes.clone()),
            ("STORY_ID", self.story_id.clone()),
            ("EPIC_ID", self.epic_id.clone()),
            ("BOUNDARY_TYPE", self.boundary_type.clone()),
            ("SESSION_MODE", self.session_mode.map(|m| m.as_str().to_string())),
            ("BLOCKER_REASON", self.blocker_reason.clone()),
        ];
        vars.into_iter()
            .filter_map(|(name, value)| value.map(|v| (name, v)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_core::TaskType;

    #[test]
    fn test_hook_point_parse() {
        for point in HookPoint::ALL {
            assert_eq!(HookPoint::parse(point.as_str()), Some(point));
        }
        assert_eq!(HookPoint::parse("post-lunch"), None);
    }

    #[test]
    fn test_context_env_for_task() {
        let task = Task::new("Add login", TaskType::Feature)
            .with_id("t-1")
            .with_story("s-1");
        let ctx = HookContext::for_task(&task, Some("e-1"), Mode::SemiAuto).with_boundary("story");

        let env = ctx.env();
        assert!(env.contains(&("TASK_ID", "t-1".to_string())));
        assert!(env.contains(&("TASK_TYPE", "feature".to_string())));
        assert!(env.contains(&("EPIC_ID", "e-1".to_string())));
        assert!(env.contains(&("BOUNDARY_TYPE", "story".to_string())));
        assert!(env.contains(&("SESSION_MODE", "semi-auto".to_string())));
        assert!(!env.iter().any(|(name, _)| *name == "TASK_NOTES"));
    }

    #[test]
    fn test_action_result_serialization() {
        let result = ActionResult {
            action: "lint".to_string(),
            outcome: ActionOutcome::Critical("3 errors".to_string()),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["action"], "lint");
        assert_eq!(json["outcome"], "critical");
        assert_eq!(json["message"], "3 errors");
    }
}
