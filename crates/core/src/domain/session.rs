use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Operating mode of a session; decides which boundaries pause for a human.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    #[default]
    Supervised,
    SemiAuto,
    Autonomous,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Supervised => "supervised",
            Self::SemiAuto => "semi-auto",
            Self::Autonomous => "autonomous",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "supervised" => Some(Self::Supervised),
            "semi-auto" | "semi_auto" | "semiauto" => Some(Self::SemiAuto),
            "autonomous" | "auto" => Some(Self::Autonomous),
            _ => None,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Running,
    Paused,
    Stopped,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "paused" => Some(Self::Paused),
            "stopped" => Some(Self::Stopped),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub mode: Mode,
    pub status: SessionStatus,
    /// Structured pause summary, present while `status` is `paused`.
    pub pause_reason: Option<serde_json::Value>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(mode: Mode) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            mode,
            status: SessionStatus::Running,
            pause_reason: None,
            started_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionEventKind {
    Started,
    Resumed,
    ModeChanged,
    HookFired,
    CheckpointPaused,
    TaskCompleted,
    TaskBlocked,
    /// A story or epic became done.
    BoundaryReached,
    Stopped,
    Error,
}

impl SessionEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Resumed => "resumed",
            Self::ModeChanged => "mode_changed",
            Self::HookFired => "hook_fired",
            Self::CheckpointPaused => "checkpoint_paused",
            Self::TaskCompleted => "task_completed",
            Self::TaskBlocked => "task_blocked",
            Self::BoundaryReached => "boundary_reached",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "started" => Some(Self::Started),
            "resumed" => Some(Self::Resumed),
            "mode_changed" => Some(Self::ModeChanged),
            "hook_fired" => Some(Self::HookFired),
            "checkpoint_paused" => Some(Self::CheckpointPaused),
            "task_completed" => Some(Self::TaskCompleted),
            "task_blocked" => Some(Self::TaskBlocked),
            "boundary_reached" => Some(Self::BoundaryReached),
            "stopped" => Some(Self::Stopped),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// One entry of the append-only session log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub id: i64,
    pub session_id: Uuid,
    pub kind: SessionEventKind,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse_aliases() {
        assert_eq!(Mode::parse("semi-auto"), Some(Mode::SemiAuto));
        assert_eq!(Mode::parse("semi_auto"), Some(Mode::SemiAuto));
        assert_eq!(Mode::parse("auto"), Some(Mode::Autonomous));
        assert_eq!(Mode::parse("yolo"), None);
    }

    #[test]
    fn test_mode_serialization() {
        let json = serde_json::to_string(&Mode::SemiAuto).unwrap();
        assert_eq!(json, "\"semi-auto\"");
        assert_eq!(Mode::default(), Mode::Supervised);
    }

    #[test]
    fn test_new_session_is_running() {
        let session = Session::new(Mode::Autonomous);
        assert_eq!(session.status, SessionStatus::Running);
        assert!(session.pause_reason.is_none());
    }

    #[test]
    fn test_event_kind_round_trip_strings() {
        for kind in [
            SessionEventKind::Started,
            SessionEventKind::HookFired,
            SessionEventKind::CheckpointPaused,
            SessionEventKind::TaskCompleted,
            SessionEventKind::Error,
        ] {
            assert_eq!(SessionEventKind::parse(kind.as_str()), Some(kind));
        }
    }
}
