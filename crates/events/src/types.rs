use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping all events with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event: Event,
}

impl EventEnvelope {
    pub fn new(event: Event) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    #[serde(rename = "session.started")]
    SessionStarted { session_id: Uuid, mode: String },

    #[serde(rename = "session.paused")]
    SessionPaused {
        session_id: Uuid,
        reason: serde_json::Value,
    },

    #[serde(rename = "session.resumed")]
    SessionResumed { session_id: Uuid },

    #[serde(rename = "session.finished")]
    SessionFinished { session_id: Uuid, status: String },

    /// A dispatch cycle selected these tasks.
    #[serde(rename = "cycle.started")]
    CycleStarted {
        session_id: Uuid,
        task_ids: Vec<String>,
    },

    #[serde(rename = "task.status_changed")]
    TaskStatusChanged {
        task_id: String,
        from_status: String,
        to_status: String,
    },

    #[serde(rename = "task.blocked")]
    TaskBlocked { task_id: String, reason: String },

    #[serde(rename = "worktree.prepared")]
    WorktreePrepared {
        task_id: String,
        worktree: String,
        isolated: bool,
    },

    #[serde(rename = "worktree.completed")]
    WorktreeCompleted {
        worktree: String,
        disposition: String,
    },

    #[serde(rename = "hook.fired")]
    HookFired {
        point: String,
        action: String,
        outcome: String,
        message: Option<String>,
    },

    #[serde(rename = "error")]
    Error {
        message: String,
        context: Option<String>,
    },
}

impl Event {
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Event::TaskStatusChanged { task_id, .. }
            | Event::TaskBlocked { task_id, .. }
            | Event::WorktreePrepared { task_id, .. } => Some(task_id),
            _ => None,
        }
    }

    pub fn session_id(&self) -> Option<Uuid> {
        match self {
            Event::SessionStarted { session_id, .. }
            | Event::SessionPaused { session_id, .. }
            | Event::SessionResumed { session_id }
            | Event::SessionFinished { session_id, .. }
            | Event::CycleStarted { session_id, .. } => Some(*session_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_envelope_creation() {
        let envelope = EventEnvelope::new(Event::TaskBlocked {
            task_id: "task-1".to_string(),
            reason: "timeout".to_string(),
        });

        assert!(!envelope.id.is_nil());
        assert!(envelope.timestamp <= Utc::now());
    }

    #[test]
    fn test_event_serialization() {
        let event = Event::TaskStatusChanged {
            task_id: "task-1".to_string(),
            from_status: "todo".to_string(),
            to_status: "in_progress".to_string(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("task.status_changed"));
        assert!(json.contains("from_status"));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"hook.fired","point":"post-task","action":"lint","outcome":"warning","message":null}"#;
        let event: Event = serde_json::from_str(json).unwrap();

        match event {
            Event::HookFired { point, outcome, .. } => {
                assert_eq!(point, "post-task");
                assert_eq!(outcome, "warning");
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_event_ids() {
        let session_id = Uuid::new_v4();
        let event = Event::CycleStarted {
            session_id,
            task_ids: vec!["a".to_string()],
        };
        assert_eq!(event.session_id(), Some(session_id));
        assert_eq!(event.task_id(), None);

        let event = Event::WorktreePrepared {
            task_id: "a".to_string(),
            worktree: "a-login".to_string(),
            isolated: true,
        };
        assert_eq!(event.task_id(), Some("a"));
    }
}
