use conductor_core::{SessionEvent, SessionEventKind};
use uuid::Uuid;

use super::timestamp_to_datetime;
use crate::error::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionEventRow {
    pub id: i64,
    pub session_id: String,
    pub kind: String,
    pub payload: String,
    pub created_at: i64,
}

impl SessionEventRow {
    pub fn into_domain(self) -> Result<SessionEvent, DbError> {
        let session_id = Uuid::parse_str(&self.session_id)
            .map_err(|e| DbError::corrupt("session_events", self.id.to_string(), e.to_string()))?;
        let kind = SessionEventKind::parse(&self.kind).ok_or_else(|| {
            DbError::corrupt("session_events", self.id.to_string(), format!("kind '{}'", self.kind))
        })?;

        Ok(SessionEvent {
            id: self.id,
            session_id,
            kind,
            payload: serde_json::from_str(&self.payload).unwrap_or(serde_json::Value::Null),
            created_at: timestamp_to_datetime(self.created_at),
        })
    }
}

/// Input for appending a new event
#[derive(Debug, Clone)]
pub struct NewSessionEvent {
    pub session_id: Uuid,
    pub kind: SessionEventKind,
    pub payload: serde_json::Value,
}

impl NewSessionEvent {
    pub fn new(session_id: Uuid, kind: SessionEventKind, payload: serde_json::Value) -> Self {
        Self {
            session_id,
            kind,
            payload,
        }
    }
}
