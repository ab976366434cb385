use conductor_core::{Mode, Session, SessionStatus};
use uuid::Uuid;

use super::{datetime_to_timestamp, timestamp_to_datetime};
use crate::error::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionRow {
    pub id: String,
    pub mode: String,
    pub status: String,
    pub pause_reason: Option<String>,
    pub started_at: i64,
    pub updated_at: i64,
}

impl SessionRow {
    pub fn into_domain(self) -> Result<Session, DbError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| DbError::corrupt("sessions", &self.id, e.to_string()))?;
        let mode = Mode::parse(&self.mode)
            .ok_or_else(|| DbError::corrupt("sessions", &self.id, format!("mode '{}'", self.mode)))?;
        let status = SessionStatus::parse(&self.status)
            .ok_or_else(|| DbError::corrupt("sessions", &self.id, format!("status '{}'", self.status)))?;

        Ok(Session {
            id,
            mode,
            status,
            pause_reason: self
                .pause_reason
                .and_then(|raw| serde_json::from_str(&raw).ok()),
            started_at: timestamp_to_datetime(self.started_at),
            updated_at: timestamp_to_datetime(self.updated_at),
        })
    }
}

impl From<&Session> for SessionRow {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.to_string(),
            mode: session.mode.as_str().to_string(),
            status: session.status.as_str().to_string(),
            pause_reason: session.pause_reason.as_ref().map(|v| v.to_string()),
            started_at: datetime_to_timestamp(session.started_at),
            updated_at: datetime_to_timestamp(session.updated_at),
        }
    }
}
