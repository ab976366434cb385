use crate::error::DbError;
use crate::models::{NewSessionEvent, SessionEventRow};
use chrono::Utc;
use conductor_core::SessionEvent;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Append-only access to `session_events`. There is deliberately no update
/// or delete.
#[derive(Clone)]
pub struct SessionEventRepository {
    pool: SqlitePool,
}

impl SessionEventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Returns the new event's id.
    pub async fn append(&self, event: &NewSessionEvent) -> Result<i64, DbError> {
        let result = sqlx::query(
            r#"
            INSERT INTO session_events (session_id, kind, payload, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(event.session_id.to_string())
        .bind(event.kind.as_str())
        .bind(event.payload.to_string())
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn find_by_session(&self, session_id: Uuid) -> Result<Vec<SessionEvent>, DbError> {
        self.find_by_session_since(session_id, 0).await
    }

    /// Events with id greater than `after_id`, oldest first.
    pub async fn find_by_session_since(
        &self,
        session_id: Uuid,
        after_id: i64,
    ) -> Result<Vec<SessionEvent>, DbError> {
        let rows: Vec<SessionEventRow> = sqlx::query_as(
            r#"
            SELECT id, session_id, kind, payload, created_at
            FROM session_events
            WHERE session_id = ? AND id > ?
            ORDER BY id ASC
            "#,
        )
        .bind(session_id.to_string())
        .bind(after_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SessionEventRow::into_domain).collect()
    }

    pub async fn count(&self, session_id: Uuid) -> Result<i64, DbError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM session_events WHERE session_id = ?")
                .bind(session_id.to_string())
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::setup_test_db;
    use crate::SessionRepository;
    use conductor_core::{Mode, Session, SessionEventKind};
    use serde_json::json;

    async fn setup() -> (SessionEventRepository, Uuid) {
        let pool = setup_test_db().await;
        let session = Session::new(Mode::Supervised);
        SessionRepository::new(pool.clone())
            .create(&session)
            .await
            .unwrap();
        (SessionEventRepository::new(pool), session.id)
    }

    #[tokio::test]
    async fn test_append_preserves_order() {
        let (repo, session_id) = setup().await;

        let kinds = [
            SessionEventKind::Started,
            SessionEventKind::HookFired,
            SessionEventKind::TaskCompleted,
            SessionEventKind::CheckpointPaused,
        ];
        let mut ids = Vec::new();
        for kind in kinds {
            ids.push(
                repo.append(&NewSessionEvent::new(session_id, kind, json!({})))
                    .await
                    .unwrap(),
            );
        }
        assert!(ids.windows(2).all(|w| w[0] < w[1]));

        let events = repo.find_by_session(session_id).await.unwrap();
        let read: Vec<SessionEventKind> = events.iter().map(|e| e.kind).collect();
        assert_eq!(read, kinds);
        assert_eq!(repo.count(session_id).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_find_since() {
        let (repo, session_id) = setup().await;

        let first = repo
            .append(&NewSessionEvent::new(
                session_id,
                SessionEventKind::Started,
                json!({ "mode": "supervised" }),
            ))
            .await
            .unwrap();
        repo.append(&NewSessionEvent::new(
            session_id,
            SessionEventKind::TaskCompleted,
            json!({ "task_id": "t1" }),
        ))
        .await
        .unwrap();

        let later = repo.find_by_session_since(session_id, first).await.unwrap();
        assert_eq!(later.len(), 1);
        assert_eq!(later[0].payload["task_id"], "t1");
    }
}
