use crate::error::DbError;
use crate::models::SessionRow;
use chrono::Utc;
use conductor_core::{Mode, Session, SessionStatus};
use sqlx::SqlitePool;
use uuid::Uuid;

const COLUMNS: &str = "id, mode, status, pause_reason, started_at, updated_at";

#[derive(Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, session: &Session) -> Result<Session, DbError> {
        let row = SessionRow::from(session);

        sqlx::query(
            r#"
            INSERT INTO sessions (id, mode, status, pause_reason, started_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.mode)
        .bind(&row.status)
        .bind(&row.pause_reason)
        .bind(row.started_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(session.clone())
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Session>, DbError> {
        let row: Option<SessionRow> =
            sqlx::query_as(&format!("SELECT {} FROM sessions WHERE id = ?", COLUMNS))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(|r| r.into_domain()).transpose()
    }

    pub async fn get(&self, id: Uuid) -> Result<Session, DbError> {
        self.find_by_id(id)
            .await?
            .ok_or(DbError::SessionNotFound(id))
    }

    /// Most recently started session, if any.
    pub async fn find_latest(&self) -> Result<Option<Session>, DbError> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM sessions ORDER BY started_at DESC, rowid DESC LIMIT 1",
            COLUMNS
        ))
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_domain()).transpose()
    }

    pub async fn update_status(
        &self,
        id: Uuid,
        status: SessionStatus,
        pause_reason: Option<&serde_json::Value>,
    ) -> Result<Session, DbError> {
        let result = sqlx::query(
            "UPDATE sessions SET status = ?, pause_reason = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(pause_reason.map(|v| v.to_string()))
        .bind(Utc::now().timestamp())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::SessionNotFound(id));
        }

        self.get(id).await
    }

    /// Like [`update_status`](Self::update_status), but only while the
    /// session is still `from`. Returns `None` when another writer moved it
    /// first.
    pub async fn transition(
        &self,
        id: Uuid,
        from: SessionStatus,
        to: SessionStatus,
        pause_reason: Option<&serde_json::Value>,
    ) -> Result<Option<Session>, DbError> {
        let result = sqlx::query(
            "UPDATE sessions SET status = ?, pause_reason = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(to.as_str())
        .bind(pause_reason.map(|v| v.to_string()))
        .bind(Utc::now().timestamp())
        .bind(id.to_string())
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get(id).await.map(Some)
    }

    pub async fn update_mode(&self, id: Uuid, mode: Mode) -> Result<Session, DbError> {
        let result = sqlx::query("UPDATE sessions SET mode = ?, updated_at = ? WHERE id = ?")
            .bind(mode.as_str())
            .bind(Utc::now().timestamp())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::SessionNotFound(id));
        }

        self.get(id).await
    }
}
