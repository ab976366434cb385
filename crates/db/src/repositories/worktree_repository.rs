use crate::error::DbError;
use crate::models::WorktreeRow;
use chrono::Utc;
use conductor_core::{Worktree, WorktreeStatus};
use sqlx::SqlitePool;

const COLUMNS: &str =
    "name, branch, owner_id, scope, path, isolated, status, created_at, last_activity_at";

#[derive(Clone)]
pub struct WorktreeRepository {
    pool: SqlitePool,
}

impl WorktreeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace by name.
    pub async fn upsert(&self, worktree: &Worktree) -> Result<Worktree, DbError> {
        let row = WorktreeRow::from(worktree);

        sqlx::query(
            r#"
            INSERT INTO worktrees (name, branch, owner_id, scope, path, isolated, status, created_at, last_activity_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                branch = excluded.branch,
                owner_id = excluded.owner_id,
                scope = excluded.scope,
                path = excluded.path,
                isolated = excluded.isolated,
                status = excluded.status,
                last_activity_at = excluded.last_activity_at
            "#,
        )
        .bind(&row.name)
        .bind(&row.branch)
        .bind(&row.owner_id)
        .bind(&row.scope)
        .bind(&row.path)
        .bind(row.isolated)
        .bind(&row.status)
        .bind(row.created_at)
        .bind(row.last_activity_at)
        .execute(&self.pool)
        .await?;

        Ok(worktree.clone())
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<Worktree>, DbError> {
        let row: Option<WorktreeRow> =
            sqlx::query_as(&format!("SELECT {} FROM worktrees WHERE name = ?", COLUMNS))
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;

        row.map(WorktreeRow::into_domain).transpose()
    }

    /// The active worktree owned by a task or story, if one exists.
    pub async fn find_live_by_owner(&self, owner_id: &str) -> Result<Option<Worktree>, DbError> {
        let row: Option<WorktreeRow> = sqlx::query_as(&format!(
            "SELECT {} FROM worktrees WHERE owner_id = ? AND status = 'active' ORDER BY rowid DESC LIMIT 1",
            COLUMNS
        ))
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(WorktreeRow::into_domain).transpose()
    }

    pub async fn find_all(&self) -> Result<Vec<Worktree>, DbError> {
        let rows: Vec<WorktreeRow> =
            sqlx::query_as(&format!("SELECT {} FROM worktrees ORDER BY rowid ASC", COLUMNS))
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(WorktreeRow::into_domain).collect()
    }

    pub async fn update_status(&self, name: &str, status: WorktreeStatus) -> Result<(), DbError> {
        let result = sqlx::query(
            "UPDATE worktrees SET status = ?, last_activity_at = ? WHERE name = ?",
        )
        .bind(status.as_str())
        .bind(Utc::now().timestamp())
        .bind(name)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::WorktreeNotFound(name.to_string()));
        }
        Ok(())
    }

    pub async fn touch(&self, name: &str) -> Result<(), DbError> {
        sqlx::query("UPDATE worktrees SET last_activity_at = ? WHERE name = ?")
            .bind(Utc::now().timestamp())
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Isolation decision recorded for a story, if any.
    pub async fn story_isolation(&self, story_id: &str) -> Result<Option<bool>, DbError> {
        let row: Option<(bool,)> =
            sqlx::query_as("SELECT isolate FROM story_isolation WHERE story_id = ?")
                .bind(story_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(isolate,)| isolate))
    }

    /// Record the first decision for a story and return whichever decision
    /// is now stored. Later calls never overwrite it.
    pub async fn record_story_isolation(&self, story_id: &str, isolate: bool) -> Result<bool, DbError> {
        sqlx::query(
            "INSERT OR IGNORE INTO story_isolation (story_id, isolate, decided_at) VALUES (?, ?, ?)",
        )
        .bind(story_id)
        .bind(isolate)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(self.story_isolation(story_id).await?.unwrap_or(isolate))
    }
}
