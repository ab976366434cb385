use crate::error::DbError;
use crate::models::EpicRow;
use chrono::Utc;
use conductor_core::{Epic, RollupStatus};
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct EpicRepository {
    pool: SqlitePool,
}

impl EpicRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, epic: &Epic) -> Result<Epic, DbError> {
        sqlx::query(
            r#"
            INSERT INTO epics (id, title, priority, status, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&epic.id)
        .bind(&epic.title)
        .bind(epic.priority.as_str())
        .bind(epic.status.as_str())
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(epic.clone())
    }

    async fn story_ids(&self, epic_id: &str) -> Result<Vec<String>, DbError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT id FROM stories WHERE epic_id = ? ORDER BY rowid ASC")
                .bind(epic_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Epic>, DbError> {
        let row: Option<EpicRow> = sqlx::query_as(
            "SELECT id, title, priority, status, created_at FROM epics WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let story_ids = self.story_ids(&row.id).await?;
                Ok(Some(row.into_domain(story_ids)?))
            }
            None => Ok(None),
        }
    }

    pub async fn get(&self, id: &str) -> Result<Epic, DbError> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| DbError::EpicNotFound(id.to_string()))
    }

    pub async fn find_all(&self) -> Result<Vec<Epic>, DbError> {
        let rows: Vec<EpicRow> = sqlx::query_as(
            "SELECT id, title, priority, status, created_at FROM epics ORDER BY rowid ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut epics = Vec::with_capacity(rows.len());
        for row in rows {
            let story_ids = self.story_ids(&row.id).await?;
            epics.push(row.into_domain(story_ids)?);
        }
        Ok(epics)
    }

    pub async fn update_status(&self, id: &str, status: RollupStatus) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE epics SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::EpicNotFound(id.to_string()));
        }
        Ok(())
    }
}
