use crate::error::DbError;
use crate::models::StoryRow;
use chrono::Utc;
use conductor_core::{RollupStatus, Story};
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct StoryRepository {
    pool: SqlitePool,
}

impl StoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, story: &Story) -> Result<Story, DbError> {
        sqlx::query(
            r#"
            INSERT INTO stories (id, epic_id, title, status, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&story.id)
        .bind(&story.epic_id)
        .bind(&story.title)
        .bind(story.status.as_str())
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(story.clone())
    }

    async fn task_ids(&self, story_id: &str) -> Result<Vec<String>, DbError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT id FROM tasks WHERE story_id = ? ORDER BY rowid ASC")
                .bind(story_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Story>, DbError> {
        let row: Option<StoryRow> = sqlx::query_as(
            "SELECT id, epic_id, title, status, created_at FROM stories WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let task_ids = self.task_ids(&row.id).await?;
                Ok(Some(row.into_domain(task_ids)?))
            }
            None => Ok(None),
        }
    }

    pub async fn get(&self, id: &str) -> Result<Story, DbError> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| DbError::StoryNotFound(id.to_string()))
    }

    pub async fn find_all(&self) -> Result<Vec<Story>, DbError> {
        let rows: Vec<StoryRow> = sqlx::query_as(
            "SELECT id, epic_id, title, status, created_at FROM stories ORDER BY rowid ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let children: Vec<(String, String)> = sqlx::query_as(
            "SELECT story_id, id FROM tasks WHERE story_id IS NOT NULL ORDER BY rowid ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let task_ids = children
                    .iter()
                    .filter(|(story_id, _)| *story_id == row.id)
                    .map(|(_, id)| id.clone())
                    .collect();
                row.into_domain(task_ids)
            })
            .collect()
    }

    pub async fn update_status(&self, id: &str, status: RollupStatus) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE stories SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::StoryNotFound(id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::setup_test_db;
    use crate::{EpicRepository, TaskRepository};
    use conductor_core::{Epic, EpicPriority, Task, TaskType};

    #[tokio::test]
    async fn test_story_lists_tasks_in_order() {
        let pool = setup_test_db().await;
        EpicRepository::new(pool.clone())
            .create(&Epic::new("epic-1", "Auth", EpicPriority::P0))
            .await
            .unwrap();
        let stories = StoryRepository::new(pool.clone());
        stories
            .create(&Story::new("story-1", "epic-1", "Login"))
            .await
            .unwrap();

        let tasks = TaskRepository::new(pool);
        for id in ["t2", "t1"] {
            tasks
                .create(&Task::new(id, TaskType::Feature).with_id(id).with_story("story-1"))
                .await
                .unwrap();
        }

        let story = stories.get("story-1").await.unwrap();
        assert_eq!(story.task_ids, vec!["t2", "t1"]);
        assert_eq!(story.status, RollupStatus::Todo);

        let all = stories.find_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].task_ids.len(), 2);
    }

    #[tokio::test]
    async fn test_update_status() {
        let pool = setup_test_db().await;
        EpicRepository::new(pool.clone())
            .create(&Epic::new("epic-1", "Auth", EpicPriority::P1))
            .await
            .unwrap();
        let stories = StoryRepository::new(pool);
        stories
            .create(&Story::new("story-1", "epic-1", "Login"))
            .await
            .unwrap();

        stories
            .update_status("story-1", RollupStatus::Done)
            .await
            .unwrap();
        assert_eq!(stories.get("story-1").await.unwrap().status, RollupStatus::Done);

        let err = stories
            .update_status("missing", RollupStatus::Done)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::StoryNotFound(_)));
    }
}
