use crate::error::DbError;
use crate::models::TaskRow;
use crate::DependencyRepository;
use chrono::Utc;
use conductor_core::{Task, TaskStatus};
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct TaskRepository {
    pool: SqlitePool,
    dependencies: DependencyRepository,
}

impl TaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            dependencies: DependencyRepository::new(pool.clone()),
            pool,
        }
    }

    /// Insert the task row. Edges in `blocked_by` are not written here; the
    /// store adds them one at a time so each goes through the cycle check.
    pub async fn create(&self, task: &Task) -> Result<Task, DbError> {
        let row = TaskRow::from(task);

        sqlx::query(
            r#"
            INSERT INTO tasks (id, title, task_type, status, priority, estimate_minutes, story_id, blocked_reason, notes, archived, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.title)
        .bind(&row.task_type)
        .bind(&row.status)
        .bind(row.priority)
        .bind(row.estimate_minutes)
        .bind(&row.story_id)
        .bind(&row.blocked_reason)
        .bind(&row.notes)
        .bind(row.archived)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(task.clone())
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Task>, DbError> {
        let row: Option<TaskRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tasks WHERE id = ?",
            TaskRow::COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let blocked_by = self.dependencies.blockers_of(&row.id).await?;
                Ok(Some(row.into_domain(blocked_by)?))
            }
            None => Ok(None),
        }
    }

    pub async fn get(&self, id: &str) -> Result<Task, DbError> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| DbError::TaskNotFound(id.to_string()))
    }

    /// All tasks, archived included, in creation order.
    pub async fn find_all(&self) -> Result<Vec<Task>, DbError> {
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tasks ORDER BY rowid ASC",
            TaskRow::COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut blockers = self.dependencies.blockers_by_task().await?;
        rows.into_iter()
            .map(|row| {
                let blocked_by = blockers.remove(&row.id).unwrap_or_default();
                row.into_domain(blocked_by)
            })
            .collect()
    }

    pub async fn find_by_story(&self, story_id: &str) -> Result<Vec<Task>, DbError> {
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tasks WHERE story_id = ? ORDER BY rowid ASC",
            TaskRow::COLUMNS
        ))
        .bind(story_id)
        .fetch_all(&self.pool)
        .await?;

        let mut tasks = Vec::with_capacity(rows.len());
        for row in rows {
            let blocked_by = self.dependencies.blockers_of(&row.id).await?;
            tasks.push(row.into_domain(blocked_by)?);
        }
        Ok(tasks)
    }

    pub async fn find_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, DbError> {
        Ok(self
            .find_all()
            .await?
            .into_iter()
            .filter(|t| t.status == status && !t.archived)
            .collect())
    }

    /// Write a new status. `blocked_reason` is stored as given, so passing
    /// `None` clears any previous reason.
    pub async fn update_status(
        &self,
        id: &str,
        status: TaskStatus,
        blocked_reason: Option<&str>,
    ) -> Result<Task, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = ?, blocked_reason = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(blocked_reason)
        .bind(Utc::now().timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::TaskNotFound(id.to_string()));
        }

        self.get(id).await
    }

    /// Set `in_progress` only if the row is still `todo` and every blocker is
    /// `done`, evaluated by a single statement. Returns false when the guard
    /// did not hold.
    pub async fn start_if_unblocked(&self, id: &str) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'in_progress', blocked_reason = NULL, updated_at = ?
            WHERE id = ?
              AND status = 'todo'
              AND archived = 0
              AND NOT EXISTS (
                SELECT 1
                FROM task_dependencies d
                LEFT JOIN tasks b ON b.id = d.blocker_id
                WHERE d.blocked_id = tasks.id
                  AND (b.status IS NULL OR b.status != 'done')
              )
            "#,
        )
        .bind(Utc::now().timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_archived(&self, id: &str, archived: bool) -> Result<Task, DbError> {
        let result = sqlx::query("UPDATE tasks SET archived = ?, updated_at = ? WHERE id = ?")
            .bind(archived)
            .bind(Utc::now().timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::TaskNotFound(id.to_string()));
        }

        self.get(id).await
    }

    pub async fn set_notes(&self, id: &str, notes: Option<&str>) -> Result<(), DbError> {
        sqlx::query("UPDATE tasks SET notes = ?, updated_at = ? WHERE id = ?")
            .bind(notes)
            .bind(Utc::now().timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
