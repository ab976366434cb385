use conductor_core::{Task, TaskStatus, TaskType};
use std::collections::BTreeSet;

use super::{datetime_to_timestamp, timestamp_to_datetime};
use crate::error::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TaskRow {
    pub id: String,
    pub title: String,
    pub task_type: String,
    pub status: String,
    pub priority: i64,
    pub estimate_minutes: Option<i64>,
    pub story_id: Option<String>,
    pub blocked_reason: Option<String>,
    pub notes: Option<String>,
    pub archived: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TaskRow {
    pub const COLUMNS: &'static str = "id, title, task_type, status, priority, estimate_minutes, story_id, blocked_reason, notes, archived, created_at, updated_at";

    /// Dependencies live in their own table and are attached by the caller.
    pub fn into_domain(self, blocked_by: BTreeSet<String>) -> Result<Task, DbError> {
        let status = TaskStatus::parse(&self.status)
            .ok_or_else(|| DbError::corrupt("tasks", &self.id, format!("status '{}'", self.status)))?;
        let task_type = TaskType::parse(&self.task_type).ok_or_else(|| {
            DbError::corrupt("tasks", &self.id, format!("task_type '{}'", self.task_type))
        })?;

        Ok(Task {
            id: self.id,
            title: self.title,
            task_type,
            status,
            priority: self.priority as i32,
            estimate_minutes: self.estimate_minutes.map(|m| m.max(0) as u32),
            story_id: self.story_id,
            blocked_by,
            blocked_reason: self.blocked_reason,
            notes: self.notes,
            archived: self.archived,
            created_at: timestamp_to_datetime(self.created_at),
            updated_at: timestamp_to_datetime(self.updated_at),
        })
    }
}

impl From<&Task> for TaskRow {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            title: task.title.clone(),
            task_type: task.task_type.as_str().to_string(),
            status: task.status.as_str().to_string(),
            priority: i64::from(task.priority),
            estimate_minutes: task.estimate_minutes.map(i64::from),
            story_id: task.story_id.clone(),
            blocked_reason: task.blocked_reason.clone(),
            notes: task.notes.clone(),
            archived: task.archived,
            created_at: datetime_to_timestamp(task.created_at),
            updated_at: datetime_to_timestamp(task.updated_at),
        }
    }
}
