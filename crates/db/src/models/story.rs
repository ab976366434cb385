use conductor_core::{RollupStatus, Story};

use crate::error::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoryRow {
    pub id: String,
    pub epic_id: String,
    pub title: String,
    pub status: String,
    pub created_at: i64,
}

impl StoryRow {
    pub fn into_domain(self, task_ids: Vec<String>) -> Result<Story, DbError> {
        let status = RollupStatus::parse(&self.status)
            .ok_or_else(|| DbError::corrupt("stories", &self.id, format!("status '{}'", self.status)))?;

        Ok(Story {
            id: self.id,
            epic_id: self.epic_id,
            title: self.title,
            task_ids,
            status,
        })
    }
}
