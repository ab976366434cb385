use conductor_core::{Epic, EpicPriority, RollupStatus};

use crate::error::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EpicRow {
    pub id: String,
    pub title: String,
    pub priority: String,
    pub status: String,
    pub created_at: i64,
}

impl EpicRow {
    pub fn into_domain(self, story_ids: Vec<String>) -> Result<Epic, DbError> {
        let priority = EpicPriority::parse(&self.priority)
            .ok_or_else(|| DbError::corrupt("epics", &self.id, format!("priority '{}'", self.priority)))?;
        let status = RollupStatus::parse(&self.status)
            .ok_or_else(|| DbError::corrupt("epics", &self.id, format!("status '{}'", self.status)))?;

        Ok(Epic {
            id: self.id,
            title: self.title,
            priority,
            story_ids,
            status,
        })
    }
}
