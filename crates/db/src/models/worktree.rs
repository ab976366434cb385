use conductor_core::{Worktree, WorktreeScope, WorktreeStatus};
use std::path::PathBuf;

use super::{datetime_to_timestamp, timestamp_to_datetime};
use crate::error::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WorktreeRow {
    pub name: String,
    pub branch: String,
    pub owner_id: String,
    pub scope: String,
    pub path: String,
    pub isolated: bool,
    pub status: String,
    pub created_at: i64,
    pub last_activity_at: i64,
}

impl WorktreeRow {
    pub fn into_domain(self) -> Result<Worktree, DbError> {
        let scope = WorktreeScope::parse(&self.scope)
            .ok_or_else(|| DbError::corrupt("worktrees", &self.name, format!("scope '{}'", self.scope)))?;
        let status = WorktreeStatus::parse(&self.status)
            .ok_or_else(|| DbError::corrupt("worktrees", &self.name, format!("status '{}'", self.status)))?;

        Ok(Worktree {
            name: self.name,
            branch: self.branch,
            owner_id: self.owner_id,
            scope,
            path: PathBuf::from(self.path),
            isolated: self.isolated,
            status,
            created_at: timestamp_to_datetime(self.created_at),
            last_activity_at: timestamp_to_datetime(self.last_activity_at),
        })
    }
}

impl From<&Worktree> for WorktreeRow {
    fn from(wt: &Worktree) -> Self {
        Self {
            name: wt.name.clone(),
            branch: wt.branch.clone(),
            owner_id: wt.owner_id.clone(),
            scope: wt.scope.as_str().to_string(),
            path: wt.path.display().to_string(),
            isolated: wt.isolated,
            status: wt.status.as_str().to_string(),
            created_at: datetime_to_timestamp(wt.created_at),
            last_activity_at: datetime_to_timestamp(wt.last_activity_at),
        }
    }
}
