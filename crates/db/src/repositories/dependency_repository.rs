use chrono::Utc;
use conductor_core::{edges_would_create_cycle, CoreError};
use sqlx::SqlitePool;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::error::DbError;

/// Edges of the task graph, stored as `(blocker_id, blocked_id)` rows.
#[derive(Clone)]
pub struct DependencyRepository {
    pool: SqlitePool,
}

impl DependencyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All edges as `(blocker, blocked)` pairs.
    pub async fn find_all(&self) -> Result<Vec<(String, String)>, DbError> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT blocker_id, blocked_id
            FROM task_dependencies
            ORDER BY created_at ASC, blocker_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Blockers grouped by the task they block.
    pub async fn blockers_by_task(&self) -> Result<HashMap<String, BTreeSet<String>>, DbError> {
        let mut map: HashMap<String, BTreeSet<String>> = HashMap::new();
        for (blocker, blocked) in self.find_all().await? {
            map.entry(blocked).or_default().insert(blocker);
        }
        Ok(map)
    }

    pub async fn blockers_of(&self, task_id: &str) -> Result<BTreeSet<String>, DbError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT blocker_id FROM task_dependencies WHERE blocked_id = ?")
                .bind(task_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn exists(&self, blocked: &str, blocker: &str) -> Result<bool, DbError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM task_dependencies WHERE blocker_id = ? AND blocked_id = ?",
        )
        .bind(blocker)
        .bind(blocked)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    /// Insert `blocker -> blocked` unless it would close a cycle.
    ///
    /// The edge table is read and written inside one transaction so a
    /// concurrent writer cannot slip a cycle in between the check and the
    /// insert. A rejected edge leaves the table untouched. Re-adding an
    /// existing edge is a no-op.
    pub async fn insert_acyclic(&self, blocked: &str, blocker: &str) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        let edges: Vec<(String, String)> =
            sqlx::query_as("SELECT blocker_id, blocked_id FROM task_dependencies")
                .fetch_all(&mut *tx)
                .await?;

        if edges.iter().any(|(b, d)| b == blocker && d == blocked) {
            debug!(blocked, blocker, "Dependency already present");
            return Ok(());
        }

        if edges_would_create_cycle(&edges, blocked, blocker) {
            return Err(CoreError::CycleDetected {
                blocked: blocked.to_string(),
                blocker: blocker.to_string(),
            }
            .into());
        }

        sqlx::query(
            "INSERT INTO task_dependencies (blocker_id, blocked_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(blocker)
        .bind(blocked)
        .bind(Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn delete(&self, blocked: &str, blocker: &str) -> Result<(), DbError> {
        let result =
            sqlx::query("DELETE FROM task_dependencies WHERE blocker_id = ? AND blocked_id = ?")
                .bind(blocker)
                .bind(blocked)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::DependencyNotFound {
                blocked: blocked.to_string(),
                blocker: blocker.to_string(),
            });
        }

        Ok(())
    }
}
