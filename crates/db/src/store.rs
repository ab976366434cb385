use conductor_core::{
    CoreError, DependencyGraph, Epic, RollupStatus, Story, Task, TaskStateMachine, TaskStatus,
};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, Result};
use crate::repositories::{
    DependencyRepository, EpicRepository, SessionEventRepository, SessionRepository,
    StoryRepository, TaskRepository, WorktreeRepository,
};

/// Point-in-time copy of the work breakdown, read at the start of a cycle.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Creation order.
    pub tasks: Vec<Task>,
    pub stories: Vec<Story>,
    pub epics: Vec<Epic>,
}

impl Snapshot {
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn story(&self, id: &str) -> Option<&Story> {
        self.stories.iter().find(|s| s.id == id)
    }

    pub fn epic(&self, id: &str) -> Option<&Epic> {
        self.epics.iter().find(|e| e.id == id)
    }

    /// Epic id of the story the task belongs to.
    pub fn epic_of(&self, task: &Task) -> Option<&str> {
        task.story_id
            .as_deref()
            .and_then(|sid| self.story(sid))
            .map(|s| s.epic_id.as_str())
    }

    pub fn ready(&self) -> Vec<&Task> {
        DependencyGraph::new(&self.tasks).ready()
    }

    pub fn count_by_status(&self, status: TaskStatus) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == status && !t.archived)
            .count()
    }
}

/// Story and epic ids whose derived status just became `done`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Boundaries {
    pub story_completed: Option<String>,
    pub epic_completed: Option<String>,
}

/// Task-graph facade over the repositories.
///
/// Every status change goes through [`TaskStateMachine`], and the move to
/// `in_progress` is guarded in SQL so it cannot race a blocker reopening.
#[derive(Clone)]
pub struct TaskStore {
    pool: SqlitePool,
    tasks: TaskRepository,
    stories: StoryRepository,
    epics: EpicRepository,
    dependencies: DependencyRepository,
    sessions: SessionRepository,
    events: SessionEventRepository,
    worktrees: WorktreeRepository,
}

impl TaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            tasks: TaskRepository::new(pool.clone()),
            stories: StoryRepository::new(pool.clone()),
            epics: EpicRepository::new(pool.clone()),
            dependencies: DependencyRepository::new(pool.clone()),
            sessions: SessionRepository::new(pool.clone()),
            events: SessionEventRepository::new(pool.clone()),
            worktrees: WorktreeRepository::new(pool.clone()),
            pool,
        }
    }

    /// Open (creating if missing) and migrate the database at `url`.
    pub async fn open(url: &str) -> Result<Self> {
        let pool = crate::create_pool(url).await?;
        crate::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn sessions(&self) -> &SessionRepository {
        &self.sessions
    }

    pub fn events(&self) -> &SessionEventRepository {
        &self.events
    }

    pub fn worktrees(&self) -> &WorktreeRepository {
        &self.worktrees
    }

    pub fn dependencies(&self) -> &DependencyRepository {
        &self.dependencies
    }

    pub async fn snapshot(&self) -> Result<Snapshot> {
        Ok(Snapshot {
            tasks: self.tasks.find_all().await?,
            stories: self.stories.find_all().await?,
            epics: self.epics.find_all().await?,
        })
    }

    pub async fn task(&self, id: &str) -> Result<Task> {
        self.tasks.get(id).await
    }

    pub async fn story(&self, id: &str) -> Result<Story> {
        self.stories.get(id).await
    }

    pub async fn epic(&self, id: &str) -> Result<Epic> {
        self.epics.get(id).await
    }

    pub async fn create_epic(&self, epic: &Epic) -> Result<Epic> {
        self.epics.create(epic).await
    }

    pub async fn create_story(&self, story: &Story) -> Result<Story> {
        self.epics.get(&story.epic_id).await?;
        self.stories.create(story).await
    }

    /// Insert a task together with its `blocked_by` edges.
    ///
    /// Unknown story or blocker ids are rejected before anything is written.
    pub async fn create_task(&self, task: &Task) -> Result<Task> {
        if let Some(story_id) = &task.story_id {
            self.stories.get(story_id).await?;
        }
        for blocker in &task.blocked_by {
            if blocker == &task.id {
                return Err(CoreError::CycleDetected {
                    blocked: task.id.clone(),
                    blocker: blocker.clone(),
                }
                .into());
            }
            self.tasks.get(blocker).await?;
        }

        self.tasks.create(task).await?;
        for blocker in &task.blocked_by {
            self.dependencies.insert_acyclic(&task.id, blocker).await?;
        }

        info!(task_id = %task.id, title = %task.title, "Task created");
        self.tasks.get(&task.id).await
    }

    /// Add `blocker -> blocked`. Both tasks must exist; an edge that would
    /// close a cycle is rejected and the graph is left as it was.
    pub async fn add_dependency(&self, blocked: &str, blocker: &str) -> Result<()> {
        self.tasks.get(blocked).await?;
        self.tasks.get(blocker).await?;
        self.dependencies.insert_acyclic(blocked, blocker).await?;
        debug!(blocked, blocker, "Dependency added");
        Ok(())
    }

    pub async fn remove_dependency(&self, blocked: &str, blocker: &str) -> Result<()> {
        self.dependencies.delete(blocked, blocker).await?;
        debug!(blocked, blocker, "Dependency removed");
        Ok(())
    }

    /// Move a task to `in_progress`.
    ///
    /// Fails with [`CoreError::DependenciesNotDone`] when any blocker is not
    /// `done` at the moment of the write.
    pub async fn start_task(&self, id: &str) -> Result<Task> {
        let task = self.tasks.get(id).await?;
        if task.archived {
            return Err(CoreError::Validation(format!("task {} is archived", id)).into());
        }
        TaskStateMachine::validate_transition(&task.status, &TaskStatus::InProgress)?;

        if self.tasks.start_if_unblocked(id).await? {
            debug!(task_id = %id, "Task started");
            return self.tasks.get(id).await;
        }

        let snapshot = self.tasks.find_all().await?;
        let graph = DependencyGraph::new(&snapshot);
        let current = graph
            .get(id)
            .ok_or_else(|| DbError::TaskNotFound(id.to_string()))?;
        let pending = graph.pending_blockers(current);
        if !pending.is_empty() {
            return Err(CoreError::DependenciesNotDone {
                task_id: id.to_string(),
                pending,
            }
            .into());
        }

        Err(CoreError::InvalidStatusTransition {
            from: current.status.as_str().to_string(),
            to: TaskStatus::InProgress.as_str().to_string(),
        }
        .into())
    }

    /// Apply a validated status change. `in_progress` is routed through
    /// [`Self::start_task`]; leaving `blocked` clears the reason.
    pub async fn set_status(&self, id: &str, status: TaskStatus) -> Result<Task> {
        if status == TaskStatus::InProgress {
            return self.start_task(id).await;
        }
        let task = self.tasks.get(id).await?;
        TaskStateMachine::validate_transition(&task.status, &status)?;
        let reason = if status == TaskStatus::Blocked {
            task.blocked_reason.as_deref()
        } else {
            None
        };
        self.tasks.update_status(id, status, reason).await
    }

    /// Mark a task `done` and roll the change up to its story and epic.
    pub async fn complete_task(&self, id: &str) -> Result<(Task, Boundaries)> {
        let task = self.set_status(id, TaskStatus::Done).await?;
        let boundaries = self.refresh_rollups(id).await?;
        info!(task_id = %id, "Task completed");
        Ok((task, boundaries))
    }

    /// Block a task with a reason. Re-blocking a blocked task replaces the
    /// reason.
    pub async fn block_task(&self, id: &str, reason: &str) -> Result<Task> {
        let task = self.tasks.get(id).await?;
        if task.status != TaskStatus::Blocked {
            TaskStateMachine::validate_transition(&task.status, &TaskStatus::Blocked)?;
        }
        info!(task_id = %id, reason, "Task blocked");
        self.tasks
            .update_status(id, TaskStatus::Blocked, Some(reason))
            .await
    }

    pub async fn unblock_task(&self, id: &str) -> Result<Task> {
        let task = self.tasks.get(id).await?;
        TaskStateMachine::validate_transition(&task.status, &TaskStatus::Todo)?;
        info!(task_id = %id, "Task unblocked");
        self.tasks.update_status(id, TaskStatus::Todo, None).await
    }

    /// Return every `in_progress` task to `todo`. Used when a previous
    /// session died mid-cycle. Returns the ids that were reset.
    pub async fn reset_in_progress(&self) -> Result<Vec<String>> {
        let stuck = self.tasks.find_by_status(TaskStatus::InProgress).await?;
        let mut ids = Vec::with_capacity(stuck.len());
        for task in stuck {
            self.tasks
                .update_status(&task.id, TaskStatus::Todo, None)
                .await?;
            ids.push(task.id);
        }
        Ok(ids)
    }

    /// Hide a task from scheduling. Archiving can finish a story, so the
    /// rollups are refreshed.
    pub async fn archive_task(&self, id: &str) -> Result<(Task, Boundaries)> {
        let task = self.tasks.set_archived(id, true).await?;
        let boundaries = self.refresh_rollups(id).await?;
        Ok((task, boundaries))
    }

    pub async fn set_notes(&self, id: &str, notes: Option<&str>) -> Result<()> {
        self.tasks.get(id).await?;
        self.tasks.set_notes(id, notes).await
    }

    /// Recompute the derived status of the task's story and epic, write it
    /// back, and report which of them just became `done`.
    pub async fn refresh_rollups(&self, task_id: &str) -> Result<Boundaries> {
        let task = self.tasks.get(task_id).await?;
        let Some(story_id) = task.story_id else {
            return Ok(Boundaries::default());
        };

        let mut boundaries = Boundaries::default();

        let story = self.stories.get(&story_id).await?;
        let children = self.tasks.find_by_story(&story_id).await?;
        let story_status = RollupStatus::from_task_statuses(
            children.iter().filter(|t| !t.archived).map(|t| &t.status),
        );
        if story_status != story.status {
            self.stories.update_status(&story_id, story_status).await?;
            if story_status == RollupStatus::Done {
                info!(story_id = %story_id, "Story completed");
                boundaries.story_completed = Some(story_id.clone());
            }
        }

        let epic = self.epics.get(&story.epic_id).await?;
        let mut story_statuses = Vec::with_capacity(epic.story_ids.len());
        for sid in &epic.story_ids {
            story_statuses.push(self.stories.get(sid).await?.status);
        }
        let epic_status = RollupStatus::from_children(story_statuses);
        if epic_status != epic.status {
            self.epics.update_status(&epic.id, epic_status).await?;
            if epic_status == RollupStatus::Done {
                info!(epic_id = %epic.id, "Epic completed");
                boundaries.epic_completed = Some(epic.id.clone());
            }
        }

        Ok(boundaries)
    }
}
