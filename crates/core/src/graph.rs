//! Dependency resolution over the task graph.
//!
//! An edge `blocker -> blocked` is stored on the blocked task as an entry in
//! [`Task::blocked_by`]. All functions here are pure and run in
//! O(tasks + edges).

use std::collections::{HashMap, HashSet};

use crate::domain::{Task, TaskStatus};

/// Read-only index over a snapshot of tasks.
pub struct DependencyGraph<'a> {
    /// Tasks in the order they were given, which callers keep as creation order.
    order: Vec<&'a Task>,
    by_id: HashMap<&'a str, &'a Task>,
}

impl<'a> DependencyGraph<'a> {
    pub fn new(tasks: &'a [Task]) -> Self {
        let by_id = tasks.iter().map(|t| (t.id.as_str(), t)).collect();
        Self {
            order: tasks.iter().collect(),
            by_id,
        }
    }

    pub fn get(&self, id: &str) -> Option<&'a Task> {
        self.by_id.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Blockers of `task` that are not `done`. Unknown ids count as pending.
    pub fn pending_blockers(&self, task: &Task) -> Vec<String> {
        task.blocked_by
            .iter()
            .filter(|id| {
                self.by_id
                    .get(id.as_str())
                    .map_or(true, |blocker| blocker.status != TaskStatus::Done)
            })
            .cloned()
            .collect()
    }

    pub fn is_ready(&self, task: &Task) -> bool {
        task.status == TaskStatus::Todo && !task.archived && self.pending_blockers(task).is_empty()
    }

    /// Ready tasks ordered by priority (descending), then creation order.
    pub fn ready(&self) -> Vec<&'a Task> {
        let mut ready: Vec<&'a Task> = self
            .order
            .iter()
            .copied()
            .filter(|t| self.is_ready(t))
            .collect();
        // Stable sort keeps creation order among equal priorities.
        ready.sort_by_key(|t| std::cmp::Reverse(t.priority));
        ready
    }

    /// Whether adding `blocker -> blocked` would close a cycle.
    pub fn would_create_cycle(&self, blocked: &str, blocker: &str) -> bool {
        let adjacency: HashMap<&str, Vec<&str>> = self
            .order
            .iter()
            .map(|t| (t.id.as_str(), t.blocked_by.iter().map(String::as_str).collect()))
            .collect();
        reaches(&adjacency, blocker, blocked)
    }
}

/// Walks dependencies from `from`; true if `target` is reachable.
///
/// `adjacency` maps a task id to the ids that block it.
fn reaches(adjacency: &HashMap<&str, Vec<&str>>, from: &str, target: &str) -> bool {
    if from == target {
        return true;
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&str> = vec![from];

    while let Some(current) = stack.pop() {
        if current == target {
            return true;
        }
        if !visited.insert(current) {
            continue;
        }
        if let Some(deps) = adjacency.get(current) {
            stack.extend(deps.iter().copied().filter(|d| !visited.contains(d)));
        }
    }

    false
}

/// Cycle check over raw `(blocker, blocked)` edges, for callers that hold
/// the edge table rather than full tasks.
pub fn edges_would_create_cycle(edges: &[(String, String)], blocked: &str, blocker: &str) -> bool {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for (from, to) in edges {
        adjacency.entry(to.as_str()).or_default().push(from.as_str());
    }
    reaches(&adjacency, blocker, blocked)
}

/// Ids of tasks that may start now.
pub fn ready_tasks(tasks: &[Task]) -> Vec<String> {
    DependencyGraph::new(tasks)
        .ready()
        .into_iter()
        .map(|t| t.id.clone())
        .collect()
}

pub fn would_create_cycle(tasks: &[Task], blocked: &str, blocker: &str) -> bool {
    DependencyGraph::new(tasks).would_create_cycle(blocked, blocker)
}
