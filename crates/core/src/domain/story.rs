use serde::{Deserialize, Serialize};

use super::TaskStatus;

/// Aggregate status of a story or epic, derived from its children.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RollupStatus {
    #[default]
    Todo,
    InProgress,
    Done,
}

impl RollupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "todo" => Some(Self::Todo),
            "in_progress" => Some(Self::InProgress),
            "done" => Some(Self::Done),
            _ => None,
        }
    }

    /// `Done` iff there is at least one child and every child is done.
    pub fn from_task_statuses<'a>(statuses: impl IntoIterator<Item = &'a TaskStatus>) -> Self {
        Self::fold(statuses.into_iter().map(|s| match s {
            TaskStatus::Done => Self::Done,
            TaskStatus::Todo => Self::Todo,
            _ => Self::InProgress,
        }))
    }

    pub fn from_children(children: impl IntoIterator<Item = RollupStatus>) -> Self {
        Self::fold(children.into_iter())
    }

    fn fold(children: impl Iterator<Item = RollupStatus>) -> Self {
        let mut seen = false;
        let mut all_done = true;
        let mut any_started = false;

        for child in children {
            seen = true;
            if child != Self::Done {
                all_done = false;
            }
            if child != Self::Todo {
                any_started = true;
            }
        }

        match (seen, all_done, any_started) {
            (true, true, _) => Self::Done,
            (_, _, true) => Self::InProgress,
            _ => Self::Todo,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Story {
    pub id: String,
    pub epic_id: String,
    pub title: String,
    /// Child task ids in creation order.
    pub task_ids: Vec<String>,
    pub status: RollupStatus,
}

impl Story {
    pub fn new(id: impl Into<String>, epic_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            epic_id: epic_id.into(),
            title: title.into(),
            task_ids: Vec::new(),
            status: RollupStatus::Todo,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rollup_all_done() {
        let statuses = [TaskStatus::Done, TaskStatus::Done];
        assert_eq!(RollupStatus::from_task_statuses(&statuses), RollupStatus::Done);
    }

    #[test]
    fn test_rollup_partial() {
        let statuses = [TaskStatus::Done, TaskStatus::Todo];
        assert_eq!(
            RollupStatus::from_task_statuses(&statuses),
            RollupStatus::InProgress
        );

        let statuses = [TaskStatus::Blocked];
        assert_eq!(
            RollupStatus::from_task_statuses(&statuses),
            RollupStatus::InProgress
        );
    }

    #[test]
    fn test_rollup_untouched_and_empty() {
        let statuses = [TaskStatus::Todo, TaskStatus::Todo];
        assert_eq!(RollupStatus::from_task_statuses(&statuses), RollupStatus::Todo);

        let empty: [TaskStatus; 0] = [];
        assert_eq!(RollupStatus::from_task_statuses(&empty), RollupStatus::Todo);
    }

    #[test]
    fn test_rollup_children() {
        let children = [RollupStatus::Done, RollupStatus::Done];
        assert_eq!(RollupStatus::from_children(children), RollupStatus::Done);

        let children = [RollupStatus::Done, RollupStatus::Todo];
        assert_eq!(RollupStatus::from_children(children), RollupStatus::InProgress);
    }
}
