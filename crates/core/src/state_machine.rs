use crate::domain::TaskStatus;
use crate::error::{CoreError, Result};

/// Allowed task status transitions.
///
/// `todo -> in_progress` additionally requires every blocker to be done;
/// that part is checked by the store against live data.
pub struct TaskStateMachine;

impl TaskStateMachine {
    pub fn validate_transition(from: &TaskStatus, to: &TaskStatus) -> Result<()> {
        if Self::allowed_transitions(from).contains(to) {
            Ok(())
        } else {
            Err(CoreError::InvalidStatusTransition {
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            })
        }
    }

    fn allowed_transitions(from: &TaskStatus) -> Vec<TaskStatus> {
        match from {
            TaskStatus::Todo => vec![TaskStatus::InProgress, TaskStatus::Blocked],
            TaskStatus::InProgress => vec![
                TaskStatus::Review,
                TaskStatus::Done,
                TaskStatus::Blocked,
                TaskStatus::Todo,
            ],
            TaskStatus::Review => vec![TaskStatus::Done, TaskStatus::InProgress, TaskStatus::Blocked],
            TaskStatus::Blocked => vec![TaskStatus::Todo],
            TaskStatus::Done => vec![],
        }
    }

    pub fn can_transition(from: &TaskStatus, to: &TaskStatus) -> bool {
        Self::validate_transition(from, to).is_ok()
    }
}
