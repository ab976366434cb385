use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Dependency {blocker} -> {blocked} would create a cycle")]
    CycleDetected { blocked: String, blocker: String },

    #[error("Invalid task status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("Task {task_id} has unfinished dependencies: {}", pending.join(", "))]
    DependenciesNotDone { task_id: String, pending: Vec<String> },

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CoreError::TaskNotFound("task-1".to_string());
        assert!(error.to_string().contains("task-1"));

        let error = CoreError::DependenciesNotDone {
            task_id: "b".to_string(),
            pending: vec!["a".to_string(), "c".to_string()],
        };
        assert_eq!(error.to_string(), "Task b has unfinished dependencies: a, c");
    }
}
