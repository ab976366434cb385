mod epic;
mod session;
mod story;
mod task;
mod worktree;

pub use epic::*;
pub use session::*;
pub use story::*;
pub use task::*;
pub use worktree::*;

/// Generate a short prefixed identifier such as `task-1a2b3c4d`.
pub fn new_id(prefix: &str) -> String {
    let raw = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &raw[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_id_format() {
        let id = new_id("task");
        assert!(id.starts_with("task-"));
        assert_eq!(id.len(), "task-".len() + 8);
        assert_ne!(new_id("task"), new_id("task"));
    }
}
