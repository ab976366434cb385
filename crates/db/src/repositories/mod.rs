mod dependency_repository;
mod epic_repository;
mod session_event_repository;
mod session_repository;
mod story_repository;
mod task_repository;
mod worktree_repository;

pub use dependency_repository::*;
pub use epic_repository::*;
pub use session_event_repository::*;
pub use session_repository::*;
pub use story_repository::*;
pub use task_repository::*;
pub use worktree_repository::*;
