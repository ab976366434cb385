//! RAII guards for session lifecycle.
//!
//! - [`SessionGuard`] - Reports a session loop that exits without settling

mod session_guard;

pub use session_guard::SessionGuard;
