mod epic;
mod session;
mod session_event;
mod story;
mod task;
mod worktree;

pub use epic::*;
pub use session::*;
pub use session_event::*;
pub use story::*;
pub use task::*;
pub use worktree::*;

use chrono::{DateTime, TimeZone, Utc};

pub(crate) fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0).single().unwrap_or_default()
}

pub(crate) fn datetime_to_timestamp(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}
