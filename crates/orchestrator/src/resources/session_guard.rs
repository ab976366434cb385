//! RAII guard for the session loop.
//!
//! A loop that returns early through `?` or unwinds leaves its session
//! marked `running` in the store. The guard makes that visible on the bus;
//! the next `start` recovers the stale session.

use tracing::{debug, warn};
use uuid::Uuid;

use events::{Event, EventBus};

/// When dropped without [`settle`](SessionGuard::settle), emits an error
/// and a `SessionFinished { status: "interrupted" }` event.
///
/// ```ignore
/// let mut guard = SessionGuard::new(session_id, bus.clone());
/// // ... drive cycles ...
/// guard.settle(); // paused, stopped, or completed
/// ```
pub struct SessionGuard {
    session_id: Uuid,
    event_bus: EventBus,
    settled: bool,
}

impl SessionGuard {
    pub fn new(session_id: Uuid, event_bus: EventBus) -> Self {
        debug!(session_id = %session_id, "Session guard created");
        Self {
            session_id,
            event_bus,
            settled: false,
        }
    }

    /// The loop reached a paused, stopped, or completed state.
    pub fn settle(&mut self) {
        debug!(session_id = %self.session_id, "Session settled");
        self.settled = true;
    }

    /// Report a failure now instead of on drop.
    pub fn fail(&mut self, error: &str) {
        self.emit_failure(error);
        self.settled = true;
    }

    pub fn is_settled(&self) -> bool {
        self.settled
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    fn emit_failure(&self, message: &str) {
        self.event_bus.emit(Event::Error {
            message: message.to_string(),
            context: Some(format!("session {}", self.session_id)),
        });
        self.event_bus.emit(Event::SessionFinished {
            session_id: self.session_id,
            status: "interrupted".to_string(),
        });
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if !self.settled {
            warn!(
                session_id = %self.session_id,
                "Session loop exited without settling - emitting failure"
            );
            self.emit_failure("Session loop terminated unexpectedly");
        }
    }
}
