use conductor_core::SessionEventKind;
use db::models::NewSessionEvent;
use db::SessionEventRepository;
use events::{Event, EventBus};
use tracing::warn;
use uuid::Uuid;

use crate::error::Result;
use crate::hooks::FireReport;

/// Durable, append-only record of one session, mirrored onto the live
/// event bus.
#[derive(Clone)]
pub struct SessionLog {
    session_id: Uuid,
    events: SessionEventRepository,
    bus: EventBus,
}

impl SessionLog {
    pub fn new(session_id: Uuid, events: SessionEventRepository, bus: EventBus) -> Self {
        Self {
            session_id,
            events,
            bus,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub async fn append(&self, kind: SessionEventKind, payload: serde_json::Value) -> Result<i64> {
        let id = self
            .events
            .append(&NewSessionEvent::new(self.session_id, kind, payload))
            .await?;
        Ok(id)
    }

    /// Append, logging instead of failing. For records whose loss must not
    /// stop the loop.
    pub async fn record(&self, kind: SessionEventKind, payload: serde_json::Value) {
        if let Err(e) = self.append(kind, payload).await {
            warn!(session_id = %self.session_id, kind = kind.as_str(), error = %e, "Failed to append session event");
        }
    }

    pub fn emit(&self, event: Event) {
        self.bus.emit(event);
    }

    /// Log and broadcast every result of one hook firing.
    pub async fn record_firing(&self, fired: &FireReport, task_id: Option<&str>) {
        for result in &fired.results {
            self.emit(Event::HookFired {
                point: fired.point.clone(),
                action: result.action.clone(),
                outcome: result.outcome.as_str().to_string(),
                message: result.outcome.message().map(str::to_string),
            });
            self.record(
                SessionEventKind::HookFired,
                serde_json::json!({
                    "point": fired.point,
                    "action": result.action,
                    "outcome": result.outcome.as_str(),
                    "message": result.outcome.message(),
                    "task_id": task_id,
                }),
            )
            .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_core::{Mode, Session};
    use serde_json::json;

    #[tokio::test]
    async fn test_append_and_emit() {
        let store = db::TaskStore::open("sqlite::memory:").await.unwrap();
        let session = store.sessions().create(&Session::new(Mode::SemiAuto)).await.unwrap();
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        let log = SessionLog::new(session.id, store.events().clone(), bus);
        log.append(SessionEventKind::Started, json!({"mode": "semi-auto"}))
            .await
            .unwrap();
        log.record(SessionEventKind::Error, json!({"message": "x"})).await;
        log.emit(Event::SessionResumed {
            session_id: session.id,
        });

        let events = store.events().find_by_session(session.id).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, SessionEventKind::Started);
        assert_eq!(events[1].payload["message"], "x");

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.event.session_id(), Some(session.id));
    }
}
