use tokio::sync::broadcast;

use crate::types::{Event, EventEnvelope};

/// Events a subscriber may fall behind by before it starts losing the oldest.
pub const BUS_CAPACITY: usize = 1024;

/// In-process fan-out of orchestrator events. Cloning shares the channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::bounded(BUS_CAPACITY)
    }

    pub fn bounded(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Never blocks. Returns false when nobody is listening.
    pub fn emit(&self, event: Event) -> bool {
        self.tx.send(EventEnvelope::new(event)).is_ok()
    }

    /// Only events emitted after this call are delivered.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    pub fn listeners(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EventBus({} listeners)", self.listeners())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn resumed(session_id: Uuid) -> Event {
        Event::SessionResumed { session_id }
    }

    #[tokio::test]
    async fn test_every_listener_gets_each_event() {
        let bus = EventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.clone().subscribe();
        let id = Uuid::new_v4();

        assert!(bus.emit(resumed(id)));
        assert_eq!(first.recv().await.unwrap().event, resumed(id));
        assert_eq!(second.recv().await.unwrap().event, resumed(id));
        assert_eq!(bus.listeners(), 2);
    }

    #[test]
    fn test_emit_without_listeners() {
        let bus = EventBus::new();
        assert!(!bus.emit(resumed(Uuid::new_v4())));
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_events() {
        let bus = EventBus::new();
        let _keepalive = bus.subscribe();
        bus.emit(resumed(Uuid::new_v4()));

        let mut late = bus.subscribe();
        assert!(matches!(
            late.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_lagging_listener_drops_oldest() {
        let bus = EventBus::bounded(2);
        let mut rx = bus.subscribe();
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            bus.emit(resumed(*id));
        }

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(1))
        ));
        assert_eq!(rx.recv().await.unwrap().event, resumed(ids[1]));
    }
}
