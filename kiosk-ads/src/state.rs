//! Shared session state
//!
//! Read side of a running session. The session actor is the only writer;
//! host code (overlay, diagnostics, tests) reads snapshots and subscribes
//! to the event bus.

use kiosk_common::events::{EventBus, KioskEvent};
use tokio::sync::{broadcast, RwLock};

use crate::playback::EngineSnapshot;

/// Shared state accessible by the session and its host
///
/// Uses RwLock for concurrent read access with one writer
pub struct SharedState {
    snapshot: RwLock<EngineSnapshot>,

    /// Session event broadcaster
    events: EventBus,
}

impl SharedState {
    pub fn new(event_capacity: usize) -> Self {
        Self {
            snapshot: RwLock::new(EngineSnapshot::initial()),
            events: EventBus::new(event_capacity),
        }
    }

    /// Broadcast an event to all subscribers
    pub fn broadcast_event(&self, event: KioskEvent) {
        // No receivers is OK
        self.events.emit_lossy(event);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<KioskEvent> {
        self.events.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }

    pub async fn snapshot(&self) -> EngineSnapshot {
        self.snapshot.read().await.clone()
    }

    pub(crate) async fn set_snapshot(&self, snapshot: EngineSnapshot) {
        *self.snapshot.write().await = snapshot;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::EnginePhase;

    #[tokio::test]
    async fn test_initial_snapshot_is_idle() {
        let state = SharedState::new(16);
        assert_eq!(state.snapshot().await.phase, EnginePhase::Idle);
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers() {
        let state = SharedState::new(16);
        state.broadcast_event(KioskEvent::NoAdsAvailable {
            timestamp: chrono::Utc::now(),
        });

        let mut rx = state.subscribe_events();
        state.broadcast_event(KioskEvent::NoAdsAvailable {
            timestamp: chrono::Utc::now(),
        });
        assert_eq!(rx.recv().await.unwrap().event_type(), "NoAdsAvailable");
    }
}
