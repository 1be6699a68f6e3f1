//! Event types for the kiosk ad player
//!
//! Provides shared event definitions and the EventBus used to observe a
//! screensaver session from the host (overlay UI, diagnostics, logging).

mod session_types;

pub use session_types::{EndReason, ExitReason, FetchPurpose};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Kiosk event types
///
/// Events are broadcast via EventBus and can be serialized for transmission
/// to an overlay process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum KioskEvent {
    /// Session mounted and requesting its first batch
    SessionStarted {
        session_id: Uuid,
        device_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A batch became the active batch
    BatchLoaded {
        cycle_number: u64,
        ad_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The next batch was prefetched and is waiting for hand-off
    BatchStaged {
        cycle_number: u64,
        ad_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// An ad was placed on the playback surface
    AdPresented {
        ad_id: String,
        index: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The playback surface confirmed playback of an ad
    AdPlaying {
        ad_id: String,
        index: usize,
        /// Whether playback only succeeded muted
        muted: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Periodic position update from the playback surface
    ///
    /// Lossy: emitted with `emit_lossy`, no subscriber is required.
    PlaybackProgress {
        ad_id: String,
        current_time: f64,
        duration: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The active batch played through
    BatchExhausted {
        cycle_number: u64,
        /// Total exhausted batches in this session
        cycle_count: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A batch fetch failed or timed out (logged, retried later)
    FetchFailed {
        purpose: FetchPurpose,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Every autoplay strategy was rejected for this ad
    AutoplayDenied {
        ad_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Overlay should present the manual "start" affordance
    ManualStartRequired {
        ad_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The first fetch returned no ads; only the exit action is offered
    NoAdsAvailable {
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Session stopped; no further events follow for this session
    SessionEnded {
        session_id: Uuid,
        reason: EndReason,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl KioskEvent {
    /// Short event name for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            KioskEvent::SessionStarted { .. } => "SessionStarted",
            KioskEvent::BatchLoaded { .. } => "BatchLoaded",
            KioskEvent::BatchStaged { .. } => "BatchStaged",
            KioskEvent::AdPresented { .. } => "AdPresented",
            KioskEvent::AdPlaying { .. } => "AdPlaying",
            KioskEvent::PlaybackProgress { .. } => "PlaybackProgress",
            KioskEvent::BatchExhausted { .. } => "BatchExhausted",
            KioskEvent::FetchFailed { .. } => "FetchFailed",
            KioskEvent::AutoplayDenied { .. } => "AutoplayDenied",
            KioskEvent::ManualStartRequired { .. } => "ManualStartRequired",
            KioskEvent::NoAdsAvailable { .. } => "NoAdsAvailable",
            KioskEvent::SessionEnded { .. } => "SessionEnded",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus for session events
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block the engine)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use kiosk_common::events::{EventBus, KioskEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit(KioskEvent::NoAdsAvailable {
///     timestamp: chrono::Utc::now(),
/// }).ok();
///
/// assert_eq!(rx.try_recv().unwrap().event_type(), "NoAdsAvailable");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<KioskEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<KioskEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: KioskEvent,
    ) -> Result<usize, broadcast::error::SendError<KioskEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: KioskEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
