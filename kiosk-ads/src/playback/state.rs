//! Playback state management

use kiosk_common::Batch;
use serde::Serialize;

use super::autoplay::Negotiation;
use super::prefetch::PrefetchStatus;

/// Controller phase
///
/// `Terminated` is the only terminal phase; there is no way back to `Idle`
/// other than mounting a new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "index")]
pub enum EnginePhase {
    Idle,
    AwaitingFirstBatch,
    /// Ad `i` presented, start negotiation in progress (advance guard held)
    Starting(usize),
    Playing(usize),
    /// Active batch exhausted; waiting for the next one to arrive
    AwaitingBatch,
    /// Autoplay exhausted for ad `i`; overlay shows the manual start button
    AwaitingManualStart(usize),
    /// First fetch returned nothing; only the exit action is offered
    NoAdsAvailable,
    Terminated,
}

impl std::fmt::Display for EnginePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnginePhase::Idle => write!(f, "idle"),
            EnginePhase::AwaitingFirstBatch => write!(f, "awaiting-first-batch"),
            EnginePhase::Starting(i) => write!(f, "starting({})", i),
            EnginePhase::Playing(i) => write!(f, "playing({})", i),
            EnginePhase::AwaitingBatch => write!(f, "awaiting-batch"),
            EnginePhase::AwaitingManualStart(i) => write!(f, "awaiting-manual-start({})", i),
            EnginePhase::NoAdsAvailable => write!(f, "no-ads-available"),
            EnginePhase::Terminated => write!(f, "terminated"),
        }
    }
}

/// What is on screen and how it is playing
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct PlaybackState {
    pub active_batch: Option<Batch>,
    /// Always `< active_batch.len()` while a batch is loaded
    pub current_index: usize,
    pub is_playing: bool,
    pub is_muted: bool,
    /// Seconds
    pub current_time: f64,
    /// Seconds
    pub duration: f64,
    /// Number of batches played through
    pub cycle_count: u64,
}

/// Point-in-time view of a session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineSnapshot {
    pub phase: EnginePhase,
    pub playback: PlaybackState,
    pub prefetch: PrefetchStatus,
    pub autoplay: Negotiation,
}

impl EngineSnapshot {
    /// Snapshot of a session that has not processed anything yet
    pub fn initial() -> Self {
        Self {
            phase: EnginePhase::Idle,
            playback: PlaybackState::default(),
            prefetch: PrefetchStatus {
                staged_batch: None,
                is_fetch_in_flight: false,
                is_batch_exhausted: false,
                is_fetch_suppressed: false,
            },
            autoplay: Negotiation::Idle,
        }
    }

    /// Id of the ad at the current index, if a batch is loaded
    pub fn current_ad_id(&self) -> Option<&str> {
        self.playback
            .active_batch
            .as_ref()
            .and_then(|b| b.get(self.playback.current_index))
            .map(|ad| ad.id.as_str())
    }
}
