//! Internal session events and effects
//!
//! These types never leave the crate:
//! - [`EngineEvent`]: everything the session actor consumes, in arrival order
//! - [`Effect`]: what the controller asks the actor to do in response
//!
//! The controller itself performs no I/O. Fetches, surface starts and timers
//! run as helper tasks that post their completion back as an `EngineEvent`.

use kiosk_common::events::{ExitReason, FetchPurpose, KioskEvent};
use kiosk_common::Ad;
use std::time::Duration;

use crate::error::Error;
use crate::surface::SurfaceEvent;

/// Identifies one BatchSource call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    /// Monotonic per-session fetch sequence; becomes the batch cycle number
    pub seq: u64,
    pub purpose: FetchPurpose,
}

/// Deferred continuations owned by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Delayed-retry autoplay strategy is due
    AutoplayRetry { attempt: u64 },
    /// Grace period after autoplay exhaustion elapsed
    ManualPrompt { attempt: u64 },
    /// Retry a failed or empty initial/fallback fetch
    FetchRetry,
}

/// Input to the session state machine
#[derive(Debug)]
pub enum EngineEvent {
    /// Session mounted; request the first batch
    Mount,
    /// Media callback from the playback surface
    Surface(SurfaceEvent),
    /// A BatchSource call finished
    BatchFetched {
        ticket: FetchTicket,
        result: Result<Vec<Ad>, Error>,
    },
    /// A surface `start()` call finished
    StartCompleted {
        attempt: u64,
        result: Result<(), Error>,
    },
    TimerFired(TimerKind),
    /// Overlay's manual "start" affordance was used
    ManualStart,
    /// Host asked for an immediate prefetch
    PrefetchRequested,
    /// Overlay's exit action was used
    ExitRequested,
}

/// Side effect requested by the controller
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Call BatchSource::fetch for the session device
    Fetch(FetchTicket),
    /// Put `ad` on the playback surface
    Present(Ad),
    /// Set the muted flag and call `start()` on the surface
    Start { attempt: u64, muted: bool },
    /// Post `TimerFired(timer)` after `after`
    Schedule { timer: TimerKind, after: Duration },
    /// Pause the surface synchronously
    Pause,
    /// Cancel every pending helper task of the session
    CancelPending,
    /// Publish on the session event bus
    Emit(KioskEvent),
    /// Invoke the host exit callback
    Exit(ExitReason),
}
