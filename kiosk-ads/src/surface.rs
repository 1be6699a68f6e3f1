//! Playback surface contract
//!
//! The surface is the single video element the engine drives. Its media
//! callbacks (ended, time update, error) are delivered through
//! [`SurfaceEvents`], which feeds them into the session's event queue so
//! they are processed in arrival order with everything else.

use async_trait::async_trait;
use kiosk_common::Ad;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::playback::events::EngineEvent;

/// Media callback raised by the surface
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    /// Current ad played to the end
    Ended,
    /// Position changed (seconds)
    TimeUpdate { current_time: f64, duration: f64 },
    /// Media error mid-ad (e.g. decode failure)
    Error(String),
}

/// Callback sink handed to the surface on attach
#[derive(Debug, Clone)]
pub struct SurfaceEvents {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl SurfaceEvents {
    pub(crate) fn new(tx: mpsc::UnboundedSender<EngineEvent>) -> Self {
        Self { tx }
    }

    pub fn ended(&self) {
        self.send(SurfaceEvent::Ended);
    }

    pub fn time_update(&self, current_time: f64, duration: f64) {
        self.send(SurfaceEvent::TimeUpdate {
            current_time,
            duration,
        });
    }

    pub fn error(&self, message: impl Into<String>) {
        self.send(SurfaceEvent::Error(message.into()));
    }

    pub fn send(&self, event: SurfaceEvent) {
        // Session gone: nothing left to notify
        let _ = self.tx.send(EngineEvent::Surface(event));
    }
}

/// The video element the engine plays ads on
///
/// Exactly one surface exists per session. `start` may be rejected by the
/// host's autoplay policy; the autoplay negotiator never calls it twice
/// concurrently.
#[async_trait]
pub trait PlaybackSurface: Send + Sync {
    /// Register the media callback sink for this session
    fn attach(&self, events: SurfaceEvents);

    /// Replace the current source with `ad`
    fn load(&self, ad: &Ad);

    /// Begin playback of the loaded source
    async fn start(&self) -> Result<()>;

    fn pause(&self);

    fn set_muted(&self, muted: bool);

    fn is_muted(&self) -> bool;

    /// Current position in seconds
    fn current_time(&self) -> f64;

    /// Duration of the loaded source in seconds (0 when unknown)
    fn duration(&self) -> f64;
}
