//! Headless adapters for running the engine without a display
//!
//! [`SimulatedSurface`] plays each ad as a fixed-length timer and logs what
//! would be on screen. [`spawn_stdin_activity`] turns every line typed on
//! stdin into a key press.

use async_trait::async_trait;
use kiosk_common::Ad;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::activity::{ActivityRegistry, InputKind};
use crate::error::{Error, Result};
use crate::surface::{PlaybackSurface, SurfaceEvents};

const PROGRESS_TICK: Duration = Duration::from_millis(250);

#[derive(Default)]
struct SimState {
    events: Option<SurfaceEvents>,
    current: Option<Ad>,
    muted: bool,
    position: f64,
    /// Bumped on every load/pause; stale tickers stop when it changes
    generation: u64,
}

/// Playback surface that "plays" each ad for a fixed duration
pub struct SimulatedSurface {
    ad_length: Duration,
    /// Reject unmuted starts like a strict autoplay policy would
    muted_only: bool,
    state: Arc<Mutex<SimState>>,
}

impl SimulatedSurface {
    pub fn new(ad_length: Duration) -> Self {
        Self {
            ad_length,
            muted_only: false,
            state: Arc::new(Mutex::new(SimState::default())),
        }
    }

    pub fn muted_only(mut self, muted_only: bool) -> Self {
        self.muted_only = muted_only;
        self
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        lock(&self.state)
    }
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl PlaybackSurface for SimulatedSurface {
    fn attach(&self, events: SurfaceEvents) {
        let mut state = self.lock();
        state.generation += 1;
        state.events = Some(events);
    }

    fn load(&self, ad: &Ad) {
        info!(ad_id = %ad.id, title = %ad.title, url = %ad.video_url, "Now showing");
        let mut state = self.lock();
        state.generation += 1;
        state.current = Some(ad.clone());
        state.position = 0.0;
    }

    async fn start(&self) -> Result<()> {
        let (generation, events, resume_at) = {
            let mut state = self.lock();
            if state.current.is_none() {
                return Err(Error::Surface("no source loaded".to_string()));
            }
            if self.muted_only && !state.muted {
                return Err(Error::Surface("unmuted autoplay not allowed".to_string()));
            }
            let Some(events) = state.events.clone() else {
                return Err(Error::Surface("surface not attached".to_string()));
            };
            state.generation += 1;
            (state.generation, events, state.position)
        };

        let shared = Arc::clone(&self.state);
        let duration = self.ad_length.as_secs_f64();
        tokio::spawn(async move {
            let mut position = resume_at;
            let mut ticker = tokio::time::interval(PROGRESS_TICK);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                position = (position + PROGRESS_TICK.as_secs_f64()).min(duration);
                {
                    let mut state = lock(&shared);
                    if state.generation != generation {
                        return;
                    }
                    state.position = position;
                }
                events.time_update(position, duration);
                if position >= duration {
                    events.ended();
                    return;
                }
            }
        });
        Ok(())
    }

    fn pause(&self) {
        let mut state = self.lock();
        state.generation += 1;
        debug!(position = state.position, "Surface paused");
    }

    fn set_muted(&self, muted: bool) {
        self.lock().muted = muted;
    }

    fn is_muted(&self) -> bool {
        self.lock().muted
    }

    fn current_time(&self) -> f64 {
        self.lock().position
    }

    fn duration(&self) -> f64 {
        match self.lock().current {
            Some(_) => self.ad_length.as_secs_f64(),
            None => 0.0,
        }
    }
}

/// Dispatch a key press for every line read from stdin
pub fn spawn_stdin_activity(registry: Arc<ActivityRegistry>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(_)) => registry.dispatch(InputKind::KeyDown),
                Ok(None) => {
                    debug!("stdin closed; no more keyboard input");
                    return;
                }
                Err(e) => {
                    debug!(error = %e, "stdin read failed");
                    return;
                }
            }
        }
    })
}
