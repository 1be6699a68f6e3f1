//! Playback controller - the session state machine
//!
//! **Responsibilities:**
//! - Owns the active batch, current index and playing/muted flags
//! - Advances ad by ad on "ended", hands off to the prefetched batch at
//!   batch end, falls back to a fresh fetch when prefetch lost the race
//! - Drives the autoplay negotiator and the prefetch manager
//!
//! The controller performs no I/O: every operation returns the [`Effect`]s
//! the session actor must carry out. Once `Terminated`, every operation is a
//! no-op, which is what discards stale continuations after teardown.

use kiosk_common::events::{EndReason, ExitReason, FetchPurpose, KioskEvent};
use kiosk_common::{Ad, Batch, DeviceId};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::autoplay::{AutoplayAction, AutoplayNegotiator, Negotiation};
use super::events::{Effect, EngineEvent, FetchTicket, TimerKind};
use super::prefetch::{FetchOutcome, PrefetchManager};
use super::state::{EnginePhase, EngineSnapshot, PlaybackState};
use crate::activity::InputKind;
use crate::config::PlaybackSettings;
use crate::error::Error;
use crate::surface::SurfaceEvent;

pub struct PlaybackController {
    session_id: Uuid,
    device_id: DeviceId,
    phase: EnginePhase,
    playback: PlaybackState,
    prefetch: PrefetchManager,
    autoplay: AutoplayNegotiator,
    fetch_retry_delay: Duration,
    /// Surface reported a media error while the start was still pending
    faulted: bool,
}

impl PlaybackController {
    pub fn new(session_id: Uuid, device_id: DeviceId, settings: &PlaybackSettings) -> Self {
        Self {
            session_id,
            device_id,
            phase: EnginePhase::Idle,
            playback: PlaybackState::default(),
            prefetch: PrefetchManager::new(),
            autoplay: AutoplayNegotiator::new(settings),
            fetch_retry_delay: settings.fetch_retry_delay(),
            faulted: false,
        }
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    pub fn playback(&self) -> &PlaybackState {
        &self.playback
    }

    pub fn is_terminated(&self) -> bool {
        self.phase == EnginePhase::Terminated
    }

    pub fn current_ad(&self) -> Option<&Ad> {
        self.playback
            .active_batch
            .as_ref()
            .and_then(|b| b.get(self.playback.current_index))
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            phase: self.phase,
            playback: self.playback.clone(),
            prefetch: self.prefetch.status(self.phase == EnginePhase::AwaitingBatch),
            autoplay: self.autoplay.state(),
        }
    }

    /// Process one queued event
    pub fn handle(&mut self, event: EngineEvent) -> Vec<Effect> {
        match event {
            EngineEvent::Mount => self.run(Self::mount),
            EngineEvent::Surface(SurfaceEvent::Ended) => self.on_ad_ended(),
            EngineEvent::Surface(SurfaceEvent::Error(message)) => {
                self.run(|this, fx| this.surface_error(&message, fx))
            }
            EngineEvent::Surface(SurfaceEvent::TimeUpdate {
                current_time,
                duration,
            }) => self.run(|this, fx| this.time_update(current_time, duration, fx)),
            EngineEvent::BatchFetched { ticket, result } => {
                self.run(|this, fx| this.batch_fetched(ticket, result, fx))
            }
            EngineEvent::StartCompleted { attempt, result } => self.run(|this, fx| {
                if let Err(e) = &result {
                    debug!(attempt, error = %e, "Surface start rejected");
                }
                let action = this.autoplay.on_start_result(attempt, result.is_ok());
                this.apply_autoplay(action, fx);
            }),
            EngineEvent::TimerFired(TimerKind::AutoplayRetry { attempt }) => self.run(|this, fx| {
                let action = this.autoplay.on_retry_due(attempt);
                this.apply_autoplay(action, fx);
            }),
            EngineEvent::TimerFired(TimerKind::ManualPrompt { attempt }) => self.run(|this, fx| {
                let action = this.autoplay.on_grace_elapsed(attempt);
                this.apply_autoplay(action, fx);
            }),
            EngineEvent::TimerFired(TimerKind::FetchRetry) => self.run(Self::fetch_retry),
            EngineEvent::ManualStart => self.run(Self::manual_start),
            EngineEvent::PrefetchRequested => self.run(|this, fx| this.prefetch_next(true, fx)),
            EngineEvent::ExitRequested => self.run(Self::request_exit),
        }
    }

    /// Make `batch` the active batch and start its first ad
    ///
    /// An empty batch is not loaded: the failure is logged and a fresh fetch
    /// is scheduled.
    pub fn load_batch(&mut self, batch: Batch) -> Vec<Effect> {
        self.run(|this, fx| this.load_into(batch, fx))
    }

    /// The current ad finished; advance or hand off to the next batch
    pub fn on_ad_ended(&mut self) -> Vec<Effect> {
        self.run(Self::ad_ended)
    }

    /// Human input seen: pause, cancel everything pending, stop for good
    ///
    /// PlaybackState is left exactly as it was.
    pub fn on_activity_detected(&mut self, kind: InputKind) -> Vec<Effect> {
        self.run(|this, fx| {
            info!(input = %kind, "Activity detected; ending session");
            this.terminate_into(EndReason::Activity, fx);
        })
    }

    /// Stop without an exit request (host teardown)
    pub fn terminate(&mut self, reason: EndReason) -> Vec<Effect> {
        self.run(|this, fx| this.terminate_into(reason, fx))
    }

    fn run(&mut self, f: impl FnOnce(&mut Self, &mut Vec<Effect>)) -> Vec<Effect> {
        let mut fx = Vec::new();
        if self.phase == EnginePhase::Terminated {
            debug!("Session terminated; continuation discarded");
            return fx;
        }
        f(self, &mut fx);
        fx
    }

    // ----------------------------------------
    // Transitions
    // ----------------------------------------

    fn mount(&mut self, fx: &mut Vec<Effect>) {
        if self.phase != EnginePhase::Idle {
            debug!(phase = %self.phase, "Already mounted");
            return;
        }
        self.phase = EnginePhase::AwaitingFirstBatch;
        emit(
            fx,
            KioskEvent::SessionStarted {
                session_id: self.session_id,
                device_id: self.device_id.to_string(),
                timestamp: chrono::Utc::now(),
            },
        );
        self.request_fetch(FetchPurpose::Initial, fx);
    }

    fn ad_ended(&mut self, fx: &mut Vec<Effect>) {
        let index = match self.phase {
            EnginePhase::Playing(i) => i,
            other => {
                debug!(phase = %other, "Ended outside playback; ignored");
                return;
            }
        };
        let Some(len) = self.playback.active_batch.as_ref().map(Batch::len) else {
            return;
        };

        self.playback.is_playing = false;
        if index + 1 < len {
            self.playback.current_index = index + 1;
            self.playback.current_time = 0.0;
            self.playback.duration = 0.0;
            self.start_current(fx);
            self.prefetch_next(false, fx);
        } else {
            self.exhaust(fx);
        }
    }

    fn exhaust(&mut self, fx: &mut Vec<Effect>) {
        let finished = self.playback.active_batch.take();
        self.playback.cycle_count += 1;
        self.playback.current_index = 0;
        self.playback.current_time = 0.0;
        self.playback.duration = 0.0;
        self.phase = EnginePhase::AwaitingBatch;

        let cycle_number = finished.map(|b| b.cycle_number).unwrap_or_default();
        info!(cycle_number, cycle_count = self.playback.cycle_count, "Batch exhausted");
        emit(
            fx,
            KioskEvent::BatchExhausted {
                cycle_number,
                cycle_count: self.playback.cycle_count,
                timestamp: chrono::Utc::now(),
            },
        );

        self.promote_staged(fx);
    }

    /// Hand off to the staged batch, or make sure a fetch is under way
    fn promote_staged(&mut self, fx: &mut Vec<Effect>) {
        match self.prefetch.take_staged() {
            Some(batch) if !batch.is_empty() => self.load_into(batch, fx),
            Some(batch) => {
                warn!(cycle_number = batch.cycle_number, "Staged batch is empty; fetching a fresh one");
                self.request_fetch(FetchPurpose::Fallback, fx);
            }
            None if self.prefetch.is_in_flight() => {
                info!("Prefetch still in flight; will hand off when it lands");
            }
            None => {
                info!("Nothing staged; fetching a fresh batch");
                self.request_fetch(FetchPurpose::Fallback, fx);
            }
        }
    }

    fn load_into(&mut self, batch: Batch, fx: &mut Vec<Effect>) {
        if batch.is_empty() {
            warn!(cycle_number = batch.cycle_number, "Empty batch not loaded; retrying fetch");
            if self.phase != EnginePhase::AwaitingFirstBatch {
                self.phase = EnginePhase::AwaitingBatch;
            }
            self.schedule(TimerKind::FetchRetry, self.fetch_retry_delay, fx);
            return;
        }

        info!(cycle_number = batch.cycle_number, ads = batch.len(), "Loading batch");
        emit(
            fx,
            KioskEvent::BatchLoaded {
                cycle_number: batch.cycle_number,
                ad_count: batch.len(),
                timestamp: chrono::Utc::now(),
            },
        );

        self.playback.active_batch = Some(batch);
        self.playback.current_index = 0;
        self.playback.current_time = 0.0;
        self.playback.duration = 0.0;
        self.playback.is_playing = false;

        self.prefetch.unblock();
        self.start_current(fx);
        self.prefetch_next(false, fx);
    }

    fn start_current(&mut self, fx: &mut Vec<Effect>) {
        let Some(ad) = self.current_ad().cloned() else {
            return;
        };
        let index = self.playback.current_index;
        self.phase = EnginePhase::Starting(index);
        self.faulted = false;

        debug!(ad_id = %ad.id, index, "Presenting ad");
        emit(
            fx,
            KioskEvent::AdPresented {
                ad_id: ad.id.clone(),
                index,
                timestamp: chrono::Utc::now(),
            },
        );
        fx.push(Effect::Present(ad));

        let action = self.autoplay.begin();
        if action == AutoplayAction::Ignore {
            warn!(index, "Autoplay still busy with a previous start");
        }
        self.apply_autoplay(action, fx);
    }

    fn apply_autoplay(&mut self, action: AutoplayAction, fx: &mut Vec<Effect>) {
        let index = self.playback.current_index;
        match action {
            AutoplayAction::Start { attempt, muted } => {
                self.playback.is_muted = muted;
                fx.push(Effect::Start { attempt, muted });
            }
            AutoplayAction::RetryAfter { attempt, delay } => {
                self.schedule(TimerKind::AutoplayRetry { attempt }, delay, fx);
            }
            AutoplayAction::Playing { muted } => {
                self.playback.is_playing = true;
                self.playback.is_muted = muted;
                self.phase = EnginePhase::Playing(index);
                if let Some(ad) = self.current_ad() {
                    let ad_id = ad.id.clone();
                    emit(
                        fx,
                        KioskEvent::AdPlaying {
                            ad_id,
                            index,
                            muted,
                            timestamp: chrono::Utc::now(),
                        },
                    );
                }
                if self.faulted {
                    self.skip_faulted(index, fx);
                }
            }
            AutoplayAction::PromptAfter { .. } | AutoplayAction::ManualStartRequired if self.faulted => {
                self.playback.is_playing = false;
                self.skip_faulted(index, fx);
            }
            AutoplayAction::PromptAfter { attempt, delay } => {
                self.playback.is_playing = false;
                if let Some(ad) = self.current_ad() {
                    let ad_id = ad.id.clone();
                    emit(
                        fx,
                        KioskEvent::AutoplayDenied {
                            ad_id,
                            timestamp: chrono::Utc::now(),
                        },
                    );
                }
                self.schedule(TimerKind::ManualPrompt { attempt }, delay, fx);
            }
            AutoplayAction::ManualStartRequired => {
                self.playback.is_playing = false;
                self.phase = EnginePhase::AwaitingManualStart(index);
                info!(index, "Waiting for manual start");
                if let Some(ad) = self.current_ad() {
                    let ad_id = ad.id.clone();
                    emit(
                        fx,
                        KioskEvent::ManualStartRequired {
                            ad_id,
                            timestamp: chrono::Utc::now(),
                        },
                    );
                }
            }
            AutoplayAction::Ignore => {}
        }
    }

    /// A media error during the start means the ad is broken; move past it
    /// instead of waiting for a start that cannot succeed
    fn skip_faulted(&mut self, index: usize, fx: &mut Vec<Effect>) {
        warn!(index, "Ad faulted while starting; skipping it");
        self.faulted = false;
        self.phase = EnginePhase::Playing(index);
        self.ad_ended(fx);
    }

    fn batch_fetched(&mut self, ticket: FetchTicket, result: Result<Vec<Ad>, Error>, fx: &mut Vec<Effect>) {
        match self.prefetch.complete(ticket, result) {
            FetchOutcome::Stale => {
                debug!(seq = ticket.seq, "Stale fetch completion ignored");
            }
            FetchOutcome::Staged {
                cycle_number,
                ad_count,
            } => {
                info!(cycle_number, ad_count, "Next batch staged");
                emit(
                    fx,
                    KioskEvent::BatchStaged {
                        cycle_number,
                        ad_count,
                        timestamp: chrono::Utc::now(),
                    },
                );
                if self.phase == EnginePhase::AwaitingBatch {
                    self.promote_staged(fx);
                }
            }
            FetchOutcome::Ready(batch) => match self.phase {
                EnginePhase::AwaitingFirstBatch if batch.is_empty() => {
                    warn!("Batch source has no ads for this device");
                    self.phase = EnginePhase::NoAdsAvailable;
                    emit(
                        fx,
                        KioskEvent::NoAdsAvailable {
                            timestamp: chrono::Utc::now(),
                        },
                    );
                }
                EnginePhase::AwaitingFirstBatch | EnginePhase::AwaitingBatch => self.load_into(batch, fx),
                other => {
                    warn!(phase = %other, cycle_number = batch.cycle_number, "Unexpected batch discarded");
                }
            },
            FetchOutcome::Failed { purpose, error } => {
                warn!(purpose = %purpose, error = %error, "Batch fetch failed");
                emit(
                    fx,
                    KioskEvent::FetchFailed {
                        purpose,
                        reason: error.to_string(),
                        timestamp: chrono::Utc::now(),
                    },
                );
                // A failed prefetch while playing is retried on the next advance
                if matches!(
                    self.phase,
                    EnginePhase::AwaitingFirstBatch | EnginePhase::AwaitingBatch
                ) {
                    self.schedule(TimerKind::FetchRetry, self.fetch_retry_delay, fx);
                }
            }
        }
    }

    fn fetch_retry(&mut self, fx: &mut Vec<Effect>) {
        match self.phase {
            EnginePhase::AwaitingFirstBatch => self.request_fetch(FetchPurpose::Initial, fx),
            EnginePhase::AwaitingBatch => self.request_fetch(FetchPurpose::Fallback, fx),
            other => debug!(phase = %other, "Fetch retry no longer needed"),
        }
    }

    fn surface_error(&mut self, message: &str, fx: &mut Vec<Effect>) {
        warn!(phase = %self.phase, error = %message, "Playback surface error");
        match self.phase {
            // Treat as an implicit "ended" so the cycle keeps moving
            EnginePhase::Playing(_) => self.ad_ended(fx),
            EnginePhase::Starting(_) => self.faulted = true,
            _ => {}
        }
    }

    fn time_update(&mut self, current_time: f64, duration: f64, fx: &mut Vec<Effect>) {
        if !matches!(self.phase, EnginePhase::Starting(_) | EnginePhase::Playing(_)) {
            debug!(phase = %self.phase, "Time update outside playback; ignored");
            return;
        }
        self.playback.current_time = current_time;
        self.playback.duration = duration;
        if let Some(ad) = self.current_ad() {
            let ad_id = ad.id.clone();
            emit(
                fx,
                KioskEvent::PlaybackProgress {
                    ad_id,
                    current_time,
                    duration,
                    timestamp: chrono::Utc::now(),
                },
            );
        }
    }

    fn manual_start(&mut self, fx: &mut Vec<Effect>) {
        let index = match (self.phase, self.autoplay.state()) {
            (EnginePhase::AwaitingManualStart(i), _) => i,
            (EnginePhase::Starting(i), Negotiation::GracePending { .. }) => i,
            (phase, _) => {
                debug!(phase = %phase, "Manual start not expected; ignored");
                return;
            }
        };
        let action = self.autoplay.manual_start();
        if let AutoplayAction::Start { .. } = action {
            info!(index, "Manual start requested");
            self.phase = EnginePhase::Starting(index);
        }
        self.apply_autoplay(action, fx);
    }

    /// Start a background fetch when due (or when `forced` by the host)
    fn prefetch_next(&mut self, forced: bool, fx: &mut Vec<Effect>) {
        let Some(batch) = self.playback.active_batch.as_ref() else {
            if forced {
                debug!(phase = %self.phase, "No active batch; prefetch request ignored");
            }
            return;
        };
        if forced || self.prefetch.should_prefetch(self.playback.current_index, batch) {
            self.request_fetch(FetchPurpose::Prefetch, fx);
        }
    }

    fn request_fetch(&mut self, purpose: FetchPurpose, fx: &mut Vec<Effect>) {
        match self.prefetch.begin(purpose) {
            Some(ticket) => {
                debug!(seq = ticket.seq, purpose = %purpose, "Requesting batch");
                fx.push(Effect::Fetch(ticket));
            }
            None => debug!(purpose = %purpose, state = ?self.prefetch.state(), "Fetch request rejected"),
        }
    }

    fn request_exit(&mut self, fx: &mut Vec<Effect>) {
        info!(phase = %self.phase, "Exit requested");
        self.terminate_into(EndReason::UserExit, fx);
        fx.push(Effect::Exit(ExitReason::UserExit));
    }

    fn terminate_into(&mut self, reason: EndReason, fx: &mut Vec<Effect>) {
        self.phase = EnginePhase::Terminated;
        fx.push(Effect::Pause);
        fx.push(Effect::CancelPending);
        emit(
            fx,
            KioskEvent::SessionEnded {
                session_id: self.session_id,
                reason,
                timestamp: chrono::Utc::now(),
            },
        );
    }

    fn schedule(&self, timer: TimerKind, after: Duration, fx: &mut Vec<Effect>) {
        fx.push(Effect::Schedule { timer, after });
    }
}

fn emit(fx: &mut Vec<Effect>, event: KioskEvent) {
    fx.push(Effect::Emit(event));
}
