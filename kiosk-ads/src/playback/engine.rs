//! Screensaver session engine
//!
//! Mounting a session spawns one actor task that owns the
//! [`PlaybackController`] and consumes a single event queue: surface media
//! callbacks, fetch and start completions, timers and overlay commands are
//! all processed in arrival order, one at a time.
//!
//! Fetches, surface starts and timers run as helper tasks tied to the
//! session's cancellation token. Activity detection pauses the surface and
//! cancels the token from the input thread itself, so nothing queued after
//! the first input gets to run.

use kiosk_common::events::{EndReason, ExitReason, KioskEvent};
use kiosk_common::DeviceId;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::controller::PlaybackController;
use super::events::{Effect, EngineEvent, FetchTicket, TimerKind};
use super::state::EngineSnapshot;
use crate::activity::{ActivityMonitor, ActivitySource, InputKind};
use crate::config::PlaybackSettings;
use crate::error::Error;
use crate::source::BatchSource;
use crate::state::SharedState;
use crate::surface::{PlaybackSurface, SurfaceEvents};

/// Host callback invoked when the screensaver should be dismissed
pub type ExitCallback = Box<dyn FnOnce(ExitReason) + Send>;

/// Exit callback that can be fired from any thread, at most once
#[derive(Clone)]
pub struct ExitHandle {
    callback: Arc<Mutex<Option<ExitCallback>>>,
}

impl ExitHandle {
    pub fn new(callback: ExitCallback) -> Self {
        Self {
            callback: Arc::new(Mutex::new(Some(callback))),
        }
    }

    /// Invoke the callback; returns false if it already ran
    pub fn fire(&self, reason: ExitReason) -> bool {
        let callback = self
            .callback
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        match callback {
            Some(callback) => {
                info!(reason = %reason, "Dismissing screensaver");
                callback(reason);
                true
            }
            None => false,
        }
    }

    pub fn has_fired(&self) -> bool {
        self.callback
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_none()
    }
}

/// Collaborators of a session
#[derive(Clone)]
pub struct EngineDeps {
    pub source: Arc<dyn BatchSource>,
    pub surface: Arc<dyn PlaybackSurface>,
    pub activity: Arc<dyn ActivitySource>,
    pub device_id: DeviceId,
    pub settings: PlaybackSettings,
}

pub struct Engine;

impl Engine {
    /// Mount a screensaver session
    ///
    /// Must be called from within a tokio runtime. The first batch is
    /// requested immediately.
    pub fn mount<F>(deps: EngineDeps, on_exit: F) -> EngineHandle
    where
        F: FnOnce(ExitReason) + Send + 'static,
    {
        let session_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let exit = ExitHandle::new(Box::new(on_exit));
        let state = Arc::new(SharedState::new(deps.settings.event_bus_capacity));

        deps.surface.attach(SurfaceEvents::new(tx.clone()));

        let monitor = {
            let surface = Arc::clone(&deps.surface);
            let cancel = cancel.clone();
            let exit = exit.clone();
            ActivityMonitor::start(Arc::clone(&deps.activity), move |_kind| {
                surface.pause();
                cancel.cancel();
                exit.fire(ExitReason::Activity);
            })
        };
        let detected = monitor.detection_flag();

        let controller = PlaybackController::new(session_id, deps.device_id.clone(), &deps.settings);
        let actor = SessionActor {
            session_id,
            controller,
            rx,
            tx: tx.clone(),
            cancel: cancel.clone(),
            deps,
            state: Arc::clone(&state),
            exit: exit.clone(),
            monitor,
        };

        // Queued before the actor runs, so it is always processed first
        let _ = tx.send(EngineEvent::Mount);
        let task = tokio::spawn(actor.run());

        EngineHandle {
            session_id,
            tx,
            cancel,
            state,
            exit,
            detected,
            task: Some(task),
        }
    }
}

/// Host-side handle of a mounted session
///
/// Dropping the handle cancels the session without waiting for it.
pub struct EngineHandle {
    session_id: Uuid,
    tx: mpsc::UnboundedSender<EngineEvent>,
    cancel: CancellationToken,
    state: Arc<SharedState>,
    exit: ExitHandle,
    detected: Arc<OnceLock<InputKind>>,
    task: Option<JoinHandle<()>>,
}

impl EngineHandle {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Overlay's manual "start" affordance
    pub fn manual_start(&self) {
        self.send(EngineEvent::ManualStart);
    }

    /// Fetch the next batch now (no-op while a fetch is in flight or a
    /// batch is already staged)
    pub fn prefetch_now(&self) {
        self.send(EngineEvent::PrefetchRequested);
    }

    /// Overlay's exit action
    pub fn request_exit(&self) {
        self.send(EngineEvent::ExitRequested);
    }

    pub async fn snapshot(&self) -> EngineSnapshot {
        self.state.snapshot().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<KioskEvent> {
        self.state.subscribe_events()
    }

    pub fn shared_state(&self) -> Arc<SharedState> {
        Arc::clone(&self.state)
    }

    /// First human input seen by this session, if any
    pub fn activity_detected(&self) -> Option<InputKind> {
        self.detected.get().copied()
    }

    pub fn exit_fired(&self) -> bool {
        self.exit.has_fired()
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Unmount: cancel pending work, detach listeners, wait for the actor
    pub async fn teardown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(session = %self.session_id, error = %e, "Session task ended abnormally");
            }
        }
    }

    fn send(&self, event: EngineEvent) {
        if self.cancel.is_cancelled() || self.tx.send(event).is_err() {
            debug!(session = %self.session_id, "Session already ended; command ignored");
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct SessionActor {
    session_id: Uuid,
    controller: PlaybackController,
    rx: mpsc::UnboundedReceiver<EngineEvent>,
    tx: mpsc::UnboundedSender<EngineEvent>,
    cancel: CancellationToken,
    deps: EngineDeps,
    state: Arc<SharedState>,
    exit: ExitHandle,
    monitor: ActivityMonitor,
}

impl SessionActor {
    async fn run(mut self) {
        info!(session = %self.session_id, device = %self.deps.device_id, "Screensaver session mounted");

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                event = self.rx.recv() => {
                    let Some(event) = event else { break };
                    let effects = self.controller.handle(event);
                    self.execute(effects);
                    self.publish().await;
                    if self.controller.is_terminated() {
                        break;
                    }
                }
            }
        }

        self.finish().await;
    }

    async fn finish(&mut self) {
        if !self.controller.is_terminated() {
            let effects = match self.monitor.detected() {
                Some(kind) => self.controller.on_activity_detected(kind),
                None => self.controller.terminate(EndReason::Teardown),
            };
            self.execute(effects);
        }

        self.monitor.stop();
        self.cancel.cancel();
        self.publish().await;
        info!(
            session = %self.session_id,
            cycles = self.controller.playback().cycle_count,
            "Screensaver session ended"
        );
    }

    async fn publish(&self) {
        self.state.set_snapshot(self.controller.snapshot()).await;
    }

    fn execute(&self, effects: Vec<Effect>) {
        for effect in effects {
            let starts_work = matches!(
                effect,
                Effect::Fetch(_) | Effect::Present(_) | Effect::Start { .. } | Effect::Schedule { .. }
            );
            if starts_work && self.cancel.is_cancelled() {
                debug!(effect = ?effect, "Session cancelled; effect dropped");
                continue;
            }

            match effect {
                Effect::Pause => self.deps.surface.pause(),
                Effect::CancelPending => self.cancel.cancel(),
                Effect::Emit(event) => {
                    debug!(event = event.event_type(), "Session event");
                    self.state.broadcast_event(event);
                }
                Effect::Exit(reason) => {
                    self.exit.fire(reason);
                }
                Effect::Fetch(ticket) => self.spawn_fetch(ticket),
                Effect::Present(ad) => {
                    info!(ad_id = %ad.id, url = %ad.video_url, "Presenting ad");
                    self.deps.surface.load(&ad);
                }
                Effect::Start { attempt, muted } => self.spawn_start(attempt, muted),
                Effect::Schedule { timer, after } => self.spawn_timer(timer, after),
            }
        }
    }

    fn spawn_fetch(&self, ticket: FetchTicket) {
        let source = Arc::clone(&self.deps.source);
        let device_id = self.deps.device_id.clone();
        let timeout = self.deps.settings.fetch_timeout();
        let tx = self.tx.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                fetched = tokio::time::timeout(timeout, source.fetch(&device_id)) => match fetched {
                    Ok(result) => result,
                    Err(_) => Err(Error::FetchTimeout(timeout.as_millis() as u64)),
                },
            };
            let _ = tx.send(EngineEvent::BatchFetched { ticket, result });
        });
    }

    fn spawn_start(&self, attempt: u64, muted: bool) {
        let surface = Arc::clone(&self.deps.surface);
        let tx = self.tx.clone();
        let cancel = self.cancel.clone();

        surface.set_muted(muted);
        tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    surface.pause();
                    return;
                }
                result = surface.start() => result,
            };
            if cancel.is_cancelled() {
                // Activity won the race against this start
                surface.pause();
                return;
            }
            let _ = tx.send(EngineEvent::StartCompleted { attempt, result });
        });
    }

    fn spawn_timer(&self, timer: TimerKind, after: Duration) {
        let tx = self.tx.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(after) => {
                    let _ = tx.send(EngineEvent::TimerFired(timer));
                }
            }
        });
    }
}
