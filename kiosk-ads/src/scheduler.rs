//! Inactivity scheduler
//!
//! Mounts a screensaver session once the kiosk has seen no input for the
//! configured idle period, and unmounts it when the session asks to exit.
//! Input during a session is handled by the session itself; the scheduler
//! only restarts its idle timer afterwards.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::activity::{ActivitySubscription, InputKind};
use crate::playback::{Engine, EngineDeps};

pub struct InactivityScheduler {
    deps: EngineDeps,
    idle_after: Duration,
}

impl InactivityScheduler {
    pub fn new(deps: EngineDeps, idle_after: Duration) -> Self {
        Self { deps, idle_after }
    }

    /// Run idle/session cycles until `shutdown` is cancelled
    ///
    /// Returns the number of sessions that were mounted.
    pub async fn run(self, shutdown: CancellationToken) -> u64 {
        let (input_tx, mut input_rx) = mpsc::unbounded_channel();
        let _subscription = ActivitySubscription::new(
            Arc::clone(&self.deps.activity),
            &InputKind::ALL,
            Arc::new(move |kind| {
                let _ = input_tx.send(kind);
            }),
        );

        let mut sessions = 0;
        loop {
            if !self.wait_for_idle(&mut input_rx, &shutdown).await {
                break;
            }

            info!(idle_ms = self.idle_after.as_millis() as u64, "Kiosk idle; starting screensaver");
            let (exit_tx, exit_rx) = oneshot::channel();
            let handle = Engine::mount(self.deps.clone(), move |reason| {
                let _ = exit_tx.send(reason);
            });
            sessions += 1;

            let reason = tokio::select! {
                _ = shutdown.cancelled() => None,
                reason = exit_rx => reason.ok(),
            };
            handle.teardown().await;

            // Inputs seen by the session already ended it
            while input_rx.try_recv().is_ok() {}

            match reason {
                Some(reason) => info!(reason = %reason, "Screensaver dismissed"),
                None if shutdown.is_cancelled() => break,
                None => debug!("Session ended without an exit request"),
            }
        }

        info!(sessions, "Inactivity scheduler stopped");
        sessions
    }

    /// Wait until no input arrives for `idle_after`; false on shutdown
    async fn wait_for_idle(
        &self,
        input_rx: &mut mpsc::UnboundedReceiver<InputKind>,
        shutdown: &CancellationToken,
    ) -> bool {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return false,
                Some(kind) = input_rx.recv() => {
                    debug!(input = %kind, "Input seen; idle timer restarted");
                }
                _ = tokio::time::sleep(self.idle_after) => return true,
            }
        }
    }
}
