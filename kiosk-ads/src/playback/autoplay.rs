//! Autoplay negotiation
//!
//! Unattended playback is restricted by the host's autoplay policy, so each
//! ad is started by walking an ordered strategy list until one succeeds:
//! unmuted start, muted start, then one or more delayed retries. When every
//! strategy is rejected the negotiator waits a short grace period and asks
//! for a manual start instead of retrying forever.
//!
//! The negotiator is a pure state machine; it returns [`AutoplayAction`]s
//! and the controller turns them into surface calls and timers. Every
//! attempt carries an id so late results from a superseded attempt are
//! ignored.

use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::PlaybackSettings;

/// One way of starting playback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StartStrategy {
    /// Direct start with sound
    Unmuted,
    /// Start with the surface muted (most permissive policy class)
    Muted,
    /// Start again after a delay, muted; covers late element readiness
    DelayedRetry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state")]
pub enum Negotiation {
    Idle,
    /// `start()` in flight for strategy `step`
    Starting { attempt: u64, step: usize, muted: bool },
    /// Waiting for the delayed-retry timer of strategy `step`
    RetryPending { attempt: u64, step: usize },
    Playing { muted: bool },
    /// All strategies failed; manual prompt scheduled
    GracePending { attempt: u64 },
    AwaitingManualStart,
    /// User-initiated `start()` in flight
    ManualStarting { attempt: u64 },
}

/// What the controller must do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoplayAction {
    /// Call `start()` on the surface with the given muted flag
    Start { attempt: u64, muted: bool },
    /// Schedule the delayed retry
    RetryAfter { attempt: u64, delay: Duration },
    /// Playback confirmed
    Playing { muted: bool },
    /// Strategies exhausted; schedule the manual prompt
    PromptAfter { attempt: u64, delay: Duration },
    /// Show the manual-start affordance now
    ManualStartRequired,
    /// Nothing to do (duplicate trigger or stale completion)
    Ignore,
}

#[derive(Debug)]
pub struct AutoplayNegotiator {
    strategies: Vec<StartStrategy>,
    retry_delay: Duration,
    manual_grace: Duration,
    state: Negotiation,
    next_attempt: u64,
}

impl AutoplayNegotiator {
    pub fn new(settings: &PlaybackSettings) -> Self {
        let mut strategies = vec![StartStrategy::Unmuted, StartStrategy::Muted];
        strategies.extend(std::iter::repeat(StartStrategy::DelayedRetry).take(settings.delayed_retries as usize));

        Self {
            strategies,
            retry_delay: settings.autoplay_retry_delay(),
            manual_grace: settings.manual_start_grace(),
            state: Negotiation::Idle,
            next_attempt: 1,
        }
    }

    pub fn state(&self) -> Negotiation {
        self.state
    }

    pub fn strategies(&self) -> &[StartStrategy] {
        &self.strategies
    }

    /// True while a `start()` call or its delayed retry is outstanding
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self.state,
            Negotiation::Starting { .. } | Negotiation::RetryPending { .. } | Negotiation::ManualStarting { .. }
        )
    }

    /// Start negotiating playback of the freshly loaded source
    pub fn begin(&mut self) -> AutoplayAction {
        if self.is_in_progress() {
            debug!(state = ?self.state, "Autoplay already in progress; duplicate start ignored");
            return AutoplayAction::Ignore;
        }
        let attempt = self.allocate_attempt();
        self.run_step(attempt, 0)
    }

    /// Feed the result of a `start()` call
    pub fn on_start_result(&mut self, attempt: u64, succeeded: bool) -> AutoplayAction {
        match self.state {
            Negotiation::Starting { attempt: current, step, muted } if current == attempt => {
                if succeeded {
                    info!(attempt, strategy = ?self.strategies[step], muted, "Playback started");
                    self.state = Negotiation::Playing { muted };
                    AutoplayAction::Playing { muted }
                } else {
                    debug!(attempt, strategy = ?self.strategies[step], "Start strategy rejected");
                    self.run_step(attempt, step + 1)
                }
            }
            Negotiation::ManualStarting { attempt: current } if current == attempt => {
                if succeeded {
                    self.state = Negotiation::Playing { muted: false };
                    AutoplayAction::Playing { muted: false }
                } else {
                    self.state = Negotiation::AwaitingManualStart;
                    AutoplayAction::ManualStartRequired
                }
            }
            _ => {
                debug!(attempt, state = ?self.state, "Stale start result ignored");
                AutoplayAction::Ignore
            }
        }
    }

    /// Delayed-retry timer fired
    pub fn on_retry_due(&mut self, attempt: u64) -> AutoplayAction {
        match self.state {
            Negotiation::RetryPending { attempt: current, step } if current == attempt => {
                self.state = Negotiation::Starting {
                    attempt,
                    step,
                    muted: true,
                };
                AutoplayAction::Start { attempt, muted: true }
            }
            _ => AutoplayAction::Ignore,
        }
    }

    /// Grace period after exhaustion elapsed
    pub fn on_grace_elapsed(&mut self, attempt: u64) -> AutoplayAction {
        match self.state {
            Negotiation::GracePending { attempt: current } if current == attempt => {
                self.state = Negotiation::AwaitingManualStart;
                AutoplayAction::ManualStartRequired
            }
            _ => AutoplayAction::Ignore,
        }
    }

    /// User pressed the manual "start" affordance
    ///
    /// A user gesture satisfies the autoplay policy, so a single unmuted
    /// attempt is made. Failure returns to `AwaitingManualStart`.
    pub fn manual_start(&mut self) -> AutoplayAction {
        match self.state {
            Negotiation::AwaitingManualStart | Negotiation::GracePending { .. } => {
                let attempt = self.allocate_attempt();
                self.state = Negotiation::ManualStarting { attempt };
                AutoplayAction::Start { attempt, muted: false }
            }
            _ => AutoplayAction::Ignore,
        }
    }

    fn allocate_attempt(&mut self) -> u64 {
        let attempt = self.next_attempt;
        self.next_attempt += 1;
        attempt
    }

    fn run_step(&mut self, attempt: u64, step: usize) -> AutoplayAction {
        match self.strategies.get(step) {
            Some(StartStrategy::Unmuted) => {
                self.state = Negotiation::Starting { attempt, step, muted: false };
                AutoplayAction::Start { attempt, muted: false }
            }
            Some(StartStrategy::Muted) => {
                self.state = Negotiation::Starting { attempt, step, muted: true };
                AutoplayAction::Start { attempt, muted: true }
            }
            Some(StartStrategy::DelayedRetry) => {
                self.state = Negotiation::RetryPending { attempt, step };
                AutoplayAction::RetryAfter {
                    attempt,
                    delay: self.retry_delay,
                }
            }
            None => {
                info!(attempt, "All autoplay strategies rejected");
                self.state = Negotiation::GracePending { attempt };
                AutoplayAction::PromptAfter {
                    attempt,
                    delay: self.manual_grace,
                }
            }
        }
    }
}
