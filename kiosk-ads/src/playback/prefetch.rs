//! Prefetch manager
//!
//! Fetches the next batch while the active one still has ads left, so the
//! hand-off at batch end is seamless. All BatchSource calls of a session go
//! through [`PrefetchManager::begin`], which is what keeps the source from
//! ever seeing two concurrent requests for the device.
//!
//! State machine:
//!
//! ```text
//! Idle ──begin──▶ Fetching ──ok(prefetch)──▶ Staged ──take_staged──▶ Suppressed
//!  ▲                 │                                                  │
//!  └──── err / ok(initial|fallback) ◀────────┘          unblock ◀───────┘
//! ```

use kiosk_common::events::FetchPurpose;
use kiosk_common::{Ad, Batch};
use serde::Serialize;
use tracing::debug;

use super::events::FetchTicket;
use crate::error::Error;

/// Prefetch lifecycle; illegal combinations (staged and fetching at once,
/// two fetches) are unrepresentable
#[derive(Debug, Clone, PartialEq)]
pub enum PrefetchState {
    /// Nothing staged, nothing in flight
    Idle,
    /// One BatchSource call outstanding
    Fetching(FetchTicket),
    /// Next batch cached, waiting for hand-off
    Staged(Batch),
    /// Staged batch was handed off; blocked until the controller unblocks
    Suppressed,
}

/// Flattened view of [`PrefetchState`] for snapshots
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrefetchStatus {
    pub staged_batch: Option<Batch>,
    pub is_fetch_in_flight: bool,
    pub is_batch_exhausted: bool,
    pub is_fetch_suppressed: bool,
}

/// Result of feeding a fetch completion into the manager
#[derive(Debug)]
pub enum FetchOutcome {
    /// Completion for a ticket that is no longer current
    Stale,
    /// Prefetch succeeded; the batch is now staged
    Staged { cycle_number: u64, ad_count: usize },
    /// Initial or fallback fetch succeeded; load it directly
    Ready(Batch),
    /// Fetch failed; nothing staged
    Failed { purpose: FetchPurpose, error: Error },
}

#[derive(Debug)]
pub struct PrefetchManager {
    state: PrefetchState,
    next_seq: u64,
}

impl PrefetchManager {
    pub fn new() -> Self {
        Self {
            state: PrefetchState::Idle,
            next_seq: 1,
        }
    }

    pub fn state(&self) -> &PrefetchState {
        &self.state
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self.state, PrefetchState::Fetching(_))
    }

    pub fn has_staged(&self) -> bool {
        matches!(self.state, PrefetchState::Staged(_))
    }

    /// Whether a background fetch should start now
    ///
    /// True once `current_index >= floor(len / 2)` with nothing staged,
    /// nothing in flight and prefetch not suppressed.
    pub fn should_prefetch(&self, current_index: usize, active: &Batch) -> bool {
        matches!(self.state, PrefetchState::Idle) && current_index >= active.midpoint()
    }

    /// Claim the single fetch slot
    ///
    /// Returns `None` when a fetch is already in flight. A prefetch is also
    /// refused while a batch is staged or prefetch is suppressed; initial and
    /// fallback fetches may run from `Suppressed` (the hand-off they replace
    /// produced nothing usable).
    pub fn begin(&mut self, purpose: FetchPurpose) -> Option<FetchTicket> {
        let allowed = match (&self.state, purpose) {
            (PrefetchState::Fetching(ticket), _) => {
                debug!(in_flight = ?ticket, requested = %purpose, "Fetch already in flight; request ignored");
                false
            }
            (PrefetchState::Idle, _) => true,
            (PrefetchState::Suppressed, FetchPurpose::Prefetch) => false,
            (PrefetchState::Suppressed, _) => true,
            (PrefetchState::Staged(_), _) => false,
        };
        if !allowed {
            return None;
        }

        let ticket = FetchTicket {
            seq: self.next_seq,
            purpose,
        };
        self.next_seq += 1;
        self.state = PrefetchState::Fetching(ticket);
        Some(ticket)
    }

    /// Record the completion of a BatchSource call
    pub fn complete(&mut self, ticket: FetchTicket, result: Result<Vec<Ad>, Error>) -> FetchOutcome {
        match &self.state {
            PrefetchState::Fetching(current) if *current == ticket => {}
            _ => return FetchOutcome::Stale,
        }

        match result {
            Ok(ads) => {
                let batch = Batch::new(ticket.seq, ads);
                match ticket.purpose {
                    FetchPurpose::Prefetch => {
                        let outcome = FetchOutcome::Staged {
                            cycle_number: batch.cycle_number,
                            ad_count: batch.len(),
                        };
                        self.state = PrefetchState::Staged(batch);
                        outcome
                    }
                    FetchPurpose::Initial | FetchPurpose::Fallback => {
                        self.state = PrefetchState::Idle;
                        FetchOutcome::Ready(batch)
                    }
                }
            }
            Err(error) => {
                self.state = PrefetchState::Idle;
                FetchOutcome::Failed {
                    purpose: ticket.purpose,
                    error,
                }
            }
        }
    }

    /// Hand the staged batch to the controller and suppress prefetching
    pub fn take_staged(&mut self) -> Option<Batch> {
        match std::mem::replace(&mut self.state, PrefetchState::Suppressed) {
            PrefetchState::Staged(batch) => Some(batch),
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Lift suppression at the start of the next cycle
    pub fn unblock(&mut self) {
        if self.state == PrefetchState::Suppressed {
            self.state = PrefetchState::Idle;
        }
    }

    pub fn status(&self, is_batch_exhausted: bool) -> PrefetchStatus {
        PrefetchStatus {
            staged_batch: match &self.state {
                PrefetchState::Staged(batch) => Some(batch.clone()),
                _ => None,
            },
            is_fetch_in_flight: self.is_in_flight(),
            is_batch_exhausted,
            is_fetch_suppressed: self.state == PrefetchState::Suppressed,
        }
    }
}

impl Default for PrefetchManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ads(n: usize) -> Vec<Ad> {
        (0..n).map(|i| Ad::new(format!("ad{i}"), format!("https://cdn/{i}.mp4"))).collect()
    }

    #[test]
    fn test_trigger_at_midpoint() {
        let manager = PrefetchManager::new();
        let two = Batch::new(1, ads(2));
        assert!(!manager.should_prefetch(0, &two));
        assert!(manager.should_prefetch(1, &two));

        let one = Batch::new(1, ads(1));
        assert!(manager.should_prefetch(0, &one));
    }

    #[test]
    fn test_single_flight() {
        let mut manager = PrefetchManager::new();
        let first = manager.begin(FetchPurpose::Prefetch).unwrap();
        assert!(manager.is_in_flight());

        // Concurrent manual prefetch is a no-op, and so is a fallback
        assert!(manager.begin(FetchPurpose::Prefetch).is_none());
        assert!(manager.begin(FetchPurpose::Fallback).is_none());

        assert!(matches!(
            manager.complete(first, Ok(ads(2))),
            FetchOutcome::Staged { cycle_number: 1, ad_count: 2 }
        ));
        assert!(!manager.is_in_flight());
    }

    #[test]
    fn test_staged_batch_is_never_replaced() {
        let mut manager = PrefetchManager::new();
        let ticket = manager.begin(FetchPurpose::Prefetch).unwrap();
        manager.complete(ticket, Ok(ads(3)));

        assert!(manager.begin(FetchPurpose::Prefetch).is_none());
        assert!(!manager.should_prefetch(5, &Batch::new(9, ads(2))));
        assert_eq!(manager.status(false).staged_batch.unwrap().len(), 3);
    }

    #[test]
    fn test_hand_off_suppresses_until_unblocked() {
        let mut manager = PrefetchManager::new();
        let ticket = manager.begin(FetchPurpose::Prefetch).unwrap();
        manager.complete(ticket, Ok(ads(2)));

        let batch = manager.take_staged().unwrap();
        assert_eq!(batch.cycle_number, ticket.seq);
        assert!(manager.status(false).is_fetch_suppressed);
        assert!(manager.begin(FetchPurpose::Prefetch).is_none());
        assert!(!manager.should_prefetch(1, &batch));

        manager.unblock();
        assert!(manager.should_prefetch(1, &batch));
    }

    #[test]
    fn test_take_staged_without_batch_keeps_state() {
        let mut manager = PrefetchManager::new();
        assert!(manager.take_staged().is_none());
        assert_eq!(*manager.state(), PrefetchState::Idle);

        let ticket = manager.begin(FetchPurpose::Prefetch).unwrap();
        assert!(manager.take_staged().is_none());
        assert_eq!(*manager.state(), PrefetchState::Fetching(ticket));
    }

    #[test]
    fn test_failure_returns_to_idle() {
        let mut manager = PrefetchManager::new();
        let ticket = manager.begin(FetchPurpose::Prefetch).unwrap();
        let outcome = manager.complete(ticket, Err(Error::Fetch("503".to_string())));

        assert!(matches!(
            outcome,
            FetchOutcome::Failed { purpose: FetchPurpose::Prefetch, .. }
        ));
        assert_eq!(*manager.state(), PrefetchState::Idle);
        assert!(manager.status(false).staged_batch.is_none());
    }

    #[test]
    fn test_fallback_result_is_ready_not_staged() {
        let mut manager = PrefetchManager::new();
        let ticket = manager.begin(FetchPurpose::Fallback).unwrap();
        match manager.complete(ticket, Ok(ads(1))) {
            FetchOutcome::Ready(batch) => assert_eq!(batch.len(), 1),
            other => panic!("expected Ready, got {:?}", other),
        }
        assert_eq!(*manager.state(), PrefetchState::Idle);
    }

    #[test]
    fn test_stale_completion_is_ignored() {
        let mut manager = PrefetchManager::new();
        let old = manager.begin(FetchPurpose::Initial).unwrap();
        manager.complete(old, Err(Error::FetchTimeout(10)));
        let current = manager.begin(FetchPurpose::Initial).unwrap();

        assert!(matches!(manager.complete(old, Ok(ads(2))), FetchOutcome::Stale));
        assert_eq!(*manager.state(), PrefetchState::Fetching(current));
    }

    #[test]
    fn test_fallback_allowed_from_suppressed() {
        let mut manager = PrefetchManager::new();
        let ticket = manager.begin(FetchPurpose::Prefetch).unwrap();
        manager.complete(ticket, Ok(Vec::new()));
        let empty = manager.take_staged().unwrap();
        assert!(empty.is_empty());

        assert!(manager.begin(FetchPurpose::Fallback).is_some());
    }
}
