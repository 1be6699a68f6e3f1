//! Session-level type definitions
//!
//! Supporting types for session lifecycle and batch fetch bookkeeping.

use serde::{Deserialize, Serialize};

/// Why a screensaver session asked the host to take over again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ExitReason {
    /// A human touched the device
    Activity,
    /// The exit action was chosen from the overlay (e.g. "no ads available")
    UserExit,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::Activity => write!(f, "Activity"),
            ExitReason::UserExit => write!(f, "UserExit"),
        }
    }
}

/// Why a session stopped running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum EndReason {
    /// Human input was detected
    Activity,
    /// The exit action was requested
    UserExit,
    /// The host tore the session down
    Teardown,
}

impl From<ExitReason> for EndReason {
    fn from(reason: ExitReason) -> Self {
        match reason {
            ExitReason::Activity => EndReason::Activity,
            ExitReason::UserExit => EndReason::UserExit,
        }
    }
}

/// What a batch fetch is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum FetchPurpose {
    /// First batch of the session
    Initial,
    /// Background fetch of the next batch while the current one still plays
    Prefetch,
    /// Fresh fetch after the active batch ran out with nothing staged
    Fallback,
}

impl std::fmt::Display for FetchPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchPurpose::Initial => write!(f, "Initial"),
            FetchPurpose::Prefetch => write!(f, "Prefetch"),
            FetchPurpose::Fallback => write!(f, "Fallback"),
        }
    }
}
