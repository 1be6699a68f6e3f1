//! # Kiosk Ad Player Library (kiosk-ads)
//!
//! Screensaver-style video ad playback for unattended kiosks.
//!
//! **Purpose:** Cycle through batches of video ads fetched from a remote
//! source, prefetching the next batch mid-way through the current one,
//! negotiating autoplay with the playback surface, and dismissing the
//! screensaver on the first human input.
//!
//! **Architecture:** One actor task per session owns a sans-IO
//! [`playback::PlaybackController`]; every callback is queued and
//! processed in order.

pub mod activity;
pub mod config;
pub mod error;
pub mod headless;
pub mod playback;
pub mod scheduler;
pub mod source;
pub mod state;
pub mod surface;

pub use error::{Error, Result};
pub use playback::{Engine, EngineDeps, EngineHandle};
pub use state::SharedState;
