//! Screensaver playback engine and batch cycling

pub mod autoplay;
pub mod controller;
pub mod engine;
pub(crate) mod events;
pub mod prefetch;
pub mod state;

pub use autoplay::{AutoplayNegotiator, Negotiation, StartStrategy};
pub use controller::PlaybackController;
pub use engine::{Engine, EngineDeps, EngineHandle, ExitCallback, ExitHandle};
pub use prefetch::{PrefetchManager, PrefetchStatus};
pub use state::{EnginePhase, EngineSnapshot, PlaybackState};
