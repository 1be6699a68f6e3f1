//! # Kiosk Common Library
//!
//! Shared code for the kiosk ad player crates:
//! - Ad data model (Ad, Batch, DeviceId)
//! - Event types (KioskEvent enum) and EventBus
//! - Configuration file resolution
//! - Common error type

pub mod ads;
pub mod config;
pub mod error;
pub mod events;

pub use ads::{Ad, Batch, DeviceId};
pub use error::{Error, Result};
