//! Error types for kiosk-ads
//!
//! Defines engine-specific error types using thiserror. None of these are
//! fatal to the host: the engine degrades to "show the next ad" or "offer to
//! exit" on every failure path.

use thiserror::Error;

/// Main error type for kiosk-ads
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Batch source rejected the request
    #[error("Batch fetch failed: {0}")]
    Fetch(String),

    /// Batch source did not answer in time
    #[error("Batch fetch timed out after {0}ms")]
    FetchTimeout(u64),

    /// HTTP transport errors from the batch source
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Playback surface refused to start or reported a media error
    #[error("Playback surface error: {0}")]
    Surface(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Errors bubbled up from kiosk-common
    #[error(transparent)]
    Common(#[from] kiosk_common::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using kiosk-ads Error
pub type Result<T> = std::result::Result<T, Error>;
