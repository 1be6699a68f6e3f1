//! Advertisement data model
//!
//! An [`Ad`] is immutable once fetched. Ads arrive from the batch source in
//! ordered groups; each group is wrapped in a [`Batch`] tagged with the fetch
//! sequence number that produced it.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// Identifier of the kiosk device requesting ads
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a device identifier, rejecting blank values
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::InvalidInput("device id must not be empty".to_string()));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single video advertisement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ad {
    /// Stable ad identifier
    pub id: String,
    /// Location of the video asset
    pub video_url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl Ad {
    pub fn new(id: impl Into<String>, video_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            video_url: video_url.into(),
            title: String::new(),
            description: String::new(),
        }
    }
}

/// Ordered, finite sequence of ads produced by one fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    /// Sequence number of the fetch that produced this batch
    pub cycle_number: u64,
    ads: Vec<Ad>,
}

impl Batch {
    pub fn new(cycle_number: u64, ads: Vec<Ad>) -> Self {
        Self { cycle_number, ads }
    }

    pub fn len(&self) -> usize {
        self.ads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ads.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Ad> {
        self.ads.get(index)
    }

    pub fn ads(&self) -> &[Ad] {
        &self.ads
    }

    /// Index at which the next batch should be requested: `floor(len / 2)`
    pub fn midpoint(&self) -> usize {
        self.ads.len() / 2
    }
}
