//! Ad batch source
//!
//! The engine only ever talks to a [`BatchSource`] through the prefetch
//! manager's single-flight guard, so implementations never see concurrent
//! calls for the same device. An empty list is a successful answer, distinct
//! from an error.

use async_trait::async_trait;
use kiosk_common::{Ad, DeviceId};
use std::time::Duration;
use tracing::debug;

use crate::config::SourceConfig;
use crate::error::{Error, Result};

/// Supplier of ordered ad lists for a device
#[async_trait]
pub trait BatchSource: Send + Sync {
    /// Fetch the next ordered list of ads for `device_id`
    ///
    /// Must be safe to retry.
    async fn fetch(&self, device_id: &DeviceId) -> Result<Vec<Ad>>;
}

/// HTTP batch source: `GET {base_url}/devices/{device_id}/ads`
///
/// The endpoint answers with a JSON array of ads.
pub struct HttpBatchSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBatchSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        Self::new(config.base_url.clone(), config.request_timeout())
    }

    fn url_for(&self, device_id: &DeviceId) -> String {
        format!("{}/devices/{}/ads", self.base_url, device_id)
    }
}

#[async_trait]
impl BatchSource for HttpBatchSource {
    async fn fetch(&self, device_id: &DeviceId) -> Result<Vec<Ad>> {
        let url = self.url_for(device_id);
        debug!(url = %url, "Requesting ad batch");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Fetch(format!("{} returned {}", url, status)));
        }

        let ads: Vec<Ad> = response.json().await?;
        debug!(count = ads.len(), "Received ad batch");
        Ok(ads)
    }
}
