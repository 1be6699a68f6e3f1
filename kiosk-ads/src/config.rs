//! Configuration management for the kiosk ad player
//!
//! A single TOML bootstrap file describes the device, the batch source and
//! the engine timings. Every section has built-in defaults, so a missing
//! file only costs a warning.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments (--device-id, --source-url)
//! 2. Environment variables (via clap `env`)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)

use crate::error::{Error, Result};
use kiosk_common::config::LoggingConfig;
use kiosk_common::DeviceId;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    /// Device identifier sent to the batch source
    #[serde(default)]
    pub device_id: Option<String>,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub playback: PlaybackSettings,

    #[serde(default)]
    pub idle: IdleConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Batch source endpoint
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SourceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request HTTP timeout
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl SourceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Engine timings
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlaybackSettings {
    /// Delay before the delayed-retry autoplay strategy runs
    pub autoplay_retry_delay_ms: u64,

    /// Number of delayed retries after unmuted and muted starts fail
    pub delayed_retries: u32,

    /// Grace period between autoplay exhaustion and the manual-start prompt
    pub manual_start_grace_ms: u64,

    /// Upper bound on a single batch fetch
    pub fetch_timeout_ms: u64,

    /// Wait before retrying a failed initial/fallback fetch
    pub fetch_retry_delay_ms: u64,

    /// Session event bus capacity
    pub event_bus_capacity: usize,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            autoplay_retry_delay_ms: 1000,
            delayed_retries: 1,
            manual_start_grace_ms: 1500,
            fetch_timeout_ms: 15_000,
            fetch_retry_delay_ms: 5000,
            event_bus_capacity: 100,
        }
    }
}

impl PlaybackSettings {
    pub fn autoplay_retry_delay(&self) -> Duration {
        Duration::from_millis(self.autoplay_retry_delay_ms)
    }

    pub fn manual_start_grace(&self) -> Duration {
        Duration::from_millis(self.manual_start_grace_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn fetch_retry_delay(&self) -> Duration {
        Duration::from_millis(self.fetch_retry_delay_ms)
    }
}

/// Idle timeout used by the inactivity scheduler
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct IdleConfig {
    #[serde(default = "default_idle_after_ms")]
    pub idle_after_ms: u64,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            idle_after_ms: default_idle_after_ms(),
        }
    }
}

impl IdleConfig {
    pub fn idle_after(&self) -> Duration {
        Duration::from_millis(self.idle_after_ms)
    }
}

fn default_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_request_timeout_ms() -> u64 {
    15_000
}

fn default_idle_after_ms() -> u64 {
    60_000
}

/// Command-line configuration overrides
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub device_id: Option<String>,
    pub source_url: Option<String>,
}

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub device_id: DeviceId,
    pub source: SourceConfig,
    pub playback: PlaybackSettings,
    pub idle: IdleConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from an optional TOML file plus CLI overrides
    ///
    /// A missing file is not fatal: the built-in defaults are used and a
    /// warning is logged. A file that exists but cannot be read or parsed is
    /// an error. A device id must come from somewhere.
    pub fn load(toml_path: Option<&Path>, overrides: ConfigOverrides) -> Result<Self> {
        let toml_config = match toml_path {
            Some(path) if !path.exists() => {
                warn!("Config file {:?} not found; using built-in defaults", path);
                TomlConfig::default()
            }
            Some(path) => {
                let config = kiosk_common::config::load_toml::<TomlConfig>(path)?;
                info!("Loaded TOML configuration from {:?}", path);
                config
            }
            None => {
                warn!("No configuration file found; using built-in defaults");
                TomlConfig::default()
            }
        };

        Self::from_toml(toml_config, overrides)
    }

    /// Apply CLI overrides on top of parsed TOML
    pub fn from_toml(toml_config: TomlConfig, overrides: ConfigOverrides) -> Result<Self> {
        let device_id = overrides
            .device_id
            .or(toml_config.device_id)
            .ok_or_else(|| Error::Config("device_id is required (--device-id or TOML)".to_string()))?;
        let device_id = DeviceId::new(device_id)?;

        let mut source = toml_config.source;
        if let Some(url) = overrides.source_url {
            source.base_url = url;
        }

        if toml_config.playback.event_bus_capacity == 0 {
            return Err(Error::Config("event_bus_capacity must be at least 1".to_string()));
        }

        Ok(Self {
            device_id,
            source,
            playback: toml_config.playback,
            idle: toml_config.idle,
            logging: toml_config.logging,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_timings() {
        let settings = PlaybackSettings::default();
        assert_eq!(settings.autoplay_retry_delay(), Duration::from_secs(1));
        assert_eq!(settings.delayed_retries, 1);
        assert_eq!(settings.manual_start_grace(), Duration::from_millis(1500));
        assert_eq!(settings.fetch_retry_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_partial_playback_section_keeps_defaults() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            device_id = "lobby-01"

            [playback]
            delayed_retries = 2
            "#,
        )
        .unwrap();

        assert_eq!(toml_config.playback.delayed_retries, 2);
        assert_eq!(toml_config.playback.fetch_timeout_ms, 15_000);
        assert_eq!(toml_config.source, SourceConfig::default());
        assert_eq!(toml_config.idle.idle_after(), Duration::from_secs(60));
    }

    #[test]
    fn test_cli_overrides_win() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            device_id = "from-file"

            [source]
            base_url = "http://file.example/api"
            "#,
        )
        .unwrap();

        let config = Config::from_toml(
            toml_config,
            ConfigOverrides {
                device_id: Some("from-cli".to_string()),
                source_url: Some("http://cli.example/api".to_string()),
            },
        )
        .unwrap();

        assert_eq!(config.device_id.as_str(), "from-cli");
        assert_eq!(config.source.base_url, "http://cli.example/api");
    }

    #[test]
    fn test_missing_device_id_is_an_error() {
        let err = Config::from_toml(TomlConfig::default(), ConfigOverrides::default()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = Config::load(
            Some(Path::new("/nonexistent/kiosk.toml")),
            ConfigOverrides {
                device_id: Some("kiosk-9".to_string()),
                source_url: None,
            },
        )
        .unwrap();

        assert_eq!(config.source, SourceConfig::default());
        assert_eq!(config.playback, PlaybackSettings::default());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let file = write_config(
            r#"
            device_id = "lobby-01"

            [playback]
            delayed_retries = "two"
            "#,
        );

        let err = Config::load(Some(file.path()), ConfigOverrides::default()).unwrap_err();
        assert!(matches!(err, Error::Common(kiosk_common::Error::Toml(_))), "{err:?}");
    }

    #[test]
    fn test_file_values_are_loaded() {
        let file = write_config(
            r#"
            device_id = "lobby-01"

            [playback]
            delayed_retries = 3
            manual_start_grace_ms = 2500
            "#,
        );

        let config = Config::load(Some(file.path()), ConfigOverrides::default()).unwrap();
        assert_eq!(config.device_id.as_str(), "lobby-01");
        assert_eq!(config.playback.delayed_retries, 3);
        assert_eq!(config.playback.manual_start_grace(), Duration::from_millis(2500));
    }
}
