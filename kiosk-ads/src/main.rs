//! Kiosk Ad Player (kiosk-ads) - Main entry point
//!
//! Runs the inactivity scheduler against the HTTP batch source with a
//! headless playback surface. Each line typed on stdin counts as input.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

use kiosk_ads::activity::ActivityRegistry;
use kiosk_ads::config::{Config, ConfigOverrides};
use kiosk_ads::headless::{spawn_stdin_activity, SimulatedSurface};
use kiosk_ads::playback::EngineDeps;
use kiosk_ads::scheduler::InactivityScheduler;
use kiosk_ads::source::HttpBatchSource;
use kiosk_common::config::{resolve_config_path, CONFIG_ENV_VAR};

/// Command-line arguments for kiosk-ads
#[derive(Parser, Debug)]
#[command(name = "kiosk-ads")]
#[command(about = "Screensaver ad player for unattended kiosks")]
#[command(version)]
struct Args {
    /// Path to TOML config file
    #[arg(short, long, env = "KIOSK_CONFIG")]
    config: Option<PathBuf>,

    /// Device identifier sent to the ad source
    #[arg(short, long, env = "KIOSK_DEVICE_ID")]
    device_id: Option<String>,

    /// Base URL of the ad source
    #[arg(short, long, env = "KIOSK_SOURCE_URL")]
    source_url: Option<String>,

    /// Simulated length of each ad in seconds
    #[arg(long, default_value = "15", env = "KIOSK_AD_SECONDS")]
    ad_seconds: u64,

    /// Only allow muted autoplay on the simulated surface
    #[arg(long)]
    muted_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing; the filter is replaced once the config is loaded
    let (filter, filter_handle) = reload::Layer::new(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "kiosk_ads=info,kiosk_common=info".into()),
    );
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse command-line arguments
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref(), CONFIG_ENV_VAR);
    let config = Config::load(
        config_path.as_deref(),
        ConfigOverrides {
            device_id: args.device_id.clone(),
            source_url: args.source_url.clone(),
        },
    )
    .context("Failed to load configuration")?;

    if std::env::var_os("RUST_LOG").is_none() {
        let level = &config.logging.level;
        filter_handle
            .modify(|filter| *filter = EnvFilter::new(format!("kiosk_ads={level},kiosk_common={level}")))
            .context("Failed to apply configured log level")?;
    }

    info!("Starting kiosk ad player for device {}", config.device_id);
    info!("Ad source: {}", config.source.base_url);

    let source = HttpBatchSource::from_config(&config.source).context("Failed to build ad source client")?;
    let surface = SimulatedSurface::new(Duration::from_secs(args.ad_seconds)).muted_only(args.muted_only);
    let registry = Arc::new(ActivityRegistry::new());
    let _stdin = spawn_stdin_activity(Arc::clone(&registry));

    let deps = EngineDeps {
        source: Arc::new(source),
        surface: Arc::new(surface),
        activity: registry,
        device_id: config.device_id.clone(),
        settings: config.playback.clone(),
    };

    let shutdown = CancellationToken::new();
    let scheduler = tokio::spawn(InactivityScheduler::new(deps, config.idle.idle_after()).run(shutdown.clone()));

    shutdown_signal().await;
    shutdown.cancel();
    let sessions = scheduler.await.context("Scheduler task failed")?;

    info!("Shutdown complete after {} screensaver sessions", sessions);
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
