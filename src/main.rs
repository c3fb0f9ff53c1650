mod checker;
mod config;
mod error;
mod notify;
mod portal;
mod scheduler;
mod snapshot;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::CheckerConfig;
use crate::notify::{DiscordNotifier, Notifier};
use crate::portal::{IcbcPortal, PortalDriver};
use crate::scheduler::CheckScheduler;

const APP_LOG_FILE: &str = "icbc_checker.log";
const DRIVER_LOG_FILE: &str = "chromedriver.log";
const MANAGED_DRIVER_PORT: u16 = 9515;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let _log_guard = setup_logging();

    tracing::info!("Starting ICBC appointment checker");

    // Missing or invalid configuration is fatal before the loop starts.
    let config = CheckerConfig::from_env()?;

    let driver = match &config.webdriver_url {
        Some(url) => {
            tracing::info!(%url, "using externally managed WebDriver endpoint");
            PortalDriver::external(url)
        }
        None => PortalDriver::spawn(MANAGED_DRIVER_PORT, DRIVER_LOG_FILE)
            .await
            .context("could not start the browser driver")?,
    };

    let portal = IcbcPortal::new(driver.url(), &config);
    let notifier = DiscordNotifier::new(&config.discord_token, config.discord_channel_id);

    if let Err(e) = notifier.send(&startup_message(&config)).await {
        tracing::warn!("failed to send startup notification: {e}");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = CheckScheduler::new(portal, notifier, &config);
    let loop_handle = tokio::spawn(scheduler.run(shutdown_rx));

    tracing::info!("Checker running. Press Ctrl+C to stop.");
    signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, stopping...");

    let _ = shutdown_tx.send(true);
    let _ = loop_handle.await;
    driver.shutdown().await;

    tracing::info!("ICBC appointment checker stopped");
    Ok(())
}

/// Application events go to stdout and to the append-only log file; the
/// returned guard must live until exit so buffered lines are flushed.
fn setup_logging() -> tracing_appender::non_blocking::WorkerGuard {
    let appender = tracing_appender::rolling::never(".", APP_LOG_FILE);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "icbc_checker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().compact())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .init();

    guard
}

fn startup_message(config: &CheckerConfig) -> String {
    format!(
        "**ICBC appointment checker started**\n\
         Watching {} every {} minutes.\n\
         You'll hear about new appointments, status changes, and any errors during checking.",
        config.location,
        config.interval_minutes()
    )
}
