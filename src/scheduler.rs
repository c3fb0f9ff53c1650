//! Fixed-interval poll loop: fetch, compare, notify, sleep.

use crate::checker::CheckerState;
use crate::config::{CheckerConfig, CompareKey};
use crate::notify::Notifier;
use crate::portal::AppointmentSource;
use std::time::Duration;
use tokio::sync::watch;

/// Runs the sequential poll cycle until told to stop. One task, no shared
/// state: the checker state lives here and nowhere else.
pub struct CheckScheduler<S, N> {
    source: S,
    notifier: N,
    state: CheckerState,
    interval: Duration,
    location: String,
    compare_key: CompareKey,
}

impl<S: AppointmentSource, N: Notifier> CheckScheduler<S, N> {
    pub fn new(source: S, notifier: N, config: &CheckerConfig) -> Self {
        Self {
            source,
            notifier,
            state: CheckerState::new(),
            interval: config.check_interval,
            location: config.location.clone(),
            compare_key: config.compare_key,
        }
    }

    /// Poll until `shutdown` flips. The signal interrupts the inter-poll
    /// sleep, so the loop winds down within one interval tick.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            interval = ?self.interval,
            location = %self.location,
            "poll loop started"
        );

        loop {
            self.run_cycle().await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => {
                    tracing::info!("poll loop stopping");
                    break;
                }
            }
        }
    }

    async fn run_cycle(&mut self) {
        tracing::debug!("running appointment check cycle");

        let planned = match self.source.fetch().await {
            Ok(snapshot) => {
                tracing::info!(availability = ?snapshot.availability, "check succeeded");
                self.state.observe_success(snapshot, self.compare_key)
            }
            Err(e) => {
                tracing::error!(
                    streak = self.state.failure_streak() + 1,
                    "check failed: {e}"
                );
                self.state.observe_failure(&e.to_string()).into_iter().collect()
            }
        };

        for notification in planned {
            let message = notification.render(&self.location, self.interval.as_secs() / 60);
            // A failed notification is logged and dropped; it never blocks
            // or retries the poll cycle.
            if let Err(e) = self.notifier.send(&message).await {
                tracing::error!("failed to send notification: {e}");
            }
        }
    }
}
