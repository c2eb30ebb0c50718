//! Binary runner utilities
//!
//! Standard banner, periodic status line and Ctrl+C handling for the
//! long-running binaries.

use std::time::Duration;
use tracing::{info, warn};

/// Configuration for running a binary application
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Name of the binary (for logging)
    pub name: String,
    /// Interval between status lines in seconds
    pub status_interval_secs: u64,
}

impl RunConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status_interval_secs: 60,
        }
    }

    pub fn with_status_interval(mut self, secs: u64) -> Self {
        self.status_interval_secs = secs.max(1);
        self
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs)
    }
}

/// A long-running binary: log a status line periodically until Ctrl+C,
/// then clean up
pub trait BinaryRunner {
    fn config(&self) -> &RunConfig;

    /// One status line, logged every `status_interval_secs`
    fn status(&self) -> String;

    /// Release resources after the stop signal
    async fn shutdown(&mut self) -> anyhow::Result<()>;

    fn print_banner(&self) {
        let config = self.config();
        info!("");
        info!("========================================");
        info!("Starting {}", config.name);
        info!("Press Ctrl+C to stop");
        info!("========================================");
        info!("");
    }

    fn print_shutdown(&self, stats: Option<&str>) {
        let config = self.config();
        info!("");
        info!("========================================");
        info!("{} stopped gracefully", config.name);
        if let Some(stats) = stats {
            info!("{}", stats);
        }
        info!("========================================");
    }

    /// Run until Ctrl+C, then shut down
    async fn execute(&mut self) -> anyhow::Result<()> {
        self.print_banner();

        let mut ticker = tokio::time::interval(self.config().status_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let stop = wait_for_shutdown();
        tokio::pin!(stop);

        loop {
            tokio::select! {
                _ = &mut stop => break,
                _ = ticker.tick() => info!("{}", self.status()),
            }
        }

        let stats = self.status();
        let result = self.shutdown().await;
        self.print_shutdown(Some(&stats));
        result
    }
}

/// Resolve on Ctrl+C
pub async fn wait_for_shutdown() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
