//! Shutdown coordination.

use crate::error::Result;
use crate::types::Event;
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::TranscriptionBot;

/// How often shutdown re-checks the registry
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

impl TranscriptionBot {
    /// Gracefully shut down the bot
    ///
    /// 1. Stops accepting new jobs (new attachments get a "shutting down" reply)
    /// 2. Waits for running jobs to finish, up to the configured grace period
    /// 3. Emits [`Event::Shutdown`]
    ///
    /// Jobs still running after the grace period are left to the runtime;
    /// their slots are released when their tasks are dropped.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.inner.accepting_new.store(false, Ordering::SeqCst);
        tracing::info!("Stopped accepting new jobs");

        let grace = self.inner.shutdown_grace;
        match tokio::time::timeout(grace, self.wait_for_active_jobs()).await {
            Ok(()) => {
                tracing::info!("All active jobs finished");
            }
            Err(_) => {
                tracing::warn!(
                    remaining = self.inner.registry.total_active(),
                    grace_secs = grace.as_secs(),
                    "Timeout waiting for jobs to finish, proceeding with shutdown"
                );
            }
        }

        self.emit(Event::Shutdown);
        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    async fn wait_for_active_jobs(&self) {
        loop {
            let active = self.inner.registry.total_active();
            if active == 0 {
                return;
            }
            tracing::debug!(active, "Waiting for active jobs to finish");
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
    }
}
