//! # audioscribe
//!
//! Telegram bot that turns voice and audio messages into formatted text.
//!
//! ## Design
//!
//! - **Bounded per owner** - each user runs at most a fixed number of jobs at
//!   once; extra submissions are rejected immediately, never queued
//! - **Exactly-once cleanup** - a job's registry slot is released on every
//!   exit path, including panics
//! - **Swappable collaborators** - transport, upload, speech-to-text,
//!   formatting and probing all sit behind traits
//! - **Event-driven** - consumers subscribe to [`Event`]s
//!
//! ## Pipeline
//!
//! Every admitted attachment is downloaded into a job-owned temp file,
//! probed, then driven through four stages while one progress message is
//! edited in place:
//!
//! 1. upload to a transfer.sh host
//! 2. transcription (fal.ai Whisper)
//! 3. formatting, with a primary and a secondary backend
//! 4. delivery, split into messages that fit Telegram's limit
//!
//! ## Quick Start
//!
//! ```no_run
//! use audioscribe::{Config, TranscriptionBot, run_with_shutdown};
//! use audioscribe::pipeline::Collaborators;
//! # fn collaborators(_: &Config) -> Collaborators { unimplemented!() }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let bot = TranscriptionBot::new(&config, collaborators(&config))?;
//!
//!     let mut events = bot.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     run_with_shutdown(bot, tokio_util::sync::CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Bot service: commands, admission, lifecycle
pub mod bot;
/// HTTP clients for upload and transcription
pub mod clients;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Transcript formatting with fallback
pub mod formatting;
/// Per-job pipeline
pub mod pipeline;
/// Audio container probing
pub mod probe;
/// Per-owner job registry
pub mod registry;
/// Messaging transport
pub mod transport;
/// Core types and events
pub mod types;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use bot::TranscriptionBot;
pub use config::Config;
pub use error::{Error, Result, StageError, TransportError};
pub use registry::{JobRegistry, JobSlot};
pub use types::{Attachment, Event, InboundContent, InboundMessage, JobId, MessageRef, OwnerId, Stage};

use tokio_util::sync::CancellationToken;

/// Run the bot until a termination signal, then shut it down gracefully.
///
/// Returns when either a signal arrives or `polling` is cancelled (for
/// example because another instance took over the bot token). In both cases
/// `polling` is cancelled and [`TranscriptionBot::shutdown`] is awaited.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn run_with_shutdown(bot: TranscriptionBot, polling: CancellationToken) -> Result<()> {
    tokio::select! {
        _ = wait_for_signal() => {}
        _ = polling.cancelled() => {
            tracing::warn!("Update polling stopped, shutting down");
        }
    }
    polling.cancel();
    bot.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments (containers, tests)
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(_), Err(_)) => {
            tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
