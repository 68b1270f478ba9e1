//! Messaging transport abstraction.
//!
//! The pipeline never talks to Telegram directly; it goes through the
//! [`Transport`] trait so jobs can be driven by an in-memory transport in
//! tests and by [`TelegramTransport`] in production.

mod telegram;

pub use telegram::{TelegramTransport, inbound_from_message, spawn_polling};

use crate::error::TransportError;
use crate::types::MessageRef;
use async_trait::async_trait;
use std::path::Path;

/// Operations the bot needs from a messaging transport
///
/// Every text argument must fit the transport's per-message limit; exceeding
/// it is a caller bug and is reported as [`TransportError::MessageTooLong`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `text` as a reply to `to`, returning the new message
    async fn reply(&self, to: MessageRef, text: &str) -> Result<MessageRef, TransportError>;

    /// Send `text` as a new message in `chat_id`
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<MessageRef, TransportError>;

    /// Replace the content of an existing message
    async fn edit_message(&self, message: MessageRef, text: &str) -> Result<(), TransportError>;

    /// Download a remote file into `destination`
    async fn download_file(&self, file_id: &str, destination: &Path)
    -> Result<(), TransportError>;

    /// Transport name for logging
    fn name(&self) -> &'static str;
}

/// Reject text longer than `max` characters
pub(crate) fn ensure_fits(text: &str, max: usize) -> Result<(), TransportError> {
    let len = text.chars().count();
    if len > max {
        return Err(TransportError::MessageTooLong { len, max });
    }
    Ok(())
}
