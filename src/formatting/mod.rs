//! Transcript reformatting with a two-tier backend fallback.
//!
//! [`FormattingFallbackClient`] sends the same prompt and text to a primary
//! [`CompletionBackend`]; if that fails for any reason it tries the secondary
//! once. There are no further tiers and no retry loop.

mod openrouter;

pub use openrouter::OpenRouterBackend;

use crate::error::StageError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// A text-completion backend
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Run `prompt` against `text` and return the completion
    ///
    /// An empty completion must be reported as an error.
    async fn complete(&self, prompt: &str, text: &str) -> crate::Result<String>;

    /// Backend name for logging (typically the model id)
    fn name(&self) -> &str;
}

/// Primary/secondary formatting client
#[derive(Clone)]
pub struct FormattingFallbackClient {
    primary: Arc<dyn CompletionBackend>,
    secondary: Arc<dyn CompletionBackend>,
    prompt: String,
    attempt_timeout: Duration,
}

impl FormattingFallbackClient {
    /// Create a client; each backend attempt is bounded by `attempt_timeout`
    pub fn new(
        primary: Arc<dyn CompletionBackend>,
        secondary: Arc<dyn CompletionBackend>,
        prompt: impl Into<String>,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            primary,
            secondary,
            prompt: prompt.into(),
            attempt_timeout,
        }
    }

    /// Reformat `text`
    ///
    /// # Errors
    ///
    /// Returns [`StageError::Formatting`] carrying the secondary backend's
    /// failure when both backends fail.
    pub async fn format(&self, text: &str) -> Result<String, StageError> {
        match self.attempt(self.primary.as_ref(), text).await {
            Ok(formatted) => return Ok(formatted),
            Err(e) => {
                tracing::warn!(
                    backend = self.primary.name(),
                    error = %e,
                    "primary formatting backend failed, trying secondary"
                );
            }
        }

        self.attempt(self.secondary.as_ref(), text)
            .await
            .map_err(|e| {
                tracing::error!(
                    backend = self.secondary.name(),
                    error = %e,
                    "secondary formatting backend failed"
                );
                StageError::Formatting(e.to_string())
            })
    }

    async fn attempt(&self, backend: &dyn CompletionBackend, text: &str) -> crate::Result<String> {
        let call = backend.complete(&self.prompt, text);
        let completion = tokio::time::timeout(self.attempt_timeout, call)
            .await
            .map_err(|_| crate::Error::Timeout {
                operation: "formatting",
                after: self.attempt_timeout,
            })??;

        if completion.trim().is_empty() {
            return Err(crate::Error::InvalidResponse {
                service: "formatting",
                reason: format!("{} returned an empty completion", backend.name()),
            });
        }
        Ok(completion)
    }
}
