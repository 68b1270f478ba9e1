//! In-place progress reporting for a running job.

use crate::error::StageError;
use crate::transport::Transport;
use crate::types::{MessageRef, Stage};
use std::sync::Arc;
use std::time::Duration;

/// Text of the reply that becomes a job's progress message
pub const PROCESSING_LABEL: &str = "⏳ Processing your audio...";

/// Header placed above the delivered result
pub const RESULT_HEADER: &str = "✨ Done! Here is your formatted text:";

/// Keeps one message up to date with the job's current stage
#[derive(Clone)]
pub struct ProgressReporter {
    transport: Arc<dyn Transport>,
    call_timeout: Duration,
}

impl ProgressReporter {
    /// Create a reporter whose edits are bounded by `call_timeout`
    pub fn new(transport: Arc<dyn Transport>, call_timeout: Duration) -> Self {
        Self {
            transport,
            call_timeout,
        }
    }

    /// Replace the content of `handle` with `label`
    ///
    /// Progress is best effort: a failed or timed-out edit is logged and
    /// reported as `false`, never as an error.
    pub async fn report(&self, handle: MessageRef, label: &str) -> bool {
        match tokio::time::timeout(self.call_timeout, self.transport.edit_message(handle, label))
            .await
        {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::warn!(
                    chat_id = handle.chat_id,
                    message_id = handle.message_id,
                    error = %e,
                    "progress update failed"
                );
                false
            }
            Err(_) => {
                tracing::warn!(
                    chat_id = handle.chat_id,
                    message_id = handle.message_id,
                    timeout_secs = self.call_timeout.as_secs(),
                    "progress update timed out"
                );
                false
            }
        }
    }
}

/// Label shown while a working stage runs
pub fn stage_label(stage: Stage) -> Option<&'static str> {
    match stage {
        Stage::Uploading => Some("🔄 Uploading file... (1/4)\n└ Preparing file for processing"),
        Stage::Transcribing => Some("🎯 Transcribing audio... (2/4)\n└ Converting speech to text"),
        Stage::Formatting => Some("📝 Formatting text... (3/4)\n└ Improving readability"),
        Stage::Delivering => Some("✨ Final step... (4/4)\n└ Preparing the result"),
        _ => None,
    }
}

/// Terminal text shown when a job fails
pub fn failure_label(error: &StageError) -> String {
    match error.stage().step() {
        Some(step) => format!(
            "❌ Processing failed at stage {}/{} ({}):\n└ {}",
            step,
            Stage::TOTAL_STEPS,
            error.stage(),
            error.cause()
        ),
        None => format!("❌ Could not process the file:\n└ {}", error.cause()),
    }
}
