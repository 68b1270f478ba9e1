//! HTTP clients for the remote services a job talks to.
//!
//! The pipeline only sees the [`Uploader`] and [`Transcriber`] traits;
//! the concrete clients here are the production implementations.

mod transcription;
mod upload;

pub use transcription::{FalWhisperTranscriber, Transcriber};
pub use upload::{TransferShUploader, Uploader};

/// Longest error body kept in error messages
const MAX_ERROR_BODY: usize = 500;

/// Turn a non-success response into [`crate::Error::Remote`]
async fn remote_error(service: &'static str, response: reqwest::Response) -> crate::Error {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    crate::Error::Remote {
        service,
        status,
        body: body.chars().take(MAX_ERROR_BODY).collect(),
    }
}
