//! Error types for audioscribe
//!
//! This module provides the error handling for the crate:
//! - The crate-wide [`Error`] type and [`Result`] alias
//! - [`StageError`], the per-stage failure of a pipeline job
//! - [`TransportError`], failures of the messaging transport
//! - Machine-readable error codes for logs and events

use crate::types::{JobId, OwnerId, Stage};
use std::time::Duration;
use thiserror::Error;

/// Result type alias for audioscribe operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for audioscribe
///
/// Each variant carries enough context to produce a useful log line or
/// user-facing message without exposing raw internal payloads.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "BOT_TOKEN")
        key: Option<String>,
    },

    /// Owner already runs the maximum number of concurrent jobs
    #[error("owner {owner} already has {limit} active jobs")]
    AdmissionRejected {
        /// The owner whose admission was rejected
        owner: OwnerId,
        /// The per-owner concurrency bound that was hit
        limit: usize,
    },

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// A pipeline stage failed
    #[error(transparent)]
    Stage(#[from] StageError),

    /// Messaging transport error
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A job attempted an out-of-order stage transition
    #[error("job {job} cannot move from {from} to {to}")]
    InvalidTransition {
        /// The job that attempted the transition
        job: JobId,
        /// The stage the job was in
        from: Stage,
        /// The stage that was requested
        to: Stage,
    },

    /// Remote service answered with a non-success status
    #[error("{service} returned status {status}: {body}")]
    Remote {
        /// Name of the remote service (e.g., "transfer.sh")
        service: &'static str,
        /// HTTP status code
        status: u16,
        /// Response body (possibly truncated)
        body: String,
    },

    /// Remote service answered successfully but with an unusable payload
    #[error("{service} returned an invalid response: {reason}")]
    InvalidResponse {
        /// Name of the remote service
        service: &'static str,
        /// What was wrong with the payload
        reason: String,
    },

    /// An external call did not finish within its configured timeout
    #[error("{operation} timed out after {}s", after.as_secs())]
    Timeout {
        /// The operation that timed out (e.g., "upload")
        operation: &'static str,
        /// The configured timeout
        after: Duration,
    },

    /// External tool execution failed (ffprobe)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a configuration error for a specific key
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Get the machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::AdmissionRejected { .. } => "admission_rejected",
            Error::ShuttingDown => "shutting_down",
            Error::Stage(e) => e.code(),
            Error::Transport(_) => "transport_error",
            Error::InvalidTransition { .. } => "invalid_transition",
            Error::Remote { .. } => "remote_error",
            Error::InvalidResponse { .. } => "invalid_response",
            Error::Timeout { .. } => "timeout",
            Error::ExternalTool(_) => "external_tool_error",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::Other(_) => "internal_error",
        }
    }
}

/// Failure of a single pipeline stage
///
/// Every variant carries the cause text that ends up in the user-facing
/// status message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StageError {
    /// Unsupported attachment kind or audio container, or the input could not be prepared
    #[error("validation failed: {0}")]
    Validation(String),

    /// The blob upload failed
    #[error("upload failed: {0}")]
    Upload(String),

    /// Transcription failed or produced no text
    #[error("transcription failed: {0}")]
    Transcription(String),

    /// Both formatting backends failed
    #[error("formatting failed (both backends): {0}")]
    Formatting(String),

    /// Delivering the result to the transport failed
    #[error("delivery failed: {0}")]
    Delivery(String),
}

impl StageError {
    /// Wrap `cause` as the failure of `stage`
    ///
    /// Terminal stages have no failure of their own and are attributed to
    /// delivery, the last working stage.
    pub fn at(stage: Stage, cause: impl Into<String>) -> Self {
        let cause = cause.into();
        match stage {
            Stage::Pending => StageError::Validation(cause),
            Stage::Uploading => StageError::Upload(cause),
            Stage::Transcribing => StageError::Transcription(cause),
            Stage::Formatting => StageError::Formatting(cause),
            Stage::Delivering | Stage::Completed | Stage::Failed => StageError::Delivery(cause),
        }
    }

    /// The pipeline stage this error belongs to
    ///
    /// Validation happens before the first stage, so it maps to [`Stage::Pending`].
    pub fn stage(&self) -> Stage {
        match self {
            StageError::Validation(_) => Stage::Pending,
            StageError::Upload(_) => Stage::Uploading,
            StageError::Transcription(_) => Stage::Transcribing,
            StageError::Formatting(_) => Stage::Formatting,
            StageError::Delivery(_) => Stage::Delivering,
        }
    }

    /// The underlying cause, without the stage prefix
    pub fn cause(&self) -> &str {
        match self {
            StageError::Validation(c)
            | StageError::Upload(c)
            | StageError::Transcription(c)
            | StageError::Formatting(c)
            | StageError::Delivery(c) => c,
        }
    }

    /// Get the machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            StageError::Validation(_) => "validation_error",
            StageError::Upload(_) => "upload_error",
            StageError::Transcription(_) => "transcription_error",
            StageError::Formatting(_) => "formatting_error",
            StageError::Delivery(_) => "delivery_error",
        }
    }
}

/// Messaging transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport rejected or failed the request
    #[error("request failed: {0}")]
    Request(String),

    /// Message text exceeds the per-call limit (a caller bug)
    #[error("message of {len} characters exceeds the {max} character limit")]
    MessageTooLong {
        /// Length of the rejected text in characters
        len: usize,
        /// The transport's limit
        max: usize,
    },

    /// Downloading a file from the transport failed
    #[error("file download failed: {0}")]
    Download(String),
}
