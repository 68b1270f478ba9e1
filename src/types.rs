//! Core types and events for audioscribe

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of the user who submitted a job
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub u64);

impl From<u64> for OwnerId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a pipeline job
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl JobId {
    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to one message in one chat
///
/// Used both for the submitted message and for the progress message a job
/// edits in place.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    /// Chat the message lives in
    pub chat_id: i64,
    /// Message id within the chat
    pub message_id: i32,
}

impl MessageRef {
    /// Create a new message reference
    pub fn new(chat_id: i64, message_id: i32) -> Self {
        Self {
            chat_id,
            message_id,
        }
    }
}

/// An audio attachment submitted for processing
///
/// Each case carries only the remote file id the pipeline needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Attachment {
    /// Voice clip recorded in the messenger
    Voice {
        /// Remote file id
        file_id: String,
    },
    /// Audio file sent as music/audio
    Audio {
        /// Remote file id
        file_id: String,
    },
    /// Generic document (validated by probing its container)
    Document {
        /// Remote file id
        file_id: String,
    },
}

impl Attachment {
    /// Remote file id of the attachment
    pub fn file_id(&self) -> &str {
        match self {
            Attachment::Voice { file_id }
            | Attachment::Audio { file_id }
            | Attachment::Document { file_id } => file_id,
        }
    }

    /// Short label for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Attachment::Voice { .. } => "voice",
            Attachment::Audio { .. } => "audio",
            Attachment::Document { .. } => "document",
        }
    }
}

/// What an inbound message carries
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundContent {
    /// A bot command without the leading slash (e.g., "start")
    Command(String),
    /// An audio attachment
    Attachment(Attachment),
    /// Plain text or unsupported media
    Other,
}

/// A message received from the transport
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    /// The message itself (jobs reply to it)
    pub message: MessageRef,
    /// The submitting user
    pub owner: OwnerId,
    /// Parsed content
    pub content: InboundContent,
}

/// Pipeline stage of a job
///
/// Jobs advance strictly in declaration order; `Failed` is reachable from
/// every non-terminal stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Admitted, input not yet uploaded
    Pending,
    /// Uploading the audio to the blob service
    Uploading,
    /// Waiting for the speech-to-text service
    Transcribing,
    /// Reformatting the transcript
    Formatting,
    /// Sending the result to the submitter
    Delivering,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
}

impl Stage {
    /// Number of working stages in the pipeline
    pub const TOTAL_STEPS: u8 = 4;

    /// The stage that follows this one on the success path
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Pending => Some(Stage::Uploading),
            Stage::Uploading => Some(Stage::Transcribing),
            Stage::Transcribing => Some(Stage::Formatting),
            Stage::Formatting => Some(Stage::Delivering),
            Stage::Delivering => Some(Stage::Completed),
            Stage::Completed | Stage::Failed => None,
        }
    }

    /// 1-based step number of a working stage
    pub fn step(self) -> Option<u8> {
        match self {
            Stage::Uploading => Some(1),
            Stage::Transcribing => Some(2),
            Stage::Formatting => Some(3),
            Stage::Delivering => Some(4),
            _ => None,
        }
    }

    /// Whether the job has finished
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }

    /// Whether `to` is a legal transition from this stage
    pub fn can_transition_to(self, to: Stage) -> bool {
        if to == Stage::Failed {
            return !self.is_terminal();
        }
        self.next() == Some(to)
    }

    /// Lowercase name used in logs and messages
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Pending => "pending",
            Stage::Uploading => "upload",
            Stage::Transcribing => "transcription",
            Stage::Formatting => "formatting",
            Stage::Delivering => "delivery",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event emitted by the bot
///
/// Consumers subscribe via [`crate::TranscriptionBot::subscribe`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A job was admitted for an owner
    JobAdmitted {
        /// Job ID
        id: JobId,
        /// Owner of the job
        owner: OwnerId,
        /// Active jobs for the owner after admission
        active: usize,
        /// When the job was admitted
        at: DateTime<Utc>,
    },

    /// An owner hit the concurrency bound
    JobRejected {
        /// Owner whose submission was rejected
        owner: OwnerId,
        /// The bound that was hit
        limit: usize,
    },

    /// A job entered a working stage
    StageStarted {
        /// Job ID
        id: JobId,
        /// The stage that started
        stage: Stage,
    },

    /// A job finished successfully
    JobCompleted {
        /// Job ID
        id: JobId,
        /// Owner of the job
        owner: OwnerId,
        /// Number of messages the result was delivered in
        chunks: usize,
    },

    /// A job failed
    JobFailed {
        /// Job ID
        id: JobId,
        /// Owner of the job
        owner: OwnerId,
        /// Stage the job was in when it failed
        stage: Stage,
        /// Error message
        error: String,
    },

    /// Bot is shutting down
    Shutdown,
}
