//! Shared helpers for the integration tests
//!
//! In-memory collaborators implementing the public traits, so the bot can be
//! driven end to end without Telegram, transfer.sh, fal.ai or OpenRouter.

#![allow(dead_code)]

use async_trait::async_trait;
use audioscribe::clients::{Transcriber, Uploader};
use audioscribe::error::TransportError;
use audioscribe::formatting::CompletionBackend;
use audioscribe::pipeline::Collaborators;
use audioscribe::probe::SniffProbe;
use audioscribe::transport::Transport;
use audioscribe::{Config, Event, MessageRef};
use secrecy::Secret;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;
use tokio::sync::{Semaphore, broadcast};

/// Minimal Ogg page header; enough for the magic-byte probe
pub const OGG_VOICE: &[u8] = b"OggS\0\x02\0\0\0\0\0\0\0\0 integration voice";

/// Something the bot sent through the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Reply {
        to: MessageRef,
        text: String,
        created: MessageRef,
    },
    Message { chat_id: i64, text: String },
    Edit { message: MessageRef, text: String },
}

/// Transport that records outgoing messages and serves a fixed file
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    next_id: AtomicI32,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            next_id: AtomicI32::new(9000),
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    /// Texts of all direct replies, in order
    pub fn replies(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Reply { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Latest text of `message` after all edits
    pub fn last_edit_of(&self, message: MessageRef) -> Option<String> {
        self.sent().into_iter().rev().find_map(|s| match s {
            Sent::Edit { message: m, text } if m == message => Some(text),
            _ => None,
        })
    }

    /// The progress message created in reply to `to`
    pub fn progress_for(&self, to: MessageRef) -> Option<MessageRef> {
        self.sent().into_iter().find_map(|s| match s {
            Sent::Reply { to: t, created, .. } if t == to => Some(created),
            _ => None,
        })
    }

    fn record(&self, sent: Sent) {
        self.sent.lock().unwrap().push(sent);
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn reply(&self, to: MessageRef, text: &str) -> Result<MessageRef, TransportError> {
        let created = MessageRef::new(to.chat_id, self.next_id.fetch_add(1, Ordering::SeqCst));
        self.record(Sent::Reply {
            to,
            text: text.to_string(),
            created,
        });
        Ok(created)
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<MessageRef, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.record(Sent::Message {
            chat_id,
            text: text.to_string(),
        });
        Ok(MessageRef::new(chat_id, id))
    }

    async fn edit_message(&self, message: MessageRef, text: &str) -> Result<(), TransportError> {
        self.record(Sent::Edit {
            message,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn download_file(
        &self,
        _file_id: &str,
        destination: &Path,
    ) -> Result<(), TransportError> {
        tokio::fs::write(destination, OGG_VOICE)
            .await
            .map_err(|e| TransportError::Download(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Uploader that waits for a permit before answering
///
/// Keeps jobs parked in the upload stage until the test releases them.
pub struct GatedUploader {
    gate: Arc<Semaphore>,
}

impl GatedUploader {
    pub fn new() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        (Self { gate: gate.clone() }, gate)
    }

    /// An uploader that never blocks
    pub fn open() -> Self {
        Self {
            gate: Arc::new(Semaphore::new(Semaphore::MAX_PERMITS)),
        }
    }
}

#[async_trait]
impl Uploader for GatedUploader {
    async fn upload(&self, path: &Path, _max_downloads: u32) -> audioscribe::Result<String> {
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| audioscribe::Error::Other(e.to_string()))?;
        permit.forget();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(format!("https://blobs.test/{name}"))
    }
}

/// Speech-to-text stand-in returning a fixed transcript
pub struct FixedTranscriber(pub String);

#[async_trait]
impl Transcriber for FixedTranscriber {
    async fn transcribe(&self, _url: &str, _language: &str) -> audioscribe::Result<String> {
        Ok(self.0.clone())
    }
}

/// Formatting backend that echoes the transcript, or always fails
pub enum EchoBackend {
    Echo,
    Failing,
}

#[async_trait]
impl CompletionBackend for EchoBackend {
    async fn complete(&self, _prompt: &str, text: &str) -> audioscribe::Result<String> {
        match self {
            EchoBackend::Echo => Ok(text.to_string()),
            EchoBackend::Failing => Err(audioscribe::Error::Remote {
                service: "echo",
                status: 503,
                body: "unavailable".into(),
            }),
        }
    }

    fn name(&self) -> &str {
        match self {
            EchoBackend::Echo => "echo",
            EchoBackend::Failing => "failing",
        }
    }
}

/// Configuration with dummy credentials and short timeouts
pub fn test_config(temp_dir: &Path) -> Config {
    let mut config = Config::default();
    config.telegram.token = Secret::new("123:INTEGRATION".into());
    config.upload.host = "https://blobs.test".into();
    config.transcription.api_key = Secret::new("fal-test".into());
    config.formatting.api_key = Secret::new("or-test".into());
    config.jobs.temp_dir = temp_dir.to_path_buf();
    config.jobs.shutdown_grace = Duration::from_secs(5);
    config
}

/// Collaborators built from the in-memory parts
pub fn collaborators(
    transport: Arc<RecordingTransport>,
    uploader: impl Uploader + 'static,
    transcript: &str,
) -> Collaborators {
    Collaborators {
        transport,
        uploader: Arc::new(uploader),
        transcriber: Arc::new(FixedTranscriber(transcript.to_string())),
        primary: Arc::new(EchoBackend::Failing),
        secondary: Arc::new(EchoBackend::Echo),
        probe: Arc::new(SniffProbe),
    }
}

/// Receive events until `done` matches one, failing after five seconds
pub async fn wait_for_event(
    events: &mut broadcast::Receiver<Event>,
    mut done: impl FnMut(&Event) -> bool,
) -> Event {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if done(&event) => return event,
                Ok(_) => {}
                Err(e) => panic!("event channel failed: {e}"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}
