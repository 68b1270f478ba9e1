//! In-memory collaborators shared by unit tests.

use crate::clients::{Transcriber, Uploader};
use crate::config::Config;
use crate::error::{Error, Result, TransportError};
use crate::formatting::CompletionBackend;
use crate::pipeline::{Collaborators, PipelineExecutor};
use crate::probe::SniffProbe;
use crate::transport::Transport;
use crate::types::{Event, MessageRef};
use async_trait::async_trait;
use secrecy::Secret;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Semaphore, broadcast};

/// Minimal Ogg page header, enough for [`SniffProbe`]
pub(crate) const OGG_BYTES: &[u8] = b"OggS\0\x02\0\0\0\0\0\0\0\0 fake voice";

/// A call observed by [`MockTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TransportCall {
    Reply { to: MessageRef, text: String },
    Send { chat_id: i64, text: String },
    Edit { message: MessageRef, text: String },
    Download { file_id: String },
}

/// Records every successful call; failures can be switched on per operation
pub(crate) struct MockTransport {
    calls: Mutex<Vec<TransportCall>>,
    next_message_id: AtomicI32,
    file_content: Mutex<Vec<u8>>,
    fail_edits: AtomicBool,
    fail_sends: AtomicBool,
    fail_downloads: AtomicBool,
    reply_delays: Mutex<HashMap<i64, Duration>>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_message_id: AtomicI32::new(1000),
            file_content: Mutex::new(OGG_BYTES.to_vec()),
            fail_edits: AtomicBool::new(false),
            fail_sends: AtomicBool::new(false),
            fail_downloads: AtomicBool::new(false),
            reply_delays: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Texts of all edits applied to `message`, in order
    pub(crate) fn edits_of(&self, message: MessageRef) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                TransportCall::Edit { message: m, text } if m == message => Some(text),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn replies(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                TransportCall::Reply { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn set_file_content(&self, bytes: &[u8]) {
        *self.file_content.lock().unwrap() = bytes.to_vec();
    }

    pub(crate) fn fail_edits(&self, fail: bool) {
        self.fail_edits.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_downloads(&self, fail: bool) {
        self.fail_downloads.store(fail, Ordering::SeqCst);
    }

    /// Make every reply into `chat_id` take `delay` before it lands
    pub(crate) fn delay_replies_to(&self, chat_id: i64, delay: Duration) {
        self.reply_delays.lock().unwrap().insert(chat_id, delay);
    }

    fn record(&self, call: TransportCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn new_message(&self, chat_id: i64) -> MessageRef {
        MessageRef::new(chat_id, self.next_message_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn reply(
        &self,
        to: MessageRef,
        text: &str,
    ) -> std::result::Result<MessageRef, TransportError> {
        let delay = self.reply_delays.lock().unwrap().get(&to.chat_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.record(TransportCall::Reply {
            to,
            text: text.to_string(),
        });
        Ok(self.new_message(to.chat_id))
    }

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
    ) -> std::result::Result<MessageRef, TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Request("chat not found".into()));
        }
        self.record(TransportCall::Send {
            chat_id,
            text: text.to_string(),
        });
        Ok(self.new_message(chat_id))
    }

    async fn edit_message(
        &self,
        message: MessageRef,
        text: &str,
    ) -> std::result::Result<(), TransportError> {
        if self.fail_edits.load(Ordering::SeqCst) {
            return Err(TransportError::Request("message to edit not found".into()));
        }
        self.record(TransportCall::Edit {
            message,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn download_file(
        &self,
        file_id: &str,
        destination: &Path,
    ) -> std::result::Result<(), TransportError> {
        if self.fail_downloads.load(Ordering::SeqCst) {
            return Err(TransportError::Download("file is too big".into()));
        }
        let content = self.file_content.lock().unwrap().clone();
        tokio::fs::write(destination, content)
            .await
            .map_err(|e| TransportError::Download(e.to_string()))?;
        self.record(TransportCall::Download {
            file_id: file_id.to_string(),
        });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Returns a fixed link; optionally waits for a permit before answering
pub(crate) struct MockUploader {
    result: std::result::Result<String, String>,
    gate: Option<Arc<Semaphore>>,
    uploaded: Mutex<Vec<(PathBuf, bool)>>,
}

impl MockUploader {
    pub(crate) fn ok(link: &str) -> Self {
        Self {
            result: Ok(link.to_string()),
            gate: None,
            uploaded: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing(detail: &str) -> Self {
        Self {
            result: Err(detail.to_string()),
            gate: None,
            uploaded: Mutex::new(Vec::new()),
        }
    }

    /// Each upload blocks until the returned semaphore hands out a permit
    pub(crate) fn gated(link: &str) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let mut uploader = Self::ok(link);
        uploader.gate = Some(gate.clone());
        (uploader, gate)
    }

    /// Uploaded paths with whether the file existed at upload time
    pub(crate) fn uploaded(&self) -> Vec<(PathBuf, bool)> {
        self.uploaded.lock().unwrap().clone()
    }
}

#[async_trait]
impl Uploader for MockUploader {
    async fn upload(&self, path: &Path, _max_downloads: u32) -> Result<String> {
        self.uploaded
            .lock()
            .unwrap()
            .push((path.to_path_buf(), path.exists()));
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        self.result.clone().map_err(|detail| Error::Remote {
            service: "mock-upload",
            status: 500,
            body: detail,
        })
    }
}

/// Returns a fixed transcript and records its requests
pub(crate) struct MockTranscriber {
    text: String,
    hang: bool,
    requests: Mutex<Vec<(String, String)>>,
}

impl MockTranscriber {
    pub(crate) fn returning(text: &str) -> Self {
        Self {
            text: text.to_string(),
            hang: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A transcriber whose requests never complete
    pub(crate) fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::returning("")
        }
    }

    pub(crate) fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, url: &str, language: &str) -> Result<String> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), language.to_string()));
        if self.hang {
            std::future::pending::<()>().await;
        }
        Ok(self.text.clone())
    }
}

/// Completion backend with a canned answer
pub(crate) struct MockBackend {
    name: &'static str,
    result: std::result::Result<String, String>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockBackend {
    pub(crate) fn ok(name: &'static str, completion: &str) -> Self {
        Self {
            name,
            result: Ok(completion.to_string()),
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn failing(name: &'static str, detail: &str) -> Self {
        Self {
            result: Err(detail.to_string()),
            ..Self::ok(name, "")
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    pub(crate) fn requests(&self) -> Arc<Mutex<Vec<(String, String)>>> {
        self.requests.clone()
    }
}

#[async_trait]
impl CompletionBackend for MockBackend {
    async fn complete(&self, prompt: &str, text: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap()
            .push((prompt.to_string(), text.to_string()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.result.clone().map_err(|detail| Error::Remote {
            service: "mock-llm",
            status: 500,
            body: detail,
        })
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// A valid configuration whose temp dir points into `temp_dir`
pub(crate) fn test_config(temp_dir: &Path) -> Config {
    let mut config = Config::default();
    config.telegram.token = Secret::new("123:TEST".into());
    config.upload.host = "https://transfer.example".into();
    config.transcription.api_key = Secret::new("fal-test".into());
    config.formatting.api_key = Secret::new("or-test".into());
    config.jobs.temp_dir = temp_dir.to_path_buf();
    config.jobs.timeouts.transport = Duration::from_secs(5);
    config
}

/// Mocks wired together, with handles kept for assertions
pub(crate) struct TestRig {
    pub(crate) transport: Arc<MockTransport>,
    pub(crate) uploader: Arc<MockUploader>,
    pub(crate) transcriber: Arc<MockTranscriber>,
    pub(crate) config: Config,
    pub(crate) event_tx: broadcast::Sender<Event>,
    pub(crate) temp_dir: tempfile::TempDir,
}

impl TestRig {
    pub(crate) fn new(uploader: MockUploader, transcript: &str) -> Self {
        let temp_dir = tempfile::tempdir().unwrap();
        let (event_tx, _rx) = broadcast::channel(256);
        Self {
            transport: Arc::new(MockTransport::new()),
            uploader: Arc::new(uploader),
            transcriber: Arc::new(MockTranscriber::returning(transcript)),
            config: test_config(temp_dir.path()),
            event_tx,
            temp_dir,
        }
    }

    pub(crate) fn collaborators(&self, primary: MockBackend, secondary: MockBackend) -> Collaborators {
        Collaborators {
            transport: self.transport.clone(),
            uploader: self.uploader.clone(),
            transcriber: self.transcriber.clone(),
            primary: Arc::new(primary),
            secondary: Arc::new(secondary),
            probe: Arc::new(SniffProbe),
        }
    }

    pub(crate) fn executor(&self, primary: MockBackend, secondary: MockBackend) -> PipelineExecutor {
        PipelineExecutor::new(
            self.collaborators(primary, secondary),
            &self.config,
            self.event_tx.clone(),
        )
    }

    /// Files left behind in the job temp dir
    pub(crate) fn temp_files(&self) -> usize {
        std::fs::read_dir(self.temp_dir.path()).unwrap().count()
    }
}
