//! The four-stage job state machine.

use super::delivery::ChunkedDelivery;
use super::progress::{ProgressReporter, RESULT_HEADER, failure_label, stage_label};
use super::Job;
use crate::clients::{Transcriber, Uploader};
use crate::config::{Config, TimeoutConfig};
use crate::error::{Error, Result, StageError};
use crate::formatting::{CompletionBackend, FormattingFallbackClient};
use crate::probe::AudioProbe;
use crate::transport::Transport;
use crate::types::{Attachment, Event, Stage};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::sync::broadcast;

/// The external services a job talks to
#[derive(Clone)]
pub struct Collaborators {
    /// Messaging transport
    pub transport: Arc<dyn Transport>,
    /// Blob upload service
    pub uploader: Arc<dyn Uploader>,
    /// Speech-to-text service
    pub transcriber: Arc<dyn Transcriber>,
    /// Formatting backend tried first
    pub primary: Arc<dyn CompletionBackend>,
    /// Formatting backend tried when the primary fails
    pub secondary: Arc<dyn CompletionBackend>,
    /// Audio container probe
    pub probe: Arc<dyn AudioProbe>,
}

/// Drives jobs through upload, transcription, formatting and delivery
///
/// One executor is shared by all jobs; each [`PipelineExecutor::run`] call
/// drives exactly one job.
#[derive(Clone)]
pub struct PipelineExecutor {
    transport: Arc<dyn Transport>,
    uploader: Arc<dyn Uploader>,
    transcriber: Arc<dyn Transcriber>,
    probe: Arc<dyn AudioProbe>,
    formatter: FormattingFallbackClient,
    progress: ProgressReporter,
    delivery: ChunkedDelivery,
    temp_dir: PathBuf,
    language: String,
    max_downloads: u32,
    timeouts: TimeoutConfig,
    event_tx: broadcast::Sender<Event>,
}

impl PipelineExecutor {
    /// Create an executor over `collaborators`
    pub fn new(
        collaborators: Collaborators,
        config: &Config,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        let timeouts = config.jobs.timeouts.clone();
        let formatter = FormattingFallbackClient::new(
            collaborators.primary,
            collaborators.secondary,
            config.formatting.prompt.clone(),
            timeouts.formatting,
        );
        let progress = ProgressReporter::new(collaborators.transport.clone(), timeouts.transport);
        let delivery = ChunkedDelivery::new(
            collaborators.transport.clone(),
            config.jobs.max_chunk_size,
            timeouts.transport,
        );

        Self {
            transport: collaborators.transport,
            uploader: collaborators.uploader,
            transcriber: collaborators.transcriber,
            probe: collaborators.probe,
            formatter,
            progress,
            delivery,
            temp_dir: config.jobs.temp_dir.clone(),
            language: config.transcription.language.clone(),
            max_downloads: config.upload.max_downloads,
            timeouts,
            event_tx,
        }
    }

    /// Run `job` on `attachment` to completion
    ///
    /// Every outcome is reported to the submitter: the result on success, a
    /// single error message naming the failing stage otherwise. The job's
    /// registry slot is released exactly once before this returns.
    ///
    /// Returns the number of delivered messages, or the stage failure that
    /// was already reported.
    pub async fn run(
        &self,
        mut job: Job,
        attachment: &Attachment,
    ) -> std::result::Result<usize, StageError> {
        let outcome = match self.drive(&mut job, attachment).await {
            Ok(chunks) => Ok(chunks),
            Err(Error::Stage(e)) => Err(e),
            Err(other) => Err(StageError::at(job.stage(), other.to_string())),
        };

        let event = match &outcome {
            Ok(chunks) => {
                if let Err(e) = job.advance(Stage::Completed) {
                    tracing::error!(job_id = job.id().0, error = %e, "could not complete job");
                }
                tracing::info!(
                    job_id = job.id().0,
                    owner = job.owner().0,
                    chunks,
                    "job completed"
                );
                Event::JobCompleted {
                    id: job.id(),
                    owner: job.owner(),
                    chunks: *chunks,
                }
            }
            Err(e) => {
                let failed_at = job.stage();
                job.fail();
                tracing::warn!(
                    job_id = job.id().0,
                    owner = job.owner().0,
                    stage = %failed_at,
                    code = e.code(),
                    error = %e,
                    "job failed"
                );
                self.progress.report(job.progress(), &failure_label(e)).await;
                Event::JobFailed {
                    id: job.id(),
                    owner: job.owner(),
                    stage: failed_at,
                    error: e.to_string(),
                }
            }
        };

        // Capacity is back before anyone hears the job is over
        let (id, owner) = (job.id(), job.owner());
        if !job.finish() {
            tracing::warn!(job_id = id.0, owner = owner.0, "job was already retired");
        }
        self.emit(event);
        outcome
    }

    async fn drive(&self, job: &mut Job, attachment: &Attachment) -> Result<usize> {
        let input = self.prepare(job, attachment).await?;

        self.enter(job, Stage::Uploading).await?;
        let link = timed(
            "upload",
            self.timeouts.upload,
            self.uploader.upload(input.path(), self.max_downloads),
        )
        .await
        .map_err(|e| StageError::Upload(e.to_string()))?;
        // The remote copy is all later stages need
        drop(input);

        self.enter(job, Stage::Transcribing).await?;
        let transcript = timed(
            "transcription",
            self.timeouts.transcription,
            self.transcriber.transcribe(&link, &self.language),
        )
        .await
        .map_err(|e| StageError::Transcription(e.to_string()))?;
        if transcript.trim().is_empty() {
            return Err(StageError::Transcription(
                "no speech recognised (empty transcript)".into(),
            )
            .into());
        }

        self.enter(job, Stage::Formatting).await?;
        let formatted = self.formatter.format(&transcript).await?;

        self.enter(job, Stage::Delivering).await?;
        let chunks = self
            .delivery
            .deliver(job.progress(), &formatted, Some(RESULT_HEADER))
            .await?;

        Ok(chunks)
    }

    /// Download the attachment into a job-owned temp file and check its container
    async fn prepare(&self, job: &Job, attachment: &Attachment) -> Result<NamedTempFile> {
        let file = tempfile::Builder::new()
            .prefix("audioscribe-")
            .tempfile_in(&self.temp_dir)
            .map_err(|e| StageError::Validation(format!("cannot create temp file: {}", e)))?;

        timed(
            "download",
            self.timeouts.download,
            async {
                self.transport
                    .download_file(attachment.file_id(), file.path())
                    .await
                    .map_err(Error::from)
            },
        )
        .await
        .map_err(|e| StageError::Validation(format!("download failed: {}", e)))?;

        let probed = timed("probe", self.timeouts.probe, self.probe.probe(file.path()))
            .await
            .map_err(|e| StageError::Validation(format!("cannot read audio: {}", e)))?;

        match probed.accepted_format() {
            Some(format) => {
                tracing::debug!(
                    job_id = job.id().0,
                    kind = attachment.kind(),
                    format,
                    probe = self.probe.name(),
                    "input accepted"
                );
                Ok(file)
            }
            None => Err(StageError::Validation(format!(
                "unsupported audio format ({}); send mp3, wav, ogg or m4a",
                probed.describe()
            ))
            .into()),
        }
    }

    async fn enter(&self, job: &mut Job, stage: Stage) -> Result<()> {
        job.advance(stage)?;
        tracing::debug!(job_id = job.id().0, stage = %stage, "stage started");
        self.emit(Event::StageStarted { id: job.id(), stage });
        if let Some(label) = stage_label(stage) {
            self.progress.report(job.progress(), label).await;
        }
        Ok(())
    }

    fn emit(&self, event: Event) {
        // send() returns Err if there are no receivers, which is fine - we just drop the event
        self.event_tx.send(event).ok();
    }
}

/// Bound `call` by `after`, turning expiry into [`Error::Timeout`]
async fn timed<T, F>(operation: &'static str, after: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(after, call)
        .await
        .map_err(|_| Error::Timeout { operation, after })?
}
