//! The bot service: command handling, admission and job spawning.
//!
//! [`TranscriptionBot`] sits between the transport's update stream and the
//! pipeline. For every attachment it asks the [`JobRegistry`] for a slot,
//! replies with a progress message, and spawns one task that runs the job
//! through the [`PipelineExecutor`].

pub mod commands;
mod lifecycle;


use crate::config::Config;
use crate::error::{Error, Result};
use crate::pipeline::{Collaborators, Job, PROCESSING_LABEL, PipelineExecutor};
use crate::registry::JobRegistry;
use crate::transport::Transport;
use crate::types::{Attachment, Event, InboundContent, InboundMessage, JobId, MessageRef, OwnerId};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Audio transcription bot
///
/// Cloning is cheap; clones share the same registry and event channel.
#[derive(Clone)]
pub struct TranscriptionBot {
    inner: Arc<BotInner>,
}

struct BotInner {
    registry: JobRegistry,
    executor: PipelineExecutor,
    transport: Arc<dyn Transport>,
    event_tx: broadcast::Sender<Event>,
    accepting_new: AtomicBool,
    transport_timeout: Duration,
    shutdown_grace: Duration,
}

impl TranscriptionBot {
    /// Create a bot over the given collaborators
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `config` does not validate.
    pub fn new(config: &Config, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;

        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let transport = collaborators.transport.clone();
        let executor = PipelineExecutor::new(collaborators, config, event_tx.clone());

        tracing::info!(
            max_concurrent_per_owner = config.jobs.max_concurrent_per_owner,
            temp_dir = %config.jobs.temp_dir.display(),
            "transcription bot initialized"
        );

        Ok(Self {
            inner: Arc::new(BotInner {
                registry: JobRegistry::new(config.jobs.max_concurrent_per_owner),
                executor,
                transport,
                event_tx,
                accepting_new: AtomicBool::new(true),
                transport_timeout: config.jobs.timeouts.transport,
                shutdown_grace: config.jobs.shutdown_grace,
            }),
        })
    }

    /// Subscribe to bot events
    ///
    /// Events emitted before subscribing are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.event_tx.subscribe()
    }

    /// The job registry
    pub fn registry(&self) -> &JobRegistry {
        &self.inner.registry
    }

    /// Whether new jobs are currently accepted
    pub fn is_accepting(&self) -> bool {
        self.inner.accepting_new.load(Ordering::SeqCst)
    }

    /// Handle `inbound` on its own task
    ///
    /// Replies and admission for one message never wait on another
    /// message's transport calls.
    pub fn dispatch(&self, inbound: InboundMessage) -> tokio::task::JoinHandle<()> {
        let bot = self.clone();
        tokio::spawn(async move { bot.handle_message(inbound).await })
    }

    /// Handle one inbound message
    ///
    /// Never fails: every problem is either answered to the sender or logged.
    pub async fn handle_message(&self, inbound: InboundMessage) {
        match inbound.content {
            InboundContent::Command(command) => {
                self.handle_command(inbound.message, inbound.owner, &command)
                    .await;
            }
            InboundContent::Attachment(attachment) => {
                match self
                    .submit(inbound.message, inbound.owner, attachment)
                    .await
                {
                    Ok(_) => {}
                    Err(Error::AdmissionRejected { limit, .. }) => {
                        self.reply(inbound.message, &commands::rejection_text(limit))
                            .await;
                    }
                    Err(Error::ShuttingDown) => {
                        self.reply(inbound.message, commands::SHUTTING_DOWN_TEXT)
                            .await;
                    }
                    Err(e) => {
                        tracing::warn!(
                            owner = inbound.owner.0,
                            error = %e,
                            "could not start job"
                        );
                    }
                }
            }
            InboundContent::Other => {
                tracing::debug!(owner = inbound.owner.0, "ignoring message without audio");
            }
        }
    }

    /// Admit and start a job for `attachment`
    ///
    /// On success the job runs in its own task and this returns immediately
    /// with its id. The reply sent to `message` becomes the job's progress
    /// message.
    ///
    /// # Errors
    ///
    /// - [`Error::ShuttingDown`] once [`shutdown`](Self::shutdown) has begun
    /// - [`Error::AdmissionRejected`] when `owner` is at the concurrency bound
    /// - [`Error::Transport`] or [`Error::Timeout`] when the progress reply
    ///   cannot be sent; the slot is released again
    pub async fn submit(
        &self,
        message: MessageRef,
        owner: OwnerId,
        attachment: Attachment,
    ) -> Result<JobId> {
        if !self.is_accepting() {
            return Err(Error::ShuttingDown);
        }

        let slot = match self.inner.registry.try_admit(owner) {
            Ok(slot) => slot,
            Err(e) => {
                if let Error::AdmissionRejected { limit, .. } = &e {
                    tracing::info!(owner = owner.0, limit, "job rejected: owner at capacity");
                    self.emit(Event::JobRejected {
                        owner,
                        limit: *limit,
                    });
                }
                return Err(e);
            }
        };
        let id = slot.id();

        let progress = match tokio::time::timeout(
            self.inner.transport_timeout,
            self.inner.transport.reply(message, PROCESSING_LABEL),
        )
        .await
        {
            Ok(Ok(progress)) => progress,
            Ok(Err(e)) => {
                slot.release();
                return Err(e.into());
            }
            Err(_) => {
                slot.release();
                return Err(Error::Timeout {
                    operation: "progress reply",
                    after: self.inner.transport_timeout,
                });
            }
        };

        let active = self.inner.registry.active_count(owner);
        tracing::info!(
            job_id = id.0,
            owner = owner.0,
            kind = attachment.kind(),
            active,
            "job admitted"
        );
        self.emit(Event::JobAdmitted {
            id,
            owner,
            active,
            at: chrono::Utc::now(),
        });

        let job = Job::new(slot, progress);
        let executor = self.inner.executor.clone();
        tokio::spawn(async move {
            // The outcome was already reported to the user and logged
            let _ = executor.run(job, &attachment).await;
        });

        Ok(id)
    }

    async fn handle_command(&self, message: MessageRef, owner: OwnerId, command: &str) {
        match command {
            "start" => self.reply(message, commands::START_TEXT).await,
            "help" => self.reply(message, commands::HELP_TEXT).await,
            other => {
                tracing::debug!(owner = owner.0, command = other, "ignoring unknown command");
            }
        }
    }

    async fn reply(&self, to: MessageRef, text: &str) {
        match tokio::time::timeout(self.inner.transport_timeout, self.inner.transport.reply(to, text))
            .await
        {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                tracing::warn!(chat_id = to.chat_id, error = %e, "reply failed");
            }
            Err(_) => {
                tracing::warn!(chat_id = to.chat_id, "reply timed out");
            }
        }
    }

    pub(crate) fn emit(&self, event: Event) {
        // send() returns Err if there are no receivers, which is fine - we just drop the event
        self.inner.event_tx.send(event).ok();
    }
}
