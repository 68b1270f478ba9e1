//! Telegram transport built on teloxide, plus the long-polling loop.

use super::{Transport, ensure_fits};
use crate::bot::TranscriptionBot;
use crate::error::{Error, TransportError};
use crate::types::{Attachment, InboundContent, InboundMessage, MessageRef, OwnerId};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use teloxide::{
    ApiError, RequestError,
    prelude::*,
    types::{
        AllowedUpdate, BotCommand, MediaKind, MessageId, MessageKind, ReplyParameters, UpdateKind,
    },
};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

/// Telegram Bot API file download base
const FILE_API_BASE: &str = "https://api.telegram.org/file";

/// Delay before retrying a failed getUpdates call
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// [`Transport`] implementation backed by a teloxide [`Bot`]
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
    http: reqwest::Client,
    max_message_len: usize,
}

impl TelegramTransport {
    /// Build a transport for `token`
    ///
    /// The HTTP client timeout is kept above the long-polling timeout so the
    /// client never aborts a getUpdates call before Telegram answers. That
    /// client comes from teloxide's own reqwest, so its build error is mapped
    /// by hand.
    pub fn new(
        token: &str,
        poll_timeout: Duration,
        max_message_len: usize,
    ) -> crate::Result<Self> {
        let client = teloxide::net::default_reqwest_settings()
            .timeout(poll_timeout + Duration::from_secs(15))
            .build()
            .map_err(|e| Error::Transport(TransportError::Request(e.to_string())))?;
        Ok(Self {
            bot: Bot::with_client(token, client),
            http: reqwest::Client::new(),
            max_message_len,
        })
    }

    /// The underlying teloxide bot
    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    /// Verify the token and prepare the bot for long polling
    ///
    /// Removes any configured webhook (getUpdates refuses to work while one
    /// is set) together with the update backlog, so files sent while the bot
    /// was down are not processed on restart. Registers the command list and
    /// returns the bot's username.
    pub async fn prepare_polling(&self) -> crate::Result<String> {
        let me = self.bot.get_me().await.map_err(request_error)?;
        self.bot
            .delete_webhook()
            .drop_pending_updates(true)
            .send()
            .await
            .map_err(request_error)?;

        let commands = vec![
            BotCommand::new("start", "Start the bot"),
            BotCommand::new("help", "How to use the bot"),
        ];
        if let Err(e) = self.bot.set_my_commands(commands).await {
            tracing::warn!(error = %e, "failed to register bot commands");
        }

        Ok(me.username().to_string())
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn reply(&self, to: MessageRef, text: &str) -> Result<MessageRef, TransportError> {
        ensure_fits(text, self.max_message_len)?;
        let message = self
            .bot
            .send_message(ChatId(to.chat_id), text)
            .reply_parameters(ReplyParameters::new(MessageId(to.message_id)))
            .await
            .map_err(request_error)?;
        Ok(MessageRef::new(message.chat.id.0, message.id.0))
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<MessageRef, TransportError> {
        ensure_fits(text, self.max_message_len)?;
        let message = self
            .bot
            .send_message(ChatId(chat_id), text)
            .await
            .map_err(request_error)?;
        Ok(MessageRef::new(message.chat.id.0, message.id.0))
    }

    async fn edit_message(&self, message: MessageRef, text: &str) -> Result<(), TransportError> {
        ensure_fits(text, self.max_message_len)?;
        match self
            .bot
            .edit_message_text(ChatId(message.chat_id), MessageId(message.message_id), text)
            .await
        {
            Ok(_) => Ok(()),
            // Re-sending identical content is not a failure for our purposes
            Err(RequestError::Api(ApiError::MessageNotModified)) => Ok(()),
            Err(e) => Err(request_error(e)),
        }
    }

    async fn download_file(
        &self,
        file_id: &str,
        destination: &Path,
    ) -> Result<(), TransportError> {
        let file = self
            .bot
            .get_file(file_id)
            .await
            .map_err(|e| TransportError::Download(e.to_string()))?;

        let url = format!("{}/bot{}/{}", FILE_API_BASE, self.bot.token(), file.path);
        let mut response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| TransportError::Download(e.without_url().to_string()))?;
        if !response.status().is_success() {
            return Err(TransportError::Download(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let mut out = tokio::fs::File::create(destination)
            .await
            .map_err(|e| TransportError::Download(e.to_string()))?;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| TransportError::Download(e.without_url().to_string()))?
        {
            out.write_all(&chunk)
                .await
                .map_err(|e| TransportError::Download(e.to_string()))?;
        }
        out.flush()
            .await
            .map_err(|e| TransportError::Download(e.to_string()))?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}

fn request_error(e: RequestError) -> TransportError {
    TransportError::Request(e.to_string())
}

/// Convert a Telegram message into an [`InboundMessage`]
///
/// Returns `None` for messages without a sender (channel posts).
pub fn inbound_from_message(msg: &Message) -> Option<InboundMessage> {
    let owner = OwnerId(msg.from.as_ref()?.id.0);
    let content = match &msg.kind {
        MessageKind::Common(common) => match &common.media_kind {
            MediaKind::Voice(v) => InboundContent::Attachment(Attachment::Voice {
                file_id: v.voice.file.id.to_string(),
            }),
            MediaKind::Audio(a) => InboundContent::Attachment(Attachment::Audio {
                file_id: a.audio.file.id.to_string(),
            }),
            MediaKind::Document(d) => InboundContent::Attachment(Attachment::Document {
                file_id: d.document.file.id.to_string(),
            }),
            MediaKind::Text(_) => msg
                .text()
                .and_then(parse_command)
                .map_or(InboundContent::Other, InboundContent::Command),
            _ => InboundContent::Other,
        },
        _ => InboundContent::Other,
    };

    Some(InboundMessage {
        message: MessageRef::new(msg.chat.id.0, msg.id.0),
        owner,
        content,
    })
}

/// Extract the command name from "/name@bot args"
fn parse_command(text: &str) -> Option<String> {
    let word = text.trim_start().strip_prefix('/')?.split_whitespace().next()?;
    let name = word.split('@').next().unwrap_or(word);
    if name.is_empty() {
        return None;
    }
    Some(name.to_ascii_lowercase())
}

/// Spawn the getUpdates long-polling loop
///
/// Each message is dispatched to `service` on its own task, so a slow reply
/// to one user never holds up admission for another. The loop stops when
/// `cancel` fires or when another instance takes over the token.
pub fn spawn_polling(
    bot: Bot,
    service: TranscriptionBot,
    poll_timeout: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("starting telegram polling loop");
        let mut offset: i32 = 0;
        let timeout_secs = u32::try_from(poll_timeout.as_secs()).unwrap_or(u32::MAX);

        loop {
            let request = bot
                .get_updates()
                .offset(offset)
                .timeout(timeout_secs)
                .allowed_updates(vec![AllowedUpdate::Message]);

            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("telegram polling stopped");
                    break;
                }
                result = request.send() => result,
            };

            match result {
                Ok(updates) => {
                    tracing::debug!(count = updates.len(), "got telegram updates");
                    for update in updates {
                        offset = update.id.as_offset();
                        match update.kind {
                            UpdateKind::Message(msg) => match inbound_from_message(&msg) {
                                Some(inbound) => {
                                    service.dispatch(inbound);
                                }
                                None => {
                                    tracing::debug!(
                                        chat_id = msg.chat.id.0,
                                        "ignoring message without sender"
                                    );
                                }
                            },
                            other => {
                                tracing::debug!("ignoring non-message update: {other:?}");
                            }
                        }
                    }
                }
                Err(RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) => {
                    tracing::warn!(
                        "telegram polling disabled: another instance is running with this token"
                    );
                    cancel.cancel();
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "telegram getUpdates failed");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(POLL_RETRY_DELAY) => {}
                    }
                }
            }
        }
    })
}
