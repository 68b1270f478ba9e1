//! Speech-to-text through the fal.ai queue API

use super::remote_error;
use crate::config::TranscriptionConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SERVICE: &str = "fal";

/// Converts the audio behind a URL into text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe the audio at `url`, spoken in `language`
    ///
    /// May return an empty string when no speech was recognised; callers
    /// decide whether that is an error.
    async fn transcribe(&self, url: &str, language: &str) -> Result<String>;
}

/// Whisper on fal.ai, driven through the queue API
///
/// The request is submitted, its status polled until `COMPLETED`, then the
/// result is fetched. The caller bounds the whole exchange with a timeout.
pub struct FalWhisperTranscriber {
    client: reqwest::Client,
    submit_url: String,
    api_key: Secret<String>,
    poll_interval: Duration,
}

#[derive(Serialize)]
struct SubmitRequest<'a> {
    audio_url: &'a str,
    task: &'a str,
    language: &'a str,
}

#[derive(Debug, Deserialize)]
struct QueuedRequest {
    request_id: String,
    status_url: String,
    response_url: String,
}

#[derive(Debug, Deserialize)]
struct QueueStatus {
    status: String,
}

#[derive(Debug, Deserialize)]
struct WhisperOutput {
    #[serde(default)]
    text: String,
}

impl FalWhisperTranscriber {
    /// Create a transcriber from configuration
    pub fn new(config: &TranscriptionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("audioscribe/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            submit_url: format!(
                "{}/{}",
                config.base_url.trim_end_matches('/'),
                config.model.trim_matches('/')
            ),
            api_key: config.api_key.clone(),
            poll_interval: config.poll_interval,
        })
    }

    fn auth_header(&self) -> String {
        format!("Key {}", self.api_key.expose_secret())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(remote_error(SERVICE, response).await);
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl Transcriber for FalWhisperTranscriber {
    async fn transcribe(&self, url: &str, language: &str) -> Result<String> {
        let response = self
            .client
            .post(&self.submit_url)
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .json(&SubmitRequest {
                audio_url: url,
                task: "transcribe",
                language,
            })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(remote_error(SERVICE, response).await);
        }
        let queued: QueuedRequest = response.json().await?;
        tracing::debug!(request_id = %queued.request_id, "transcription queued");

        loop {
            let status: QueueStatus = self.get_json(&queued.status_url).await?;
            match status.status.as_str() {
                "COMPLETED" => break,
                "IN_QUEUE" | "IN_PROGRESS" => {
                    tokio::time::sleep(self.poll_interval).await;
                }
                other => {
                    return Err(Error::InvalidResponse {
                        service: SERVICE,
                        reason: format!("unexpected queue status {:?}", other),
                    });
                }
            }
        }

        let output: WhisperOutput = self.get_json(&queued.response_url).await?;
        tracing::debug!(
            request_id = %queued.request_id,
            chars = output.text.chars().count(),
            "transcription fetched"
        );
        Ok(output.text)
    }
}
