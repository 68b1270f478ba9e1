//! Configuration types for audioscribe

use crate::error::{Error, Result};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, str::FromStr, time::Duration};

/// Telegram transport settings
#[derive(Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token from @BotFather
    #[serde(serialize_with = "serialize_secret")]
    pub token: Secret<String>,

    /// Long-polling timeout passed to getUpdates (default: 30 seconds)
    #[serde(default = "default_poll_timeout", with = "duration_serde")]
    pub poll_timeout: Duration,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: Secret::new(String::new()),
            poll_timeout: default_poll_timeout(),
        }
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &"[REDACTED]")
            .field("poll_timeout", &self.poll_timeout)
            .finish()
    }
}

/// Blob upload (transfer.sh-compatible) settings
#[derive(Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Base URL of the upload host
    #[serde(default)]
    pub host: String,

    /// Basic-auth login (optional)
    #[serde(default)]
    pub login: Option<String>,

    /// Basic-auth password (optional)
    #[serde(default, serialize_with = "serialize_optional_secret")]
    pub password: Option<Secret<String>>,

    /// Number of downloads after which the uploaded file expires (default: 2)
    #[serde(default = "default_max_downloads")]
    pub max_downloads: u32,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            login: None,
            password: None,
            max_downloads: default_max_downloads(),
        }
    }
}

impl std::fmt::Debug for UploadConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadConfig")
            .field("host", &self.host)
            .field("login", &self.login)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("max_downloads", &self.max_downloads)
            .finish()
    }
}

/// Speech-to-text (fal.ai queue API) settings
#[derive(Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// API key sent as `Authorization: Key ...`
    #[serde(serialize_with = "serialize_secret")]
    pub api_key: Secret<String>,

    /// Queue API base URL (default: "https://queue.fal.run")
    #[serde(default = "default_fal_base_url")]
    pub base_url: String,

    /// Model application id (default: "fal-ai/whisper")
    #[serde(default = "default_whisper_model")]
    pub model: String,

    /// Spoken language hint (default: "ru")
    #[serde(default = "default_language")]
    pub language: String,

    /// Interval between queue status polls (default: 1 second)
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub poll_interval: Duration,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            api_key: Secret::new(String::new()),
            base_url: default_fal_base_url(),
            model: default_whisper_model(),
            language: default_language(),
            poll_interval: default_poll_interval(),
        }
    }
}

impl std::fmt::Debug for TranscriptionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscriptionConfig")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}

/// Text reformatting (OpenRouter-compatible chat completions) settings
#[derive(Clone, Serialize, Deserialize)]
pub struct FormattingConfig {
    /// Chat completions base URL (default: "https://openrouter.ai/api/v1")
    #[serde(default = "default_openrouter_base_url")]
    pub base_url: String,

    /// Bearer API key
    #[serde(serialize_with = "serialize_secret")]
    pub api_key: Secret<String>,

    /// Model tried first
    #[serde(default = "default_primary_model")]
    pub primary_model: String,

    /// Model tried when the primary fails
    #[serde(default = "default_secondary_model")]
    pub secondary_model: String,

    /// Sampling temperature (default: 0.2)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Completion token limit (default: 8000)
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Instruction sent ahead of the transcript
    #[serde(default = "default_prompt")]
    pub prompt: String,
}

impl Default for FormattingConfig {
    fn default() -> Self {
        Self {
            base_url: default_openrouter_base_url(),
            api_key: Secret::new(String::new()),
            primary_model: default_primary_model(),
            secondary_model: default_secondary_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            prompt: default_prompt(),
        }
    }
}

impl std::fmt::Debug for FormattingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormattingConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("primary_model", &self.primary_model)
            .field("secondary_model", &self.secondary_model)
            .finish_non_exhaustive()
    }
}

/// Per-call timeouts for every external operation a job performs
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Downloading the attachment from the transport (default: 120 seconds)
    #[serde(default = "default_download_timeout", with = "duration_serde")]
    pub download: Duration,

    /// Probing the audio container (default: 30 seconds)
    #[serde(default = "default_probe_timeout", with = "duration_serde")]
    pub probe: Duration,

    /// Uploading to the blob service (default: 300 seconds)
    #[serde(default = "default_upload_timeout", with = "duration_serde")]
    pub upload: Duration,

    /// Whole transcription request including queue polling (default: 900 seconds)
    #[serde(default = "default_transcription_timeout", with = "duration_serde")]
    pub transcription: Duration,

    /// Each formatting backend attempt (default: 180 seconds)
    #[serde(default = "default_formatting_timeout", with = "duration_serde")]
    pub formatting: Duration,

    /// Each transport send/edit (default: 30 seconds)
    #[serde(default = "default_transport_timeout", with = "duration_serde")]
    pub transport: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            download: default_download_timeout(),
            probe: default_probe_timeout(),
            upload: default_upload_timeout(),
            transcription: default_transcription_timeout(),
            formatting: default_formatting_timeout(),
            transport: default_transport_timeout(),
        }
    }
}

/// Job orchestration settings (bounds, temp storage, delivery limits)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobConfig {
    /// Maximum concurrently running jobs per owner (default: 3)
    #[serde(default = "default_max_concurrent_per_owner")]
    pub max_concurrent_per_owner: usize,

    /// Directory for downloaded audio (default: system temp dir)
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Maximum characters per transport message (default: 4096)
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,

    /// How long shutdown waits for running jobs (default: 30 seconds)
    #[serde(default = "default_shutdown_grace", with = "duration_serde")]
    pub shutdown_grace: Duration,

    /// Per-call timeouts
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            max_concurrent_per_owner: default_max_concurrent_per_owner(),
            temp_dir: default_temp_dir(),
            max_chunk_size: default_max_chunk_size(),
            shutdown_grace: default_shutdown_grace(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

/// Main configuration for the bot
///
/// Fields are organized into sub-configs, one per collaborator:
/// - [`telegram`](TelegramConfig): transport credentials and polling
/// - [`upload`](UploadConfig): blob upload host
/// - [`transcription`](TranscriptionConfig): speech-to-text service
/// - [`formatting`](FormattingConfig): the two reformatting backends
/// - [`jobs`](JobConfig): concurrency bound, temp storage, timeouts
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Telegram transport
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Blob upload
    #[serde(default)]
    pub upload: UploadConfig,

    /// Speech-to-text
    #[serde(default)]
    pub transcription: TranscriptionConfig,

    /// Reformatting backends
    #[serde(default)]
    pub formatting: FormattingConfig,

    /// Job orchestration
    #[serde(default)]
    pub jobs: JobConfig,
}

impl Config {
    /// Load configuration from the process environment
    ///
    /// A `.env` file in the working directory is loaded first if present.
    /// Required: `BOT_TOKEN`, `TRANSFER_SH_HOST`, `FAL_KEY`, `OPENROUTER_API_KEY`.
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!(error = %e, "no .env file loaded");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    ///
    /// Unset keys keep their defaults. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Config::default();

        if let Some(token) = get("BOT_TOKEN") {
            config.telegram.token = Secret::new(token);
        }

        if let Some(host) = get("TRANSFER_SH_HOST") {
            config.upload.host = host;
        }
        config.upload.login = get("TRANSFER_SH_LOGIN");
        config.upload.password = get("TRANSFER_SH_PASSWORD").map(Secret::new);
        if let Some(n) = parse_var(&get, "TRANSFER_SH_MAX_DOWNLOADS")? {
            config.upload.max_downloads = n;
        }

        if let Some(key) = get("FAL_KEY") {
            config.transcription.api_key = Secret::new(key);
        }
        if let Some(url) = get("FAL_BASE_URL") {
            config.transcription.base_url = url;
        }
        if let Some(language) = get("TRANSCRIPTION_LANGUAGE") {
            config.transcription.language = language;
        }

        if let Some(url) = get("OPENROUTER_BASE_URL") {
            config.formatting.base_url = url;
        }
        if let Some(key) = get("OPENROUTER_API_KEY") {
            config.formatting.api_key = Secret::new(key);
        }
        if let Some(model) = get("PRIMARY_MODEL") {
            config.formatting.primary_model = model;
        }
        if let Some(model) = get("SECONDARY_MODEL") {
            config.formatting.secondary_model = model;
        }

        if let Some(n) = parse_var(&get, "MAX_CONCURRENT_PER_OWNER")? {
            config.jobs.max_concurrent_per_owner = n;
        }
        if let Some(dir) = get("TEMP_DIR") {
            config.jobs.temp_dir = PathBuf::from(dir);
        }
        if let Some(secs) = parse_var::<u64, _>(&get, "STAGE_TIMEOUT_SECS")? {
            let timeout = Duration::from_secs(secs);
            config.jobs.timeouts.upload = timeout;
            config.jobs.timeouts.transcription = timeout;
            config.jobs.timeouts.formatting = timeout;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration is usable
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the offending key.
    pub fn validate(&self) -> Result<()> {
        if self.telegram.token.expose_secret().trim().is_empty() {
            return Err(Error::config("bot token is required", "BOT_TOKEN"));
        }
        if self.transcription.api_key.expose_secret().trim().is_empty() {
            return Err(Error::config("transcription API key is required", "FAL_KEY"));
        }
        if self.formatting.api_key.expose_secret().trim().is_empty() {
            return Err(Error::config(
                "formatting API key is required",
                "OPENROUTER_API_KEY",
            ));
        }
        for (key, value) in [
            ("TRANSFER_SH_HOST", &self.upload.host),
            ("FAL_BASE_URL", &self.transcription.base_url),
            ("OPENROUTER_BASE_URL", &self.formatting.base_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| Error::config(format!("invalid URL {:?}: {}", value, e), key))?;
        }
        if self.upload.max_downloads == 0 {
            return Err(Error::config(
                "max downloads must be at least 1",
                "TRANSFER_SH_MAX_DOWNLOADS",
            ));
        }
        if self.jobs.max_concurrent_per_owner == 0 {
            return Err(Error::config(
                "per-owner concurrency bound must be at least 1",
                "MAX_CONCURRENT_PER_OWNER",
            ));
        }
        if self.jobs.max_chunk_size < MIN_CHUNK_SIZE {
            return Err(Error::config(
                format!("chunk size must be at least {}", MIN_CHUNK_SIZE),
                "max_chunk_size",
            ));
        }
        Ok(())
    }
}

/// Smallest chunk size that leaves room for a "Part i of N" marker
const MIN_CHUNK_SIZE: usize = 64;

fn parse_var<T, G>(get: &G, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| Error::config(format!("cannot parse {:?}: {}", raw, e), key))
        })
        .transpose()
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

fn serialize_optional_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}

fn default_poll_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_downloads() -> u32 {
    2
}

fn default_fal_base_url() -> String {
    "https://queue.fal.run".to_string()
}

fn default_whisper_model() -> String {
    "fal-ai/whisper".to_string()
}

fn default_language() -> String {
    "ru".to_string()
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_openrouter_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_primary_model() -> String {
    "google/gemini-2.0-flash-exp:free".to_string()
}

fn default_secondary_model() -> String {
    "google/gemini-flash-1.5".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    8000
}

fn default_prompt() -> String {
    "Please split the following text into logical paragraphs to improve readability. \
     Keep the original content intact and only add line breaks. \
     Do not add any extra words or punctuation."
        .to_string()
}

fn default_download_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_upload_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_transcription_timeout() -> Duration {
    Duration::from_secs(900)
}

fn default_formatting_timeout() -> Duration {
    Duration::from_secs(180)
}

fn default_transport_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_concurrent_per_owner() -> usize {
    3
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_max_chunk_size() -> usize {
    4096
}

fn default_shutdown_grace() -> Duration {
    Duration::from_secs(30)
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
