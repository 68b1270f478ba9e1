//! Blob upload to a transfer.sh-compatible host

use super::remote_error;
use crate::config::UploadConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, Secret};
use std::path::Path;
use tokio_util::io::ReaderStream;

const SERVICE: &str = "transfer.sh";

/// Uploads a local file and returns a public download link
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Upload `path`; the link expires after `max_downloads` downloads
    async fn upload(&self, path: &Path, max_downloads: u32) -> Result<String>;
}

/// transfer.sh client
///
/// Files are streamed from disk with `PUT {host}/{file name}`; the response
/// body is the download link.
pub struct TransferShUploader {
    client: reqwest::Client,
    host: String,
    login: Option<String>,
    password: Option<Secret<String>>,
}

impl TransferShUploader {
    /// Create an uploader from configuration
    pub fn new(config: &UploadConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("audioscribe/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            host: config.host.trim_end_matches('/').to_string(),
            login: config.login.clone(),
            password: config.password.clone(),
        })
    }
}

#[async_trait]
impl Uploader for TransferShUploader {
    async fn upload(&self, path: &Path, max_downloads: u32) -> Result<String> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio");
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));

        tracing::debug!(file = file_name, size, "uploading audio");

        let mut request = self
            .client
            .put(format!("{}/{}", self.host, file_name))
            .header("Max-Downloads", max_downloads.to_string())
            .header(reqwest::header::CONTENT_LENGTH, size)
            .body(body);
        if let Some(login) = &self.login {
            request = request.basic_auth(
                login,
                self.password.as_ref().map(|p| p.expose_secret().as_str()),
            );
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(remote_error(SERVICE, response).await);
        }

        let link = response.text().await?.trim().to_string();
        url::Url::parse(&link).map_err(|e| Error::InvalidResponse {
            service: SERVICE,
            reason: format!("not a URL ({}): {:?}", e, link),
        })?;
        Ok(link)
    }
}
