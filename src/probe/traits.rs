//! Trait definition for audio probes

use async_trait::async_trait;
use std::path::Path;

/// Container formats the pipeline accepts
pub const SUPPORTED_FORMATS: [&str; 4] = ["mp3", "wav", "ogg", "m4a"];

/// What a probe learned about a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    /// Candidate container names, most specific first
    ///
    /// ffprobe reports some demuxers under several names at once
    /// (`mov,mp4,m4a,3gp,3g2,mj2`), so there may be more than one.
    pub format_names: Vec<String>,
}

impl ProbeResult {
    /// Build a result from ffprobe's comma-separated `format_name`
    pub fn from_format_name(format_name: &str) -> Self {
        Self {
            format_names: format_name
                .split(',')
                .map(|s| s.trim().to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// The first reported name that is a supported format
    pub fn accepted_format(&self) -> Option<&str> {
        self.format_names
            .iter()
            .map(String::as_str)
            .find(|name| SUPPORTED_FORMATS.contains(name))
    }

    /// All reported names joined for display
    pub fn describe(&self) -> String {
        if self.format_names.is_empty() {
            "unknown".to_string()
        } else {
            self.format_names.join(",")
        }
    }
}

/// Inspects a local file and reports its container format
#[async_trait]
pub trait AudioProbe: Send + Sync {
    /// Probe the file at `path`
    ///
    /// An unrecognised file is not an error: it yields a result whose
    /// [`ProbeResult::accepted_format`] is `None`.
    async fn probe(&self, path: &Path) -> crate::Result<ProbeResult>;

    /// Probe name for logging
    fn name(&self) -> &'static str;
}
