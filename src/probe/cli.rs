//! ffprobe-based audio probe

use super::traits::{AudioProbe, ProbeResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Probe using the external `ffprobe` binary
///
/// Runs `ffprobe -v quiet -print_format json -show_format <file>` and reads
/// `format.format_name` from the output. A file ffprobe cannot parse is
/// reported as an unrecognised format rather than an error.
///
/// # Examples
///
/// ```no_run
/// use audioscribe::probe::{AudioProbe, FfprobeProbe};
/// use std::path::Path;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let probe = FfprobeProbe::from_path().expect("ffprobe not found in PATH");
/// let result = probe.probe(Path::new("voice.ogg")).await?;
/// println!("accepted as {:?}", result.accepted_format());
/// # Ok(())
/// # }
/// ```
pub struct FfprobeProbe {
    binary_path: PathBuf,
}

#[derive(Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
}

#[derive(Deserialize)]
struct FfprobeFormat {
    #[serde(default)]
    format_name: String,
}

impl FfprobeProbe {
    /// Create a probe with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Attempt to find ffprobe in PATH
    pub fn from_path() -> Option<Self> {
        which::which("ffprobe").ok().map(Self::new)
    }

    /// Path of the ffprobe binary in use
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }
}

#[async_trait]
impl AudioProbe for FfprobeProbe {
    async fn probe(&self, path: &Path) -> crate::Result<ProbeResult> {
        let output = Command::new(&self.binary_path)
            .args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .arg(path)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| crate::Error::ExternalTool(format!("Failed to execute ffprobe: {}", e)))?;

        if !output.status.success() {
            tracing::debug!(
                path = %path.display(),
                status = ?output.status.code(),
                "ffprobe could not read file"
            );
            return Ok(ProbeResult {
                format_names: Vec::new(),
            });
        }

        parse_ffprobe_output(&output.stdout)
    }

    fn name(&self) -> &'static str {
        "ffprobe"
    }
}

fn parse_ffprobe_output(stdout: &[u8]) -> crate::Result<ProbeResult> {
    let parsed: FfprobeOutput = serde_json::from_slice(stdout)?;
    Ok(parsed
        .format
        .map(|f| ProbeResult::from_format_name(&f.format_name))
        .unwrap_or(ProbeResult {
            format_names: Vec::new(),
        }))
}
