//! Audio container probing
//!
//! Downloaded attachments are checked before any remote work starts. The
//! [`AudioProbe`] trait has two implementations:
//!
//! - [`FfprobeProbe`]: runs the external `ffprobe` binary
//! - [`SniffProbe`]: recognises containers from their magic bytes, used when
//!   `ffprobe` is not installed
//!
//! Use [`default_probe`] to pick the best available one.

mod cli;
mod sniff;
mod traits;

pub use cli::FfprobeProbe;
pub use sniff::SniffProbe;
pub use traits::{AudioProbe, ProbeResult, SUPPORTED_FORMATS};

use std::sync::Arc;

/// `ffprobe` from PATH if available, otherwise [`SniffProbe`]
pub fn default_probe() -> Arc<dyn AudioProbe> {
    match FfprobeProbe::from_path() {
        Some(probe) => {
            tracing::info!(binary = %probe.binary_path().display(), "using ffprobe for audio validation");
            Arc::new(probe)
        }
        None => {
            tracing::warn!("ffprobe not found in PATH, falling back to header sniffing");
            Arc::new(SniffProbe)
        }
    }
}
