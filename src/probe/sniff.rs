//! Magic-byte probe for hosts without ffprobe

use super::traits::{AudioProbe, ProbeResult};
use async_trait::async_trait;
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Bytes read from the start of the file
const HEADER_LEN: usize = 16;

/// Recognises mp3, wav, ogg and m4a from their leading bytes
///
/// Less thorough than ffprobe (a valid header says nothing about the rest of
/// the file) but needs no external binary.
pub struct SniffProbe;

#[async_trait]
impl AudioProbe for SniffProbe {
    async fn probe(&self, path: &Path) -> crate::Result<ProbeResult> {
        let mut file = tokio::fs::File::open(path).await?;
        let mut header = [0u8; HEADER_LEN];
        let mut filled = 0;
        while filled < HEADER_LEN {
            let n = file.read(&mut header[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        let format_names = sniff(&header[..filled])
            .map(|name| vec![name.to_string()])
            .unwrap_or_default();
        Ok(ProbeResult { format_names })
    }

    fn name(&self) -> &'static str {
        "sniff"
    }
}

fn sniff(header: &[u8]) -> Option<&'static str> {
    if header.starts_with(b"OggS") {
        return Some("ogg");
    }
    if header.len() >= 12 && header.starts_with(b"RIFF") && &header[8..12] == b"WAVE" {
        return Some("wav");
    }
    if header.len() >= 8 && &header[4..8] == b"ftyp" {
        return Some("m4a");
    }
    if header.starts_with(b"ID3") {
        return Some("mp3");
    }
    // Bare MPEG audio frame sync
    if header.len() >= 2 && header[0] == 0xFF && header[1] & 0xE0 == 0xE0 {
        return Some("mp3");
    }
    None
}
