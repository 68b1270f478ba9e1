//! Splitting long results into transport-sized messages and sending them in order.

use crate::error::StageError;
use crate::transport::Transport;
use crate::types::MessageRef;
use std::sync::Arc;
use std::time::Duration;
use unicode_segmentation::UnicodeSegmentation;

/// Sends a (possibly long) text as an ordered series of messages
///
/// The first chunk replaces the job's progress message; the remaining chunks
/// are sent as new messages, each only after the previous one was accepted.
#[derive(Clone)]
pub struct ChunkedDelivery {
    transport: Arc<dyn Transport>,
    max_chunk_size: usize,
    call_timeout: Duration,
}

impl ChunkedDelivery {
    /// Create a delivery helper that never sends more than `max_chunk_size` characters per call
    pub fn new(
        transport: Arc<dyn Transport>,
        max_chunk_size: usize,
        call_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            max_chunk_size,
            call_timeout,
        }
    }

    /// Deliver `text`, optionally preceded by `header`
    ///
    /// Returns the number of messages the text was split into.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::Delivery`] if chunking is impossible or any
    /// transport call fails or times out. Chunks after the failing one are
    /// not sent.
    pub async fn deliver(
        &self,
        handle: MessageRef,
        text: &str,
        header: Option<&str>,
    ) -> Result<usize, StageError> {
        let combined = combine(text, header);
        let chunks = chunk_text(&combined, self.max_chunk_size)?;
        let total = chunks.len();

        for (index, chunk) in chunks.iter().enumerate() {
            let call = async {
                if index == 0 {
                    self.transport.edit_message(handle, chunk).await
                } else {
                    self.transport
                        .send_message(handle.chat_id, chunk)
                        .await
                        .map(|_| ())
                }
            };

            match tokio::time::timeout(self.call_timeout, call).await {
                Ok(Ok(())) => {
                    tracing::debug!(chunk = index + 1, total, "chunk delivered");
                }
                Ok(Err(e)) => {
                    return Err(StageError::Delivery(format!(
                        "part {} of {}: {}",
                        index + 1,
                        total,
                        e
                    )));
                }
                Err(_) => {
                    return Err(StageError::Delivery(format!(
                        "part {} of {} timed out after {}s",
                        index + 1,
                        total,
                        self.call_timeout.as_secs()
                    )));
                }
            }
        }

        Ok(total)
    }
}

/// Prepend the trimmed header, separated by a newline
pub fn combine(text: &str, header: Option<&str>) -> String {
    match header.map(str::trim).filter(|h| !h.is_empty()) {
        Some(header) => format!("{}\n{}", header, text),
        None => text.to_string(),
    }
}

/// The marker placed in front of chunk `index` of `total`
pub fn part_marker(index: usize, total: usize) -> String {
    format!("Part {} of {}:\n", index, total)
}

/// Split `text` into chunks of at most `max` characters
///
/// Text that fits is returned as a single undecorated chunk. Otherwise every
/// chunk starts with a [`part_marker`] and the body budget is shrunk by the
/// marker length, so decorated chunks still fit. Cuts only land on grapheme
/// cluster boundaries; a single cluster longer than the budget is the one
/// exception and is split by characters.
///
/// # Errors
///
/// Returns [`StageError::Delivery`] when `max` leaves no room for a body.
pub fn chunk_text(text: &str, max: usize) -> Result<Vec<String>, StageError> {
    if text.chars().count() <= max {
        return Ok(vec![text.to_string()]);
    }

    let graphemes: Vec<&str> = text.graphemes(true).collect();

    // The marker length depends on the chunk count, which depends on the
    // marker length; grow the assumed count until the split agrees with it.
    let mut assumed = 2;
    loop {
        let marker_len = part_marker(assumed, assumed).chars().count();
        let budget = max.saturating_sub(marker_len);
        if budget == 0 {
            return Err(StageError::Delivery(format!(
                "chunk size {} cannot hold a part marker",
                max
            )));
        }

        let bodies = split_graphemes(&graphemes, budget);
        if bodies.len() <= assumed {
            let total = bodies.len();
            return Ok(bodies
                .into_iter()
                .enumerate()
                .map(|(i, body)| format!("{}{}", part_marker(i + 1, total), body))
                .collect());
        }
        assumed = bodies.len();
    }
}

fn split_graphemes(graphemes: &[&str], budget: usize) -> Vec<String> {
    let mut bodies = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for grapheme in graphemes {
        let len = grapheme.chars().count();

        if len > budget {
            if !current.is_empty() {
                bodies.push(std::mem::take(&mut current));
                current_len = 0;
            }
            for c in grapheme.chars() {
                if current_len == budget {
                    bodies.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                current.push(c);
                current_len += 1;
            }
            continue;
        }

        if current_len + len > budget {
            bodies.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current.push_str(grapheme);
        current_len += len;
    }

    if !current.is_empty() {
        bodies.push(current);
    }
    bodies
}
