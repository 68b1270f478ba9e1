//! The per-job processing pipeline.
//!
//! A [`Job`] is built from the [`JobSlot`] returned by admission and handed
//! to exactly one [`PipelineExecutor`] run. The executor drives it through
//! upload, transcription, formatting and delivery, reports progress in place,
//! and releases the slot when the run ends.

mod delivery;
mod executor;
mod progress;


pub use delivery::{ChunkedDelivery, chunk_text, combine, part_marker};
pub use executor::{Collaborators, PipelineExecutor};
pub use progress::{
    PROCESSING_LABEL, ProgressReporter, RESULT_HEADER, failure_label, stage_label,
};

use crate::error::{Error, Result};
use crate::registry::JobSlot;
use crate::types::{JobId, MessageRef, OwnerId, Stage};

/// One pipeline run
///
/// The job owns its registry slot; the slot is released when the executor
/// finishes with the job, or on drop if the run is torn down early.
#[derive(Debug)]
pub struct Job {
    stage: Stage,
    progress: MessageRef,
    slot: JobSlot,
}

impl Job {
    /// Create a pending job bound to the progress message `progress`
    pub fn new(slot: JobSlot, progress: MessageRef) -> Self {
        Self {
            stage: Stage::Pending,
            progress,
            slot,
        }
    }

    /// The job's id
    pub fn id(&self) -> JobId {
        self.slot.id()
    }

    /// The submitting owner
    pub fn owner(&self) -> OwnerId {
        self.slot.owner()
    }

    /// Current stage
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// The message this job edits in place
    pub fn progress(&self) -> MessageRef {
        self.progress
    }

    /// Move to `to`
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] for anything but the next stage
    /// on the success path, or `Failed` from a non-terminal stage.
    pub fn advance(&mut self, to: Stage) -> Result<()> {
        if !self.stage.can_transition_to(to) {
            return Err(Error::InvalidTransition {
                job: self.id(),
                from: self.stage,
                to,
            });
        }
        self.stage = to;
        Ok(())
    }

    /// Mark the job failed; a no-op once the job is terminal
    pub fn fail(&mut self) {
        if !self.stage.is_terminal() {
            self.stage = Stage::Failed;
        }
    }

    /// Release the registry slot
    pub(crate) fn finish(self) -> bool {
        self.slot.release()
    }
}
