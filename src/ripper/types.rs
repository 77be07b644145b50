use std::path::PathBuf;
use thiserror::Error;

/// Lifecycle of a ripping run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    Ripping,
    Transcoding,
    Tagging,
    Finished,
    Cancelled,
}

impl RunState {
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            RunState::Ripping | RunState::Transcoding | RunState::Tagging
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Finished | RunState::Cancelled)
    }
}

/// Final counts of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RipSummary {
    pub finished_success: usize,
    pub finished_failed: usize,
    pub files_tagged: usize,
    pub tag_failures: usize,
}

/// Notifications for the caller
#[derive(Debug, Clone, PartialEq)]
pub enum RipperEvent {
    StateChanged(RunState),
    ProgressRangeChanged { min: u32, max: u32 },
    ProgressUpdated(u32),
    /// Every selected track has been read from the disc (or failed)
    RippingComplete,
    Finished(RipSummary),
    Cancelled,
}

#[derive(Debug, Error)]
pub enum RipperError {
    #[error("No valid disc in drive")]
    NoValidDisc,
    #[error("No tracks added")]
    NoTracks,
    #[error("A run is already in progress ({0:?})")]
    AlreadyRunning(RunState),
    #[error("Track list must be cleared and refilled before starting again")]
    StaleTrackList,
    #[error("Failed to create staging directory in {path}: {source}")]
    StagingDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Messages delivered to the run loop by the rip worker, tag tasks and
/// `Ripper::cancel`
#[derive(Debug)]
pub(crate) enum StageMessage {
    RippingComplete { staged: Vec<usize> },
    TagComplete { index: usize, success: bool },
    CancelRequested,
}
