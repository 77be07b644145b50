//! Rip stage: disc sectors → staged WAV files
//!
//! Runs as one blocking loop on a dedicated worker. A failed track is
//! counted and skipped; cancellation is checked before each track and
//! between sector batches.

use super::progress::ProgressAggregate;
use super::registry::TrackEntry;
use crate::cd::{DiscError, DiscReader, SampleFormat, StagingError, WavStagingWriter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
enum RipError {
    #[error(transparent)]
    Disc(#[from] DiscError),
    #[error("Staging error: {0}")]
    Staging(#[from] StagingError),
    #[error("No staging file assigned")]
    NoStagingFile,
}

enum TrackOutcome {
    Staged { bytes: u64 },
    Cancelled,
}

pub(crate) struct RipStage {
    pub disc: Arc<dyn DiscReader>,
    pub tracks: Arc<Vec<TrackEntry>>,
    pub progress: ProgressAggregate,
    pub cancel: Arc<AtomicBool>,
}

impl RipStage {
    fn cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Rip every track in order. Returns the indices of the staged tracks.
    pub fn run(&self) -> Vec<usize> {
        let format = self.disc.sample_format();
        let mut staged = Vec::with_capacity(self.tracks.len());

        for (index, track) in self.tracks.iter().enumerate() {
            if self.cancel_requested() {
                info!(
                    "Cancel requested, not ripping track {} or later",
                    track.track_number
                );
                break;
            }

            match self.rip_track(index, track, format) {
                Ok(TrackOutcome::Staged { bytes }) => {
                    info!("Ripped track {} ({} bytes)", track.track_number, bytes);
                    staged.push(index);
                }
                Ok(TrackOutcome::Cancelled) => {
                    info!("Cancelled while ripping track {}", track.track_number);
                    break;
                }
                Err(e) => {
                    warn!("Failed to rip track {}: {}", track.track_number, e);
                    self.progress.complete_track(index);
                    self.progress.record_failure();
                }
            }
        }

        staged
    }

    fn rip_track(
        &self,
        index: usize,
        track: &TrackEntry,
        format: SampleFormat,
    ) -> Result<TrackOutcome, RipError> {
        if self.disc.media_changed() {
            return Err(DiscError::MediaChanged.into());
        }

        let path = track
            .temporary_filename
            .as_deref()
            .ok_or(RipError::NoStagingFile)?;
        let mut session = self.disc.open_track(track.track_number)?;
        let mut writer = WavStagingWriter::create(path, format)?;

        loop {
            let batch = session.read_sector_batch()?;
            writer.write_pcm(&batch.pcm)?;
            self.progress.update_rip(index, session.progress());

            if batch.done {
                break;
            }
            if self.cancel_requested() {
                // Partial file stays in the staging dir until it is removed
                return Ok(TrackOutcome::Cancelled);
            }
        }

        let bytes = writer.finish()?;
        self.progress.update_rip(index, 1.0);
        Ok(TrackOutcome::Staged { bytes })
    }
}
