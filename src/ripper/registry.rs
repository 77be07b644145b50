// # Track Registry
//
// Tracks selected for ripping plus the album metadata. Filled in by the
// caller before a run; during a run only `temporary_filename` changes.

use crate::models::AlbumInfo;
use crate::transcode::EncodePreset;
use std::path::{Path, PathBuf};
use tracing::warn;

/// One track selected for ripping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackEntry {
    pub track_number: u8,
    pub title: String,
    pub target_filename: PathBuf,
    pub preset: EncodePreset,
    /// Staging file inside the run's private directory, assigned at start
    pub temporary_filename: Option<PathBuf>,
}

impl TrackEntry {
    pub fn new(
        track_number: u8,
        title: &str,
        target_filename: impl Into<PathBuf>,
        preset: EncodePreset,
    ) -> Self {
        Self {
            track_number,
            title: title.to_string(),
            target_filename: target_filename.into(),
            preset,
            temporary_filename: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct TrackRegistry {
    tracks: Vec<TrackEntry>,
    album: AlbumInfo,
}

impl TrackRegistry {
    /// Register a track. Rejected (returns false) when the number is outside
    /// `1..=tracks_on_disc` or already registered.
    pub fn add_track(&mut self, tracks_on_disc: u8, entry: TrackEntry) -> bool {
        if entry.track_number == 0 || entry.track_number > tracks_on_disc {
            warn!(
                "Ignoring track {}: disc has {} tracks",
                entry.track_number, tracks_on_disc
            );
            return false;
        }
        if self.contains(entry.track_number) {
            warn!("Ignoring track {}: already added", entry.track_number);
            return false;
        }

        self.tracks.push(entry);
        true
    }

    pub fn contains(&self, track_number: u8) -> bool {
        self.tracks.iter().any(|t| t.track_number == track_number)
    }

    pub fn set_album(&mut self, album: AlbumInfo) {
        self.album = album;
    }

    pub fn album(&self) -> &AlbumInfo {
        &self.album
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
    }

    pub fn tracks(&self) -> &[TrackEntry] {
        &self.tracks
    }

    /// Sort into rip order and give every track a staging file in `dir`.
    /// Returns a copy of the tracks for the run.
    pub fn prepare_run(&mut self, dir: &Path) -> Vec<TrackEntry> {
        self.tracks.sort_by_key(|t| t.track_number);
        for track in &mut self.tracks {
            track.temporary_filename =
                Some(dir.join(format!("track-{:02}.wav", track.track_number)));
        }
        self.tracks.clone()
    }
}
