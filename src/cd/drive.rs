//! Disc access seam
//!
//! The ripper never touches optical media directly: everything goes through
//! [`DiscReader`], which hands out one [`TrackSession`] per track. Reads are
//! blocking and are only ever driven from the rip stage's blocking worker.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Size of one raw CD-DA sector in bytes
pub const CD_SECTOR_BYTES: usize = 2352;

/// Audio sectors per second of playback
pub const CD_SECTORS_PER_SECOND: u32 = 75;

#[derive(Debug, Error)]
pub enum DiscError {
    #[error("No disc in drive")]
    NoDisc,
    #[error("Media changed since the disc was opened")]
    MediaChanged,
    #[error("Invalid track number: {0}")]
    InvalidTrack(u8),
    #[error("Read error: {0}")]
    Read(String),
    #[error("Drive access error: {0}")]
    Access(String),
}

/// PCM layout of the sectors a disc delivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleFormat {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

impl SampleFormat {
    /// Red Book audio: 44.1 kHz, 16 bit, stereo
    pub const CD_AUDIO: SampleFormat = SampleFormat {
        channels: 2,
        sample_rate: 44_100,
        bits_per_sample: 16,
    };

    pub fn block_align(&self) -> u16 {
        self.channels * (self.bits_per_sample / 8)
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * self.block_align() as u32
    }
}

impl Default for SampleFormat {
    fn default() -> Self {
        Self::CD_AUDIO
    }
}

/// One track of the disc's table of contents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    pub track_number: u8,
    pub first_sector: u32,
    /// One past the last sector of the track
    pub end_sector: u32,
}

impl TocEntry {
    pub fn sector_count(&self) -> u32 {
        self.end_sector.saturating_sub(self.first_sector)
    }

    pub fn duration(&self) -> Duration {
        let sectors = self.sector_count() as u64;
        Duration::from_millis(sectors * 1000 / CD_SECTORS_PER_SECOND as u64)
    }
}

/// CD-Text fields of one track
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackText {
    pub title: Option<String>,
    pub performer: Option<String>,
}

/// CD-Text block of a disc. Disc-level fields describe the album.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdText {
    pub album_title: Option<String>,
    pub album_performer: Option<String>,
    pub genre: Option<String>,
    pub tracks: BTreeMap<u8, TrackText>,
}

impl CdText {
    pub fn is_empty(&self) -> bool {
        self.album_title.is_none()
            && self.album_performer.is_none()
            && self.genre.is_none()
            && self.tracks.values().all(|t| t.title.is_none() && t.performer.is_none())
    }
}

/// One batch of sectors read from a track
#[derive(Debug, Clone, Default)]
pub struct SectorBatch {
    pub pcm: Vec<u8>,
    /// True once the last sector of the track has been delivered
    pub done: bool,
}

/// Read cursor over a single track, positioned at its first sector on open
pub trait TrackSession: Send {
    /// First sector of the track
    fn first_sector(&self) -> u32;
    /// One past the last sector of the track
    fn end_sector(&self) -> u32;
    /// Next sector to be read
    fn current_sector(&self) -> u32;
    fn read_sector_batch(&mut self) -> Result<SectorBatch, DiscError>;

    /// Fraction of the track read so far, in [0, 1]
    fn progress(&self) -> f32 {
        let start = self.first_sector();
        let end = self.end_sector();
        if end <= start {
            return 1.0;
        }
        let current = self.current_sector().clamp(start, end);
        (current - start) as f32 / (end - start) as f32
    }
}

/// Optical drive collaborator
pub trait DiscReader: Send + Sync {
    /// Number of audio tracks, 0 when no valid disc is open
    fn tracks_on_disc(&self) -> u8;
    /// Whether a readable disc session is open
    fn is_valid(&self) -> bool;
    /// Whether the media changed since the last check
    fn media_changed(&self) -> bool;
    fn open_track(&self, track_number: u8) -> Result<Box<dyn TrackSession>, DiscError>;
    /// Sector ranges of every audio track, in track order
    fn table_of_contents(&self) -> Result<Vec<TocEntry>, DiscError>;

    /// CD-Text, when the disc carries any
    fn cd_text(&self) -> Option<CdText> {
        None
    }

    fn sample_format(&self) -> SampleFormat {
        SampleFormat::CD_AUDIO
    }
}
