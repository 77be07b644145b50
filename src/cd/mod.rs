//! CD access module
//!
//! Disc reading seam, disc listing (TOC and CD-Text), WAV staging of ripped
//! sectors, and the libcdio implementation of the reader (behind the
//! `libcdio` feature).

pub mod drive;
#[cfg(feature = "libcdio")]
pub mod libcdio;
pub mod songs;
pub mod wav;

pub use drive::{
    CdText, DiscError, DiscReader, SampleFormat, SectorBatch, TocEntry, TrackSession, TrackText,
    CD_SECTORS_PER_SECOND, CD_SECTOR_BYTES,
};
#[cfg(feature = "libcdio")]
pub use libcdio::LibcdioReader;
pub use songs::{load_disc_contents, DiscContents, DiscSong};
pub use wav::{write_wav_header, StagingError, WavHeader, WavStagingWriter, WAV_HEADER_LEN};
