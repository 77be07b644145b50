//! WAV staging writer
//!
//! Ripped sectors are staged as canonical PCM WAV files (44-byte header)
//! before being handed to the transcoder.

use crate::cd::drive::SampleFormat;
use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Length of the RIFF/WAVE header written in front of the PCM payload
pub const WAV_HEADER_LEN: u64 = 44;

const PCM_FORMAT_TAG: u16 = 1;

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid WAV header: {0}")]
    InvalidHeader(String),
    #[error("Staged data too large for a WAV container: {0} bytes")]
    TooLarge(u64),
}

/// Write a PCM WAV header announcing `byte_count` bytes of payload
pub fn write_wav_header<W: Write>(
    writer: &mut W,
    byte_count: u32,
    format: SampleFormat,
) -> io::Result<()> {
    writer.write_all(b"RIFF")?;
    writer.write_all(&byte_count.saturating_add(36).to_le_bytes())?;
    writer.write_all(b"WAVE")?;

    writer.write_all(b"fmt ")?;
    writer.write_all(&16u32.to_le_bytes())?;
    writer.write_all(&PCM_FORMAT_TAG.to_le_bytes())?;
    writer.write_all(&format.channels.to_le_bytes())?;
    writer.write_all(&format.sample_rate.to_le_bytes())?;
    writer.write_all(&format.byte_rate().to_le_bytes())?;
    writer.write_all(&format.block_align().to_le_bytes())?;
    writer.write_all(&format.bits_per_sample.to_le_bytes())?;

    writer.write_all(b"data")?;
    writer.write_all(&byte_count.to_le_bytes())?;
    Ok(())
}

/// Header of a staged file, as read back from disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub format: SampleFormat,
    pub data_len: u32,
}

impl WavHeader {
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, StagingError> {
        let mut buf = [0u8; WAV_HEADER_LEN as usize];
        reader.read_exact(&mut buf)?;

        if &buf[0..4] != b"RIFF" || &buf[8..12] != b"WAVE" {
            return Err(StagingError::InvalidHeader("missing RIFF/WAVE magic".to_string()));
        }
        if &buf[12..16] != b"fmt " || &buf[36..40] != b"data" {
            return Err(StagingError::InvalidHeader(
                "expected fmt and data chunks".to_string(),
            ));
        }

        let u16_at = |at: usize| u16::from_le_bytes([buf[at], buf[at + 1]]);
        let u32_at =
            |at: usize| u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);

        if u16_at(20) != PCM_FORMAT_TAG {
            return Err(StagingError::InvalidHeader(format!(
                "unsupported format tag {}",
                u16_at(20)
            )));
        }

        Ok(Self {
            format: SampleFormat {
                channels: u16_at(22),
                sample_rate: u32_at(24),
                bits_per_sample: u16_at(34),
            },
            data_len: u32_at(40),
        })
    }

    pub fn read_from_path(path: &Path) -> Result<Self, StagingError> {
        let mut file = File::open(path)?;
        Self::read_from(&mut file)
    }

    /// Playback length of the payload in seconds
    pub fn duration_secs(&self) -> f64 {
        let byte_rate = self.format.byte_rate();
        if byte_rate == 0 {
            return 0.0;
        }
        self.data_len as f64 / byte_rate as f64
    }
}

/// Streams PCM into a new staging file.
///
/// A placeholder header goes out on create; [`finish`](Self::finish) patches
/// it with the number of payload bytes actually written, so a track cut short
/// still produces a self-consistent file.
pub struct WavStagingWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    format: SampleFormat,
    bytes_written: u64,
}

impl WavStagingWriter {
    pub fn create(path: &Path, format: SampleFormat) -> Result<Self, StagingError> {
        let mut writer = BufWriter::new(File::create(path)?);
        write_wav_header(&mut writer, 0, format)?;

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            format,
            bytes_written: 0,
        })
    }

    pub fn write_pcm(&mut self, pcm: &[u8]) -> Result<(), StagingError> {
        let total = self.bytes_written + pcm.len() as u64;
        if total + 36 > u32::MAX as u64 {
            return Err(StagingError::TooLarge(total));
        }
        self.writer.write_all(pcm)?;
        self.bytes_written = total;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Patch the header and flush. Returns the payload byte count.
    pub fn finish(self) -> Result<u64, StagingError> {
        let mut file = self.writer.into_inner().map_err(|e| e.into_error())?;
        file.seek(SeekFrom::Start(0))?;
        // write_pcm keeps the total below u32::MAX
        write_wav_header(&mut file, self.bytes_written as u32, self.format)?;
        file.flush()?;
        Ok(self.bytes_written)
    }
}
