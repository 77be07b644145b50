// # Transcode Module
//
// Seam to the encoding engine. The ripper submits one job per staged file,
// polls `job_progress` on a timer (engines don't push incremental progress),
// and receives a `JobCompletion` per job on the channel given at submission.
//
// - `Transcoder`: the collaborator trait
// - `EncodePreset`: per-track target format, opaque to the ripper
// - `FfmpegTranscoder`: bundled implementation driving the ffmpeg CLI

mod ffmpeg;

pub use ffmpeg::FfmpegTranscoder;

use crate::models::ContainerType;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::mpsc;

pub type JobId = u64;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("Input file not found: {0}")]
    MissingInput(PathBuf),
    #[error("Job rejected: {0}")]
    Rejected(String),
    #[error("Encoder exited with {status}: {stderr}")]
    Exited { status: String, stderr: String },
    #[error("Worker pool closed")]
    PoolClosed,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Target encoding for a track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodePreset {
    pub name: String,
    pub container: ContainerType,
    /// Encoder arguments placed between the input and output paths
    pub codec_args: Vec<String>,
}

impl EncodePreset {
    pub fn new(name: &str, container: ContainerType, codec_args: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            container,
            codec_args: codec_args.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn flac() -> Self {
        Self::new(
            "FLAC",
            ContainerType::Flac,
            &["-c:a", "flac", "-compression_level", "8"],
        )
    }

    /// LAME VBR, quality 0 (best) to 9
    pub fn mp3_vbr(quality: u8) -> Self {
        let quality = quality.min(9).to_string();
        Self::new(
            "MP3",
            ContainerType::Mp3,
            &["-c:a", "libmp3lame", "-q:a", &quality],
        )
    }

    /// Vorbis quality -1 to 10
    pub fn ogg_vorbis(quality: i8) -> Self {
        let quality = quality.clamp(-1, 10).to_string();
        Self::new(
            "Ogg Vorbis",
            ContainerType::OggVorbis,
            &["-c:a", "libvorbis", "-q:a", &quality],
        )
    }

    pub fn extension(&self) -> &'static str {
        self.container.extension().unwrap_or("bin")
    }
}

/// A single staged-file encode
#[derive(Debug, Clone)]
pub struct TranscodeJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub preset: EncodePreset,
}

/// Reported once per submitted job, from whatever thread the engine runs on
#[derive(Debug, Clone)]
pub struct JobCompletion {
    pub job: JobId,
    pub input: PathBuf,
    pub output: PathBuf,
    pub success: bool,
}

/// Encoding engine collaborator
pub trait Transcoder: Send + Sync {
    /// Queue a job. Its completion is sent on `completion_tx` exactly once.
    fn submit_job(
        &self,
        job: TranscodeJob,
        completion_tx: mpsc::UnboundedSender<JobCompletion>,
    ) -> Result<JobId, TranscodeError>;

    /// Fraction of the job done, `None` once the job is unknown or finished
    fn job_progress(&self, job: JobId) -> Option<f32>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_quality_is_clamped() {
        let mp3 = EncodePreset::mp3_vbr(42);
        assert_eq!(mp3.codec_args, vec!["-c:a", "libmp3lame", "-q:a", "9"]);

        let vorbis = EncodePreset::ogg_vorbis(-5);
        assert_eq!(vorbis.codec_args.last().map(String::as_str), Some("-1"));
    }

    #[test]
    fn test_preset_extension_follows_container() {
        assert_eq!(EncodePreset::flac().extension(), "flac");
        assert_eq!(EncodePreset::ogg_vorbis(5).extension(), "ogg");
    }
}
