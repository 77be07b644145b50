use serde::{Deserialize, Serialize};

/// Container of the files produced by the transcoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ContainerType {
    #[default]
    Unknown,
    Flac,
    Mp3,
    OggVorbis,
    OggOpus,
    Mp4,
    Wav,
    Aiff,
}

impl ContainerType {
    /// Usual file extension, without the dot
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            ContainerType::Unknown => None,
            ContainerType::Flac => Some("flac"),
            ContainerType::Mp3 => Some("mp3"),
            ContainerType::OggVorbis | ContainerType::OggOpus => Some("ogg"),
            ContainerType::Mp4 => Some("m4a"),
            ContainerType::Wav => Some("wav"),
            ContainerType::Aiff => Some("aiff"),
        }
    }
}

/// Album-level metadata used when tagging the final files
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumInfo {
    pub album: String,
    pub artist: String,
    pub genre: String,
    pub year: u32,
    pub disc: u32,
    pub container_type: ContainerType,
}
