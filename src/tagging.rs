//! Tag writing for finished files

use crate::models::{AlbumInfo, ContainerType};
use crate::ripper::TrackEntry;
use async_trait::async_trait;
use id3::{Tag, TagLike, Version};
use lofty::{read_from_path, Accessor, AudioFile, ItemKey, TagType, TaggedFileExt};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TagError {
    #[error("Tagging not supported for {0:?} files")]
    UnsupportedContainer(ContainerType),
    #[error("ID3 error: {0}")]
    Id3(#[from] id3::Error),
    #[error("Tag error: {0}")]
    Lofty(#[from] lofty::LoftyError),
    #[error("Tag task failed: {0}")]
    Task(String),
}

/// Everything written into one file's tags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagMetadata {
    pub album: String,
    pub artist: String,
    pub genre: String,
    pub year: u32,
    pub disc: u32,
    pub title: String,
    pub track_number: u8,
    pub container_type: ContainerType,
}

impl TagMetadata {
    /// Album container type wins; an unset one falls back to the track's preset
    pub fn for_track(album: &AlbumInfo, track: &TrackEntry) -> Self {
        let container_type = match album.container_type {
            ContainerType::Unknown => track.preset.container,
            known => known,
        };

        Self {
            album: album.album.clone(),
            artist: album.artist.clone(),
            genre: album.genre.clone(),
            year: album.year,
            disc: album.disc,
            title: track.title.clone(),
            track_number: track.track_number,
            container_type,
        }
    }
}

/// Tag-writing collaborator
#[async_trait]
pub trait TagWriter: Send + Sync {
    async fn tag_file(&self, path: &Path, metadata: &TagMetadata) -> Result<(), TagError>;
}

/// Writes tags in the container's native format: ID3v2.4 frames for MP3,
/// WAV and AIFF, Vorbis comments for FLAC and Ogg, ilst atoms for MP4
#[derive(Debug, Clone, Copy, Default)]
pub struct FileTagWriter;

#[async_trait]
impl TagWriter for FileTagWriter {
    async fn tag_file(&self, path: &Path, metadata: &TagMetadata) -> Result<(), TagError> {
        let path: PathBuf = path.to_path_buf();
        let metadata = metadata.clone();
        tokio::task::spawn_blocking(move || match native_tag_type(metadata.container_type) {
            Some(TagType::Id3v2) => write_id3(&path, &metadata),
            Some(tag_type) => write_with_lofty(&path, &metadata, tag_type),
            None => Err(TagError::UnsupportedContainer(metadata.container_type)),
        })
        .await
        .map_err(|e| TagError::Task(e.to_string()))?
    }
}

fn native_tag_type(container: ContainerType) -> Option<TagType> {
    match container {
        ContainerType::Mp3 | ContainerType::Wav | ContainerType::Aiff => Some(TagType::Id3v2),
        ContainerType::Flac | ContainerType::OggVorbis | ContainerType::OggOpus => {
            Some(TagType::VorbisComments)
        }
        ContainerType::Mp4 => Some(TagType::Mp4Ilst),
        ContainerType::Unknown => None,
    }
}

fn write_with_lofty(
    path: &Path,
    metadata: &TagMetadata,
    tag_type: TagType,
) -> Result<(), TagError> {
    let mut tagged_file = read_from_path(path)?;
    if tagged_file.tag(tag_type).is_none() {
        tagged_file.insert_tag(lofty::Tag::new(tag_type));
    }
    let tag = tagged_file
        .tag_mut(tag_type)
        .ok_or_else(|| TagError::Task(format!("no {:?} tag in {}", tag_type, path.display())))?;

    if !metadata.title.is_empty() {
        tag.set_title(metadata.title.clone());
    }
    if !metadata.album.is_empty() {
        tag.set_album(metadata.album.clone());
    }
    if !metadata.artist.is_empty() {
        tag.set_artist(metadata.artist.clone());
    }
    if !metadata.genre.is_empty() {
        tag.set_genre(metadata.genre.clone());
    }
    if metadata.year > 0 {
        tag.insert_text(ItemKey::Year, metadata.year.to_string());
    }
    if metadata.disc > 0 {
        tag.set_disk(metadata.disc);
    }
    tag.set_track(metadata.track_number as u32);

    tagged_file.save_to_path(path)?;
    tracing::debug!(
        "Tagged {} as track {} '{}' ({:?})",
        path.display(),
        metadata.track_number,
        metadata.title,
        tag_type
    );
    Ok(())
}

fn write_id3(path: &Path, metadata: &TagMetadata) -> Result<(), TagError> {
    let mut tag = Tag::new();

    if !metadata.title.is_empty() {
        tag.set_title(metadata.title.as_str());
    }
    if !metadata.album.is_empty() {
        tag.set_album(metadata.album.as_str());
    }
    if !metadata.artist.is_empty() {
        tag.set_artist(metadata.artist.as_str());
    }
    if !metadata.genre.is_empty() {
        tag.set_genre(metadata.genre.as_str());
    }
    if metadata.year > 0 {
        tag.set_year(metadata.year as i32);
    }
    if metadata.disc > 0 {
        tag.set_disc(metadata.disc);
    }
    tag.set_track(metadata.track_number as u32);

    match metadata.container_type {
        ContainerType::Wav => tag.write_to_wav_path(path, Version::Id3v24)?,
        ContainerType::Aiff => tag.write_to_aiff_path(path, Version::Id3v24)?,
        _ => tag.write_to_path(path, Version::Id3v24)?,
    }

    tracing::debug!(
        "Tagged {} as track {} '{}'",
        path.display(),
        metadata.track_number,
        metadata.title
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcode::EncodePreset;
    use tempfile::TempDir;

    fn metadata(container_type: ContainerType) -> TagMetadata {
        TagMetadata {
            album: "Blue Train".to_string(),
            artist: "John Coltrane".to_string(),
            genre: "Jazz".to_string(),
            year: 1957,
            disc: 1,
            title: "Moment's Notice".to_string(),
            track_number: 2,
            container_type,
        }
    }

    #[test]
    fn test_container_falls_back_to_preset() {
        let track = TrackEntry::new(3, "Locomotion", "/out/03.mp3", EncodePreset::mp3_vbr(2));

        let album = AlbumInfo::default();
        assert_eq!(
            TagMetadata::for_track(&album, &track).container_type,
            ContainerType::Mp3
        );

        let album = AlbumInfo {
            container_type: ContainerType::Flac,
            ..AlbumInfo::default()
        };
        let tags = TagMetadata::for_track(&album, &track);
        assert_eq!(tags.container_type, ContainerType::Flac);
        assert_eq!(tags.track_number, 3);
        assert_eq!(tags.title, "Locomotion");
    }

    #[tokio::test]
    async fn test_writes_id3_frames_to_mp3() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("02.mp3");
        std::fs::write(&path, b"not really mpeg frames").unwrap();

        FileTagWriter
            .tag_file(&path, &metadata(ContainerType::Mp3))
            .await
            .unwrap();

        let tag = Tag::read_from_path(&path).unwrap();
        assert_eq!(tag.title(), Some("Moment's Notice"));
        assert_eq!(tag.album(), Some("Blue Train"));
        assert_eq!(tag.artist(), Some("John Coltrane"));
        assert_eq!(tag.track(), Some(2));
        assert_eq!(tag.year(), Some(1957));
    }

    #[test]
    fn test_native_tag_types() {
        assert_eq!(native_tag_type(ContainerType::Flac), Some(TagType::VorbisComments));
        assert_eq!(native_tag_type(ContainerType::OggOpus), Some(TagType::VorbisComments));
        assert_eq!(native_tag_type(ContainerType::Mp4), Some(TagType::Mp4Ilst));
        assert_eq!(native_tag_type(ContainerType::Aiff), Some(TagType::Id3v2));
        assert_eq!(native_tag_type(ContainerType::Unknown), None);
    }

    #[tokio::test]
    async fn test_unknown_container_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("02.bin");
        std::fs::write(&path, b"\0\0\0\0").unwrap();

        let result = FileTagWriter
            .tag_file(&path, &metadata(ContainerType::Unknown))
            .await;
        assert!(matches!(
            result,
            Err(TagError::UnsupportedContainer(ContainerType::Unknown))
        ));
    }

    #[tokio::test]
    async fn test_garbage_flac_is_a_tag_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("02.flac");
        std::fs::write(&path, b"not a flac stream").unwrap();

        let result = FileTagWriter
            .tag_file(&path, &metadata(ContainerType::Flac))
            .await;
        assert!(result.is_err());
    }
}
