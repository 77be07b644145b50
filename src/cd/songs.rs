//! Disc listing: one song per audio track
//!
//! Every track starts as "Track N" with its length from the TOC. CD-Text,
//! when present, fills in titles and performers plus the album fields.

use crate::cd::drive::{CdText, DiscError, DiscReader, TocEntry};
use crate::models::AlbumInfo;
use std::time::Duration;
use tracing::{debug, info};

/// A track as presented to the caller before ripping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscSong {
    pub track_number: u8,
    pub title: String,
    /// Track performer from CD-Text, if any
    pub artist: Option<String>,
    pub duration: Duration,
}

/// Songs on the disc plus whatever album metadata the disc itself carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscContents {
    pub songs: Vec<DiscSong>,
    pub album: AlbumInfo,
    pub has_cd_text: bool,
}

impl DiscContents {
    pub fn song(&self, track_number: u8) -> Option<&DiscSong> {
        self.songs.iter().find(|s| s.track_number == track_number)
    }
}

pub fn default_title(track_number: u8) -> String {
    format!("Track {}", track_number)
}

/// Read the TOC and CD-Text of the disc in `disc`
pub fn load_disc_contents(disc: &dyn DiscReader) -> Result<DiscContents, DiscError> {
    if !disc.is_valid() {
        return Err(DiscError::NoDisc);
    }

    let toc = disc.table_of_contents()?;
    let text = disc.cd_text().filter(|text| !text.is_empty());
    info!(
        "Disc has {} tracks{}",
        toc.len(),
        if text.is_some() { " with CD-Text" } else { "" }
    );

    Ok(build_contents(&toc, text.as_ref()))
}

fn build_contents(toc: &[TocEntry], text: Option<&CdText>) -> DiscContents {
    let mut songs: Vec<DiscSong> = toc
        .iter()
        .map(|entry| DiscSong {
            track_number: entry.track_number,
            title: default_title(entry.track_number),
            artist: None,
            duration: entry.duration(),
        })
        .collect();

    let mut album = AlbumInfo::default();
    let Some(text) = text else {
        return DiscContents {
            songs,
            album,
            has_cd_text: false,
        };
    };

    album.album = text.album_title.clone().unwrap_or_default();
    album.artist = text.album_performer.clone().unwrap_or_default();
    album.genre = text.genre.clone().unwrap_or_default();

    for song in &mut songs {
        let Some(track_text) = text.tracks.get(&song.track_number) else {
            continue;
        };
        if let Some(title) = track_text.title.as_ref().filter(|t| !t.is_empty()) {
            debug!("CD-Text title for track {}: {}", song.track_number, title);
            song.title = title.clone();
        }
        song.artist = track_text.performer.clone().filter(|p| !p.is_empty());
    }

    DiscContents {
        songs,
        album,
        has_cd_text: true,
    }
}
