//! libcdio-backed disc reader
//!
//! Safe wrappers around libcdio-sys for drive access and raw audio reads.
//!
//! Requires libcdio system library to be installed:
//! - macOS: `brew install libcdio`
//! - Linux: `apt-get install libcdio-dev` or `dnf install libcdio-devel`
//! - Windows: Install libcdio from source or use vcpkg

use crate::cd::drive::{
    CdText, DiscError, DiscReader, SectorBatch, TocEntry, TrackSession, TrackText, CD_SECTOR_BYTES,
};
use std::ffi::{CStr, CString};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Sectors read per batch (75 sectors = one second of audio)
pub const DEFAULT_SECTORS_PER_BATCH: u32 = 75;

struct DeviceHandle(*mut libcdio_sys::CdIo_t);

// The pointer is only dereferenced while the owning mutex is held
unsafe impl Send for DeviceHandle {}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        unsafe {
            if !self.0.is_null() {
                libcdio_sys::cdio_destroy(self.0);
            }
        }
    }
}

type SharedDevice = Arc<Mutex<DeviceHandle>>;

fn lock(device: &SharedDevice) -> MutexGuard<'_, DeviceHandle> {
    device.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Optical drive opened through libcdio
pub struct LibcdioReader {
    device: SharedDevice,
    device_path: Option<PathBuf>,
    sectors_per_batch: u32,
}

impl LibcdioReader {
    /// Open a CD drive by device path
    pub fn open(device_path: &Path) -> Result<Self, DiscError> {
        let path_str = device_path
            .to_str()
            .ok_or_else(|| DiscError::Access("Invalid device path".to_string()))?;
        let c_path =
            CString::new(path_str).map_err(|_| DiscError::Access("Invalid device path".to_string()))?;

        let device = unsafe {
            libcdio_sys::cdio_open(c_path.as_ptr(), libcdio_sys::driver_id_t_DRIVER_DEVICE)
        };
        if device.is_null() {
            return Err(DiscError::Access(format!(
                "Failed to open device: {}",
                path_str
            )));
        }

        tracing::info!("Opened CD device {}", path_str);
        Ok(Self::from_raw(device, Some(device_path.to_path_buf())))
    }

    /// Open the system's default CD drive
    pub fn open_default() -> Result<Self, DiscError> {
        let device = unsafe {
            libcdio_sys::cdio_open(std::ptr::null(), libcdio_sys::driver_id_t_DRIVER_DEVICE)
        };
        if device.is_null() {
            return Err(DiscError::Access("No default CD device".to_string()));
        }

        tracing::info!("Opened default CD device");
        Ok(Self::from_raw(device, None))
    }

    fn from_raw(device: *mut libcdio_sys::CdIo_t, device_path: Option<PathBuf>) -> Self {
        Self {
            device: Arc::new(Mutex::new(DeviceHandle(device))),
            device_path,
            sectors_per_batch: DEFAULT_SECTORS_PER_BATCH,
        }
    }

    pub fn with_sectors_per_batch(mut self, sectors: u32) -> Self {
        self.sectors_per_batch = sectors.max(1);
        self
    }

    pub fn device_path(&self) -> Option<&Path> {
        self.device_path.as_deref()
    }

    fn has_disc(&self) -> bool {
        let device = lock(&self.device);
        unsafe {
            libcdio_sys::cdio_get_discmode(device.0)
                != libcdio_sys::discmode_t_CDIO_DISC_MODE_NO_INFO
        }
    }

    fn track_lsn_range(&self, track_number: u8) -> Result<(u32, u32), DiscError> {
        let device = lock(&self.device);
        let (first, last) = unsafe {
            (
                libcdio_sys::cdio_get_track_lsn(device.0, track_number as libcdio_sys::track_t),
                libcdio_sys::cdio_get_track_last_lsn(device.0, track_number as libcdio_sys::track_t),
            )
        };
        if first < 0 || last < first {
            return Err(DiscError::Access(format!(
                "Failed to get sector range for track {}",
                track_number
            )));
        }
        Ok((first as u32, last as u32 + 1))
    }
}

/// Copy one CD-Text field; track 0 addresses the disc-level block
///
/// # Safety
/// `cdtext` must be a live pointer returned by `cdio_get_cdtext`.
unsafe fn cdtext_field(
    cdtext: *mut libcdio_sys::cdtext_t,
    field: libcdio_sys::cdtext_field_t,
    track: u8,
) -> Option<String> {
    let value = libcdio_sys::cdtext_get_const(cdtext, field, track as libcdio_sys::track_t);
    if value.is_null() {
        return None;
    }
    let text = CStr::from_ptr(value).to_string_lossy().trim().to_string();
    (!text.is_empty()).then_some(text)
}

impl DiscReader for LibcdioReader {
    fn tracks_on_disc(&self) -> u8 {
        if !self.has_disc() {
            return 0;
        }
        let device = lock(&self.device);
        let count = unsafe { libcdio_sys::cdio_get_num_tracks(device.0) };
        // CDIO_INVALID_TRACK
        if count == 0xFF {
            0
        } else {
            count
        }
    }

    fn is_valid(&self) -> bool {
        self.has_disc()
    }

    fn media_changed(&self) -> bool {
        let device = lock(&self.device);
        unsafe { libcdio_sys::cdio_get_media_changed(device.0) == 1 }
    }

    fn table_of_contents(&self) -> Result<Vec<TocEntry>, DiscError> {
        if !self.has_disc() {
            return Err(DiscError::NoDisc);
        }
        (1..=self.tracks_on_disc())
            .map(|track_number| {
                let (first_sector, end_sector) = self.track_lsn_range(track_number)?;
                Ok(TocEntry {
                    track_number,
                    first_sector,
                    end_sector,
                })
            })
            .collect()
    }

    fn cd_text(&self) -> Option<CdText> {
        let tracks_on_disc = self.tracks_on_disc();
        let device = lock(&self.device);

        unsafe {
            let cdtext = libcdio_sys::cdio_get_cdtext(device.0);
            if cdtext.is_null() {
                return None;
            }

            let title = libcdio_sys::cdtext_field_t_CDTEXT_FIELD_TITLE;
            let performer = libcdio_sys::cdtext_field_t_CDTEXT_FIELD_PERFORMER;
            let genre = libcdio_sys::cdtext_field_t_CDTEXT_FIELD_GENRE;

            let mut text = CdText {
                album_title: cdtext_field(cdtext, title, 0),
                album_performer: cdtext_field(cdtext, performer, 0),
                genre: cdtext_field(cdtext, genre, 0),
                ..CdText::default()
            };
            for track in 1..=tracks_on_disc {
                text.tracks.insert(
                    track,
                    TrackText {
                        title: cdtext_field(cdtext, title, track),
                        performer: cdtext_field(cdtext, performer, track),
                    },
                );
            }
            // The cdtext block is owned by the device handle
            Some(text)
        }
    }

    fn open_track(&self, track_number: u8) -> Result<Box<dyn TrackSession>, DiscError> {
        if !self.has_disc() {
            return Err(DiscError::NoDisc);
        }
        if track_number == 0 || track_number > self.tracks_on_disc() {
            return Err(DiscError::InvalidTrack(track_number));
        }

        let (first, end) = self.track_lsn_range(track_number)?;
        tracing::info!(
            "Opened track {}: sectors {}..{} ({} sectors)",
            track_number,
            first,
            end,
            end - first
        );

        Ok(Box::new(LibcdioTrackSession {
            device: self.device.clone(),
            track_number,
            first,
            end,
            current: first,
            sectors_per_batch: self.sectors_per_batch,
        }))
    }
}

struct LibcdioTrackSession {
    device: SharedDevice,
    track_number: u8,
    first: u32,
    end: u32,
    current: u32,
    sectors_per_batch: u32,
}

impl TrackSession for LibcdioTrackSession {
    fn first_sector(&self) -> u32 {
        self.first
    }

    fn end_sector(&self) -> u32 {
        self.end
    }

    fn current_sector(&self) -> u32 {
        self.current
    }

    fn read_sector_batch(&mut self) -> Result<SectorBatch, DiscError> {
        let count = self.sectors_per_batch.min(self.end - self.current);
        let mut pcm = vec![0u8; count as usize * CD_SECTOR_BYTES];

        if count > 0 {
            let device = lock(&self.device);
            let result = unsafe {
                libcdio_sys::cdio_read_audio_sectors(
                    device.0,
                    pcm.as_mut_ptr() as *mut libc::c_void,
                    self.current as libcdio_sys::lsn_t,
                    count,
                )
            };
            if result != 0 {
                return Err(DiscError::Read(format!(
                    "Failed to read {} sectors at LSN {} on track {} (error code: {})",
                    count, self.current, self.track_number, result
                )));
            }
        }

        self.current += count;
        Ok(SectorBatch {
            pcm,
            done: self.current >= self.end,
        })
    }
}
