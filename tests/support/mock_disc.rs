use cdrip::cd::{
    CdText, DiscError, DiscReader, SectorBatch, TocEntry, TrackSession, CD_SECTOR_BYTES,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

/// Lets a test hold the rip worker inside a track
#[derive(Default)]
pub struct ReadGate {
    state: Mutex<(bool, bool)>,
    changed: Condvar,
}

impl ReadGate {
    /// True once the worker is blocked at the gate
    pub fn is_waiting(&self) -> bool {
        self.state.lock().unwrap().0
    }

    pub fn open(&self) {
        self.state.lock().unwrap().1 = true;
        self.changed.notify_all();
    }

    fn wait(&self) {
        let mut state = self.state.lock().unwrap();
        state.0 = true;
        while !state.1 {
            state = self.changed.wait(state).unwrap();
        }
    }
}

#[derive(Default)]
struct Faults {
    failing_tracks: HashSet<u8>,
    panicking_tracks: HashSet<u8>,
    gated_track: Option<(u8, Arc<ReadGate>)>,
    blocked_staging: Option<(u8, PathBuf)>,
}

/// In-memory disc: each track is a run of sectors filled with its track number
pub struct MockDisc {
    track_sectors: Vec<u32>,
    sectors_per_batch: u32,
    valid: AtomicBool,
    media_changed: AtomicBool,
    cd_text: Mutex<Option<CdText>>,
    faults: Mutex<Faults>,
    opened: Mutex<Vec<u8>>,
}

impl MockDisc {
    pub fn new(track_sectors: &[u32]) -> Self {
        Self {
            track_sectors: track_sectors.to_vec(),
            sectors_per_batch: 8,
            valid: AtomicBool::new(true),
            media_changed: AtomicBool::new(false),
            cd_text: Mutex::new(None),
            faults: Mutex::new(Faults::default()),
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn without_disc() -> Self {
        let disc = Self::new(&[]);
        disc.valid.store(false, Ordering::SeqCst);
        disc
    }

    /// Reads of this track fail after the first batch
    pub fn fail_track(&self, track_number: u8) {
        self.faults.lock().unwrap().failing_tracks.insert(track_number);
    }

    /// Reads of this track panic after the first batch
    pub fn panic_on_track(&self, track_number: u8) {
        self.faults
            .lock()
            .unwrap()
            .panicking_tracks
            .insert(track_number);
    }

    /// The second batch read of this track waits on the returned gate
    pub fn gate_track(&self, track_number: u8) -> Arc<ReadGate> {
        let gate = Arc::new(ReadGate::default());
        self.faults.lock().unwrap().gated_track = Some((track_number, gate.clone()));
        gate
    }

    /// Opening this track puts a directory where its staging file goes, so
    /// the staging file cannot be created. `temp_root` is the configured root.
    pub fn block_staging_file(&self, track_number: u8, temp_root: &Path) {
        self.faults.lock().unwrap().blocked_staging =
            Some((track_number, temp_root.to_path_buf()));
    }

    pub fn set_media_changed(&self, changed: bool) {
        self.media_changed.store(changed, Ordering::SeqCst);
    }

    pub fn set_cd_text(&self, text: CdText) {
        *self.cd_text.lock().unwrap() = Some(text);
    }

    pub fn opened_tracks(&self) -> Vec<u8> {
        self.opened.lock().unwrap().clone()
    }

    pub fn sectors(&self, track_number: u8) -> u32 {
        self.track_sectors[track_number as usize - 1]
    }

    fn first_sector(&self, track_number: u8) -> u32 {
        150 + self.track_sectors[..track_number as usize - 1]
            .iter()
            .sum::<u32>()
    }

    fn occupy_staging_path(temp_root: &Path, track_number: u8) {
        for entry in std::fs::read_dir(temp_root).unwrap() {
            let run_dir = entry.unwrap().path();
            std::fs::create_dir_all(run_dir.join(format!("track-{:02}.wav", track_number)))
                .unwrap();
        }
    }
}

impl DiscReader for MockDisc {
    fn tracks_on_disc(&self) -> u8 {
        if self.is_valid() {
            self.track_sectors.len() as u8
        } else {
            0
        }
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    fn media_changed(&self) -> bool {
        self.media_changed.load(Ordering::SeqCst)
    }

    fn open_track(&self, track_number: u8) -> Result<Box<dyn TrackSession>, DiscError> {
        if !self.is_valid() {
            return Err(DiscError::NoDisc);
        }
        if track_number == 0 || track_number > self.tracks_on_disc() {
            return Err(DiscError::InvalidTrack(track_number));
        }
        self.opened.lock().unwrap().push(track_number);

        let faults = self.faults.lock().unwrap();
        if let Some((blocked, temp_root)) = &faults.blocked_staging {
            if *blocked == track_number {
                Self::occupy_staging_path(temp_root, track_number);
            }
        }

        let start = self.first_sector(track_number);
        Ok(Box::new(MockSession {
            track_number,
            start,
            end: start + self.sectors(track_number),
            current: start,
            sectors_per_batch: self.sectors_per_batch,
            failing: faults.failing_tracks.contains(&track_number),
            panicking: faults.panicking_tracks.contains(&track_number),
            gate: faults
                .gated_track
                .as_ref()
                .filter(|(gated, _)| *gated == track_number)
                .map(|(_, gate)| gate.clone()),
        }))
    }

    fn table_of_contents(&self) -> Result<Vec<TocEntry>, DiscError> {
        if !self.is_valid() {
            return Err(DiscError::NoDisc);
        }
        Ok((1..=self.tracks_on_disc())
            .map(|track_number| {
                let first_sector = self.first_sector(track_number);
                TocEntry {
                    track_number,
                    first_sector,
                    end_sector: first_sector + self.sectors(track_number),
                }
            })
            .collect())
    }

    fn cd_text(&self) -> Option<CdText> {
        self.cd_text.lock().unwrap().clone()
    }
}

struct MockSession {
    track_number: u8,
    start: u32,
    end: u32,
    current: u32,
    sectors_per_batch: u32,
    failing: bool,
    panicking: bool,
    gate: Option<Arc<ReadGate>>,
}

impl TrackSession for MockSession {
    fn first_sector(&self) -> u32 {
        self.start
    }

    fn end_sector(&self) -> u32 {
        self.end
    }

    fn current_sector(&self) -> u32 {
        self.current
    }

    fn read_sector_batch(&mut self) -> Result<SectorBatch, DiscError> {
        if self.current > self.start {
            if let Some(gate) = self.gate.take() {
                gate.wait();
            }
            if self.panicking {
                panic!("drive firmware crashed on track {}", self.track_number);
            }
            if self.failing {
                return Err(DiscError::Read(format!(
                    "unreadable sector {} on track {}",
                    self.current, self.track_number
                )));
            }
        }

        let count = self.sectors_per_batch.min(self.end - self.current);
        self.current += count;
        Ok(SectorBatch {
            pcm: vec![self.track_number; count as usize * CD_SECTOR_BYTES],
            done: self.current >= self.end,
        })
    }
}
