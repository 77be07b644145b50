// # Ripper - Orchestrator
//
// Public face of the ripping pipeline. Owns the track registry and the
// run-state lock; `start()` validates and hands the run to a `RunDriver`
// task that sequences rip → transcode → tag and reports over `RipperEvent`s.
//
// Everything behind `Control` is guarded by a single mutex that is only held
// for field updates, never across disc or encoder calls.

use super::events::EventBroadcaster;
use super::progress::{ProgressAggregate, ProgressSnapshot};
use super::registry::{TrackEntry, TrackRegistry};
use super::run::RunDriver;
use super::types::{RipSummary, RipperError, RipperEvent, RunState, StageMessage};
use crate::cd::{load_disc_contents, DiscContents, DiscError, DiscReader};
use crate::config::RipperConfig;
use crate::models::AlbumInfo;
use crate::tagging::TagWriter;
use crate::transcode::{EncodePreset, Transcoder};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Handles of the current (or last) run
pub(super) struct RunHandle {
    cancel: Arc<AtomicBool>,
    stage_tx: mpsc::UnboundedSender<StageMessage>,
    progress: ProgressAggregate,
}

pub(super) struct Control {
    pub registry: TrackRegistry,
    pub state: RunState,
    pub summary: Option<RipSummary>,
    run: Option<RunHandle>,
    /// Set when a run takes the track list; cleared by `clear_tracks`
    registry_consumed: bool,
}

#[derive(Clone)]
pub(super) struct SharedControl(Arc<Mutex<Control>>);

impl SharedControl {
    pub(super) fn lock_control(&self) -> MutexGuard<'_, Control> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Rips selected tracks from an audio CD, transcodes them to the chosen
/// presets, and tags the results with the album metadata.
///
/// Add tracks with [`add_track`](Self::add_track) and album metadata with
/// [`set_album_information`](Self::set_album_information), then call
/// [`start`](Self::start). Progress and the final `Finished`/`Cancelled`
/// notification arrive on [`subscribe`](Self::subscribe) receivers.
pub struct Ripper {
    disc: Arc<dyn DiscReader>,
    transcoder: Arc<dyn Transcoder>,
    tagger: Arc<dyn TagWriter>,
    config: RipperConfig,
    control: SharedControl,
    events: EventBroadcaster,
    runtime_handle: tokio::runtime::Handle,
}

impl Ripper {
    pub fn new(
        disc: Arc<dyn DiscReader>,
        transcoder: Arc<dyn Transcoder>,
        tagger: Arc<dyn TagWriter>,
        config: RipperConfig,
        runtime_handle: tokio::runtime::Handle,
    ) -> Self {
        Self {
            disc,
            transcoder,
            tagger,
            config,
            control: SharedControl(Arc::new(Mutex::new(Control {
                registry: TrackRegistry::default(),
                state: RunState::Idle,
                summary: None,
                run: None,
                registry_consumed: false,
            }))),
            events: EventBroadcaster::default(),
            runtime_handle,
        }
    }

    /// Subscribe to ripper notifications
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<RipperEvent> {
        self.events.subscribe()
    }

    /// Add a track to the rip list if its number exists on the disc.
    /// Out-of-range and duplicate numbers are ignored, as is any call
    /// while a run is active.
    pub fn add_track(
        &self,
        track_number: u8,
        title: &str,
        target_filename: impl Into<PathBuf>,
        preset: EncodePreset,
    ) {
        let tracks_on_disc = self.tracks_on_disc();
        let entry = TrackEntry::new(track_number, title, target_filename, preset);

        let mut control = self.control.lock_control();
        if control.state.is_active() {
            warn!("Ignoring track {}: a run is active", track_number);
            return;
        }
        if control.registry.add_track(tracks_on_disc, entry) {
            info!("Added track {} '{}'", track_number, title);
        }
    }

    /// Set album metadata used when tagging. Ignored while a run is active.
    pub fn set_album_information(&self, album: AlbumInfo) {
        let mut control = self.control.lock_control();
        if control.state.is_active() {
            warn!("Ignoring album information: a run is active");
            return;
        }
        control.registry.set_album(album);
    }

    pub fn album_information(&self) -> AlbumInfo {
        self.control.lock_control().registry.album().clone()
    }

    /// Number of audio tracks on the disc, 0 without a valid disc
    pub fn tracks_on_disc(&self) -> u8 {
        if !self.disc.is_valid() {
            return 0;
        }
        self.disc.tracks_on_disc()
    }

    pub fn added_tracks(&self) -> usize {
        self.control.lock_control().registry.len()
    }

    pub fn tracks(&self) -> Vec<TrackEntry> {
        self.control.lock_control().registry.tracks().to_vec()
    }

    /// Empty the rip list. Ignored while a run is active.
    pub fn clear_tracks(&self) {
        let mut control = self.control.lock_control();
        if control.state.is_active() {
            warn!("Ignoring clear: a run is active");
            return;
        }
        control.registry.clear();
        control.registry_consumed = false;
    }

    /// Songs on the disc ("Track N" titles unless CD-Text names them) and the
    /// album fields the disc carries. Blocks on the drive.
    pub fn disc_contents(&self) -> Result<DiscContents, DiscError> {
        load_disc_contents(self.disc.as_ref())
    }

    pub fn check_disc_is_valid(&self) -> bool {
        self.disc.is_valid()
    }

    pub fn media_changed(&self) -> bool {
        self.disc.media_changed()
    }

    pub fn state(&self) -> RunState {
        self.control.lock_control().state
    }

    /// Progress of the current or last run
    pub fn progress(&self) -> Option<ProgressSnapshot> {
        let control = self.control.lock_control();
        control.run.as_ref().map(|run| run.progress.snapshot())
    }

    /// Final counts of the last run that reached a terminal state
    pub fn summary(&self) -> Option<RipSummary> {
        self.control.lock_control().summary
    }

    /// Start ripping the registered tracks.
    ///
    /// Fails, leaving the state untouched, when no valid disc is present,
    /// no tracks are registered, a run is active, or a previous run's track
    /// list has not been cleared and refilled.
    pub fn start(&self) -> Result<(), RipperError> {
        if !self.disc.is_valid() {
            return Err(RipperError::NoValidDisc);
        }

        Self::check_can_start(&self.control.lock_control())?;
        let staging_dir = self.create_staging_dir()?;

        // Re-checked: another caller may have started while the dir was made
        let mut control = self.control.lock_control();
        Self::check_can_start(&control)?;

        let tracks = Arc::new(control.registry.prepare_run(staging_dir.path()));
        let album = control.registry.album().clone();
        let progress = ProgressAggregate::new(tracks.len());
        let cancel = Arc::new(AtomicBool::new(false));
        let (stage_tx, stage_rx) = mpsc::unbounded_channel();

        control.run = Some(RunHandle {
            cancel: cancel.clone(),
            stage_tx: stage_tx.clone(),
            progress: progress.clone(),
        });
        control.summary = None;
        control.registry_consumed = true;
        control.state = RunState::Ripping;
        drop(control);

        info!(
            "Starting rip of {} tracks, staging in {}",
            tracks.len(),
            staging_dir.path().display()
        );
        self.events.emit(RipperEvent::StateChanged(RunState::Ripping));

        let driver = RunDriver {
            control: self.control.clone(),
            events: self.events.clone(),
            disc: self.disc.clone(),
            transcoder: self.transcoder.clone(),
            tagger: self.tagger.clone(),
            config: self.config.clone(),
            tracks,
            album,
            progress,
            cancel,
            stage_tx,
        };
        self.runtime_handle.spawn(driver.run(staging_dir, stage_rx));

        Ok(())
    }

    fn check_can_start(control: &Control) -> Result<(), RipperError> {
        if control.state.is_active() {
            return Err(RipperError::AlreadyRunning(control.state));
        }
        if control.state.is_terminal() && control.registry_consumed {
            return Err(RipperError::StaleTrackList);
        }
        if control.registry.is_empty() {
            return Err(RipperError::NoTracks);
        }
        Ok(())
    }

    fn create_staging_dir(&self) -> Result<tempfile::TempDir, RipperError> {
        let root = self
            .config
            .temp_root
            .clone()
            .unwrap_or_else(std::env::temp_dir);

        tempfile::Builder::new()
            .prefix("cdrip-")
            .tempdir_in(&root)
            .map_err(|source| RipperError::StagingDirectory { path: root, source })
    }

    /// Request cancellation. Work already running (a sector batch, submitted
    /// encode and tag jobs) finishes first; nothing new is started.
    pub fn cancel(&self) {
        let control = self.control.lock_control();
        if !control.state.is_active() {
            return;
        }
        if let Some(run) = &control.run {
            info!("Cancelling rip in state {:?}", control.state);
            run.cancel.store(true, Ordering::SeqCst);
            let _ = run.stage_tx.send(StageMessage::CancelRequested);
        }
    }
}
