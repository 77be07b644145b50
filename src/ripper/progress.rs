use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::warn;

#[derive(Debug)]
struct ProgressState {
    current_progress: u32,
    finished_success: usize,
    finished_failed: usize,
    per_track_rip_progress: Vec<f32>,
    per_track_transcode_progress: Vec<f32>,
}

/// Point-in-time copy of a run's progress
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub current_progress: u32,
    pub finished_success: usize,
    pub finished_failed: usize,
    pub per_track_rip_progress: Vec<f32>,
    pub per_track_transcode_progress: Vec<f32>,
}

/// Per-run progress shared by the rip worker, transcoder callbacks and the
/// orchestrator.
///
/// Every access takes the one lock for a single field update; fractions only
/// move forward and the published percentage never goes down.
#[derive(Debug, Clone)]
pub struct ProgressAggregate {
    state: Arc<Mutex<ProgressState>>,
}

impl ProgressAggregate {
    pub fn new(track_count: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(ProgressState {
                current_progress: 0,
                finished_success: 0,
                finished_failed: 0,
                per_track_rip_progress: vec![0.0; track_count],
                per_track_transcode_progress: vec![0.0; track_count],
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, ProgressState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn track_count(&self) -> usize {
        self.state().per_track_rip_progress.len()
    }

    pub fn update_rip(&self, index: usize, fraction: f32) {
        let mut state = self.state();
        if let Some(slot) = state.per_track_rip_progress.get_mut(index) {
            *slot = slot.max(fraction.clamp(0.0, 1.0));
        }
    }

    pub fn update_transcode(&self, index: usize, fraction: f32) {
        let mut state = self.state();
        if let Some(slot) = state.per_track_transcode_progress.get_mut(index) {
            *slot = slot.max(fraction.clamp(0.0, 1.0));
        }
    }

    /// Mark both stages of a track as done, e.g. after it failed
    pub fn complete_track(&self, index: usize) {
        self.update_rip(index, 1.0);
        self.update_transcode(index, 1.0);
    }

    pub fn record_success(&self) -> bool {
        let mut state = self.state();
        if !Self::has_unfinished_tracks(&state) {
            warn!("Ignoring success: every track already finished");
            return false;
        }
        state.finished_success += 1;
        true
    }

    pub fn record_failure(&self) -> bool {
        let mut state = self.state();
        if !Self::has_unfinished_tracks(&state) {
            warn!("Ignoring failure: every track already finished");
            return false;
        }
        state.finished_failed += 1;
        true
    }

    /// Count every track not yet finished as failed and complete all
    /// fractions. Returns how many tracks were newly failed.
    pub fn fail_unfinished(&self) -> usize {
        let mut state = self.state();
        let track_count = state.per_track_rip_progress.len();
        let newly_failed =
            track_count.saturating_sub(state.finished_success + state.finished_failed);
        state.finished_failed += newly_failed;
        state.per_track_rip_progress.fill(1.0);
        state.per_track_transcode_progress.fill(1.0);
        newly_failed
    }

    fn has_unfinished_tracks(state: &ProgressState) -> bool {
        state.finished_success + state.finished_failed < state.per_track_rip_progress.len()
    }

    pub fn finished_success(&self) -> usize {
        self.state().finished_success
    }

    pub fn finished_failed(&self) -> usize {
        self.state().finished_failed
    }

    /// Overall percentage: ripping and transcoding weigh half each
    pub fn overall_percent(&self) -> u32 {
        Self::blend(&self.state())
    }

    fn blend(state: &ProgressState) -> u32 {
        let mean = |values: &[f32]| {
            if values.is_empty() {
                0.0
            } else {
                values.iter().map(|v| *v as f64).sum::<f64>() / values.len() as f64
            }
        };
        let overall = 0.5 * mean(&state.per_track_rip_progress)
            + 0.5 * mean(&state.per_track_transcode_progress);
        (overall * 100.0).round().clamp(0.0, 100.0) as u32
    }

    /// Recompute the overall percentage. Returns it only when it moved past
    /// the last published value.
    pub fn publish(&self) -> Option<u32> {
        let mut state = self.state();
        let overall = Self::blend(&state);
        if overall > state.current_progress {
            state.current_progress = overall;
            Some(overall)
        } else {
            None
        }
    }

    pub fn current_progress(&self) -> u32 {
        self.state().current_progress
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let state = self.state();
        ProgressSnapshot {
            current_progress: state.current_progress,
            finished_success: state.finished_success,
            finished_failed: state.finished_failed,
            per_track_rip_progress: state.per_track_rip_progress.clone(),
            per_track_transcode_progress: state.per_track_transcode_progress.clone(),
        }
    }
}
