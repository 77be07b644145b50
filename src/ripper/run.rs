// # Run Loop
//
// One task per run and the only writer of `RunState` after `start()`.
// Stage completions arrive as messages (rip worker, tag tasks, cancel) or
// transcoder completions; two timers republish overall progress and poll
// the transcoder for in-flight job progress. The loop exits, dropping both
// timers, as soon as a terminal state is reached.

use super::events::EventBroadcaster;
use super::progress::ProgressAggregate;
use super::rip_stage::RipStage;
use super::registry::TrackEntry;
use super::service::SharedControl;
use super::types::{RipSummary, RipperEvent, RunState, StageMessage};
use crate::cd::DiscReader;
use crate::config::RipperConfig;
use crate::models::AlbumInfo;
use crate::tagging::{TagMetadata, TagWriter};
use crate::transcode::{JobCompletion, JobId, TranscodeJob, Transcoder};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

pub(super) struct RunDriver {
    pub control: SharedControl,
    pub events: EventBroadcaster,
    pub disc: Arc<dyn DiscReader>,
    pub transcoder: Arc<dyn Transcoder>,
    pub tagger: Arc<dyn TagWriter>,
    pub config: RipperConfig,
    pub tracks: Arc<Vec<TrackEntry>>,
    pub album: AlbumInfo,
    pub progress: ProgressAggregate,
    pub cancel: Arc<AtomicBool>,
    pub stage_tx: mpsc::UnboundedSender<StageMessage>,
}

/// Bookkeeping owned by the run loop
#[derive(Default)]
struct Pipeline {
    state: RunState,
    staging_dir: Option<TempDir>,
    pending_jobs: VecDeque<usize>,
    in_flight: HashMap<JobId, usize>,
    tags_in_flight: usize,
    transcode_successes: usize,
    files_tagged: usize,
    tag_failures: usize,
}

impl RunDriver {
    pub(super) async fn run(
        self,
        staging_dir: TempDir,
        mut stage_rx: mpsc::UnboundedReceiver<StageMessage>,
    ) {
        let (completion_tx, mut completion_rx) = mpsc::unbounded_channel();
        let mut pipeline = Pipeline {
            state: RunState::Ripping,
            staging_dir: Some(staging_dir),
            ..Pipeline::default()
        };

        self.events
            .emit(RipperEvent::ProgressRangeChanged { min: 0, max: 100 });
        self.events.emit(RipperEvent::ProgressUpdated(0));

        self.spawn_rip_stage();

        let mut publish_timer = interval(self.config.progress_interval);
        publish_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut poll_timer = interval(self.config.transcode_poll_interval);
        poll_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while !pipeline.state.is_terminal() {
            tokio::select! {
                Some(message) = stage_rx.recv() => {
                    self.handle_stage_message(&mut pipeline, message, &completion_tx);
                }
                Some(completion) = completion_rx.recv() => {
                    self.handle_job_complete(&mut pipeline, completion, &completion_tx);
                }
                _ = publish_timer.tick() => self.publish_progress(),
                _ = poll_timer.tick() => self.poll_transcoding_progress(&pipeline),
            }
        }

        debug!("Run loop exiting in state {:?}", pipeline.state);
    }

    fn cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn spawn_rip_stage(&self) {
        let stage = RipStage {
            disc: self.disc.clone(),
            tracks: self.tracks.clone(),
            progress: self.progress.clone(),
            cancel: self.cancel.clone(),
        };
        let stage_tx = self.stage_tx.clone();
        let progress = self.progress.clone();

        tokio::spawn(async move {
            let staged = match tokio::task::spawn_blocking(move || stage.run()).await {
                Ok(staged) => staged,
                Err(e) => {
                    // Staged indices are lost with the worker
                    let failed = progress.fail_unfinished();
                    error!("Rip stage panicked, {} tracks failed: {}", failed, e);
                    Vec::new()
                }
            };
            let _ = stage_tx.send(StageMessage::RippingComplete { staged });
        });
    }

    fn handle_stage_message(
        &self,
        pipeline: &mut Pipeline,
        message: StageMessage,
        completion_tx: &mpsc::UnboundedSender<JobCompletion>,
    ) {
        match message {
            StageMessage::RippingComplete { staged } => {
                info!(
                    "Ripping complete: {} of {} tracks staged",
                    staged.len(),
                    self.tracks.len()
                );
                self.events.emit(RipperEvent::RippingComplete);

                if self.cancel_requested() {
                    self.finish(pipeline, RunState::Cancelled);
                    return;
                }

                self.transition(pipeline, RunState::Transcoding);
                pipeline.pending_jobs = staged.into();
                self.submit_pending(pipeline, completion_tx);
            }
            StageMessage::TagComplete { index, success } => {
                pipeline.tags_in_flight = pipeline.tags_in_flight.saturating_sub(1);
                pipeline.files_tagged += 1;
                if !success {
                    pipeline.tag_failures += 1;
                }
                debug!(
                    "Tagged track {} ({} of {})",
                    self.tracks[index].track_number,
                    pipeline.files_tagged,
                    pipeline.transcode_successes
                );
            }
            StageMessage::CancelRequested => {
                info!("Cancel requested in state {:?}", pipeline.state);
                if !pipeline.pending_jobs.is_empty() {
                    info!(
                        "Skipping {} unsubmitted transcode jobs",
                        pipeline.pending_jobs.len()
                    );
                    pipeline.pending_jobs.clear();
                }
            }
        }

        self.advance(pipeline);
    }

    /// Keep up to `max_parallel_jobs` jobs submitted
    fn submit_pending(
        &self,
        pipeline: &mut Pipeline,
        completion_tx: &mpsc::UnboundedSender<JobCompletion>,
    ) {
        while pipeline.in_flight.len() < self.config.max_parallel_jobs.max(1) {
            if self.cancel_requested() {
                pipeline.pending_jobs.clear();
                break;
            }
            let Some(index) = pipeline.pending_jobs.pop_front() else {
                break;
            };

            let track = &self.tracks[index];
            let Some(input) = track.temporary_filename.clone() else {
                warn!("Track {} has no staged file", track.track_number);
                self.fail_track(index);
                continue;
            };

            let job = TranscodeJob {
                input,
                output: track.target_filename.clone(),
                preset: track.preset.clone(),
            };

            match self.transcoder.submit_job(job, completion_tx.clone()) {
                Ok(job_id) => {
                    info!(
                        "Submitted transcode job {} for track {} ({})",
                        job_id, track.track_number, track.preset.name
                    );
                    pipeline.in_flight.insert(job_id, index);
                }
                Err(e) => {
                    warn!(
                        "Transcoder rejected track {}: {}",
                        track.track_number, e
                    );
                    self.fail_track(index);
                }
            }
        }
    }

    fn handle_job_complete(
        &self,
        pipeline: &mut Pipeline,
        completion: JobCompletion,
        completion_tx: &mpsc::UnboundedSender<JobCompletion>,
    ) {
        let Some(index) = pipeline.in_flight.remove(&completion.job) else {
            warn!(
                "Completion for unknown transcode job {} ({})",
                completion.job,
                completion.input.display()
            );
            return;
        };
        let track = &self.tracks[index];

        self.progress.update_transcode(index, 1.0);
        if completion.success {
            info!(
                "Transcoded track {} to {}",
                track.track_number,
                completion.output.display()
            );
            self.progress.record_success();
            pipeline.transcode_successes += 1;
            self.request_tag(pipeline, index, completion);
        } else {
            warn!("Transcoding failed for track {}", track.track_number);
            self.progress.record_failure();
        }

        self.submit_pending(pipeline, completion_tx);
        self.advance(pipeline);
    }

    fn request_tag(&self, pipeline: &mut Pipeline, index: usize, completion: JobCompletion) {
        let track = &self.tracks[index];
        if self.cancel_requested() {
            info!("Cancel requested, not tagging track {}", track.track_number);
            return;
        }

        let metadata = TagMetadata::for_track(&self.album, track);
        let tagger = self.tagger.clone();
        let stage_tx = self.stage_tx.clone();
        pipeline.tags_in_flight += 1;

        tokio::spawn(async move {
            let success = match tagger.tag_file(&completion.output, &metadata).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(
                        "Failed to tag {}: {}",
                        completion.output.display(),
                        e
                    );
                    false
                }
            };
            let _ = stage_tx.send(StageMessage::TagComplete { index, success });
        });
    }

    fn fail_track(&self, index: usize) {
        self.progress.complete_track(index);
        self.progress.record_failure();
    }

    /// Move the state machine forward once the current stage has drained
    fn advance(&self, pipeline: &mut Pipeline) {
        let cancelled = self.cancel_requested();

        if pipeline.state == RunState::Transcoding {
            let waiting = !pipeline.in_flight.is_empty()
                || (!cancelled && !pipeline.pending_jobs.is_empty());
            if waiting {
                return;
            }
            if cancelled {
                if pipeline.tags_in_flight == 0 {
                    self.finish(pipeline, RunState::Cancelled);
                }
                return;
            }

            info!("All transcoding jobs complete");
            self.transition(pipeline, RunState::Tagging);
        }

        if pipeline.state == RunState::Tagging && pipeline.tags_in_flight == 0 {
            if cancelled {
                self.finish(pipeline, RunState::Cancelled);
            } else if pipeline.files_tagged >= pipeline.transcode_successes {
                self.finish(pipeline, RunState::Finished);
            }
        }
    }

    fn transition(&self, pipeline: &mut Pipeline, next: RunState) {
        debug!("Run state {:?} -> {:?}", pipeline.state, next);
        pipeline.state = next;
        self.control.lock_control().state = next;
        self.events.emit(RipperEvent::StateChanged(next));
    }

    fn finish(&self, pipeline: &mut Pipeline, terminal: RunState) {
        if terminal == RunState::Finished {
            self.publish_progress();
        }

        Self::remove_staging_dir(pipeline);

        let summary = RipSummary {
            finished_success: self.progress.finished_success(),
            finished_failed: self.progress.finished_failed(),
            files_tagged: pipeline.files_tagged,
            tag_failures: pipeline.tag_failures,
        };
        self.control.lock_control().summary = Some(summary);
        self.transition(pipeline, terminal);

        match terminal {
            RunState::Finished => {
                info!(
                    "Rip finished: {} succeeded, {} failed, {} tagged",
                    summary.finished_success, summary.finished_failed, summary.files_tagged
                );
                self.events.emit(RipperEvent::Finished(summary));
            }
            _ => {
                info!("Rip cancelled");
                self.events.emit(RipperEvent::Cancelled);
            }
        }
    }

    fn remove_staging_dir(pipeline: &mut Pipeline) {
        let Some(dir) = pipeline.staging_dir.take() else {
            return;
        };
        let path = dir.path().to_path_buf();
        match dir.close() {
            Ok(()) => debug!("Removed staging directory {}", path.display()),
            Err(e) => error!(
                "Failed to remove staging directory {}: {}",
                path.display(),
                e
            ),
        }
    }

    fn publish_progress(&self) {
        if let Some(percent) = self.progress.publish() {
            self.events.emit(RipperEvent::ProgressUpdated(percent));
        }
    }

    fn poll_transcoding_progress(&self, pipeline: &Pipeline) {
        if pipeline.state != RunState::Transcoding {
            return;
        }
        for (&job_id, &index) in &pipeline.in_flight {
            if let Some(fraction) = self.transcoder.job_progress(job_id) {
                self.progress.update_transcode(index, fraction);
            }
        }
    }
}
