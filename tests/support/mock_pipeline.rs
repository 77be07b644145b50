use async_trait::async_trait;
use cdrip::cd::{WavHeader, WAV_HEADER_LEN};
use cdrip::tagging::{TagError, TagMetadata, TagWriter};
use cdrip::transcode::{JobCompletion, JobId, TranscodeError, TranscodeJob, Transcoder};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// What the transcoder saw of a staged file at submission time
#[derive(Debug, Clone)]
pub struct SubmittedJob {
    pub job: TranscodeJob,
    pub header: WavHeader,
    pub body_len: u64,
    pub samples: u32,
}

/// Transcoder that "encodes" by copying the staged file.
///
/// A holding transcoder keeps completions back until `release_all`.
pub struct MockTranscoder {
    next_id: AtomicU64,
    hold: bool,
    failing_outputs: Mutex<HashSet<PathBuf>>,
    submitted: Mutex<Vec<SubmittedJob>>,
    held: Mutex<Vec<(JobCompletion, mpsc::UnboundedSender<JobCompletion>)>>,
}

impl MockTranscoder {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            hold: false,
            failing_outputs: Mutex::new(HashSet::new()),
            submitted: Mutex::new(Vec::new()),
            held: Mutex::new(Vec::new()),
        }
    }

    pub fn holding() -> Self {
        Self {
            hold: true,
            ..Self::new()
        }
    }

    pub fn fail_output(&self, output: &Path) {
        self.failing_outputs
            .lock()
            .unwrap()
            .insert(output.to_path_buf());
    }

    pub fn submitted(&self) -> Vec<SubmittedJob> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn held_count(&self) -> usize {
        self.held.lock().unwrap().len()
    }

    pub fn release_all(&self) {
        let held: Vec<_> = self.held.lock().unwrap().drain(..).collect();
        for (completion, tx) in held {
            let _ = tx.send(completion);
        }
    }
}

impl Transcoder for MockTranscoder {
    fn submit_job(
        &self,
        job: TranscodeJob,
        completion_tx: mpsc::UnboundedSender<JobCompletion>,
    ) -> Result<JobId, TranscodeError> {
        let header = WavHeader::read_from_path(&job.input)
            .map_err(|e| TranscodeError::Rejected(e.to_string()))?;
        let body_len = std::fs::metadata(&job.input)?.len() - WAV_HEADER_LEN;
        let samples = hound::WavReader::open(&job.input)
            .map_err(|e| TranscodeError::Rejected(e.to_string()))?
            .len();

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let success = !self.failing_outputs.lock().unwrap().contains(&job.output);
        if success {
            std::fs::copy(&job.input, &job.output)?;
        }

        self.submitted.lock().unwrap().push(SubmittedJob {
            job: job.clone(),
            header,
            body_len,
            samples,
        });

        let completion = JobCompletion {
            job: id,
            input: job.input,
            output: job.output,
            success,
        };
        if self.hold {
            self.held.lock().unwrap().push((completion, completion_tx));
        } else {
            let _ = completion_tx.send(completion);
        }

        Ok(id)
    }

    fn job_progress(&self, job: JobId) -> Option<f32> {
        self.held
            .lock()
            .unwrap()
            .iter()
            .any(|(completion, _)| completion.job == job)
            .then_some(0.5)
    }
}

/// Tag writer that records requests instead of touching files
#[derive(Default)]
pub struct RecordingTagWriter {
    requests: Mutex<Vec<(PathBuf, TagMetadata)>>,
    failing_paths: Mutex<HashSet<PathBuf>>,
}

impl RecordingTagWriter {
    pub fn fail_path(&self, path: &Path) {
        self.failing_paths.lock().unwrap().insert(path.to_path_buf());
    }

    pub fn requests(&self) -> Vec<(PathBuf, TagMetadata)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn tagged_track_numbers(&self) -> Vec<u8> {
        let mut numbers: Vec<u8> = self
            .requests()
            .iter()
            .map(|(_, metadata)| metadata.track_number)
            .collect();
        numbers.sort();
        numbers
    }
}

#[async_trait]
impl TagWriter for RecordingTagWriter {
    async fn tag_file(&self, path: &Path, metadata: &TagMetadata) -> Result<(), TagError> {
        self.requests
            .lock()
            .unwrap()
            .push((path.to_path_buf(), metadata.clone()));

        if self.failing_paths.lock().unwrap().contains(path) {
            return Err(TagError::Task(format!("cannot tag {}", path.display())));
        }
        Ok(())
    }
}
