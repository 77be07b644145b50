//! ffmpeg-backed transcoder
//!
//! Each job runs `ffmpeg -progress pipe:1` in a child process. Concurrency is
//! bounded by a semaphore; progress is the reported `out_time_us` over the
//! staged file's duration.

use super::{JobCompletion, JobId, TranscodeError, TranscodeJob, Transcoder};
use crate::cd::WavHeader;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

/// Stderr kept for the error report of a failed job
const STDERR_TAIL_BYTES: usize = 4096;

pub struct FfmpegTranscoder {
    inner: Arc<Inner>,
}

struct Inner {
    ffmpeg: PathBuf,
    pool: Arc<Semaphore>,
    next_id: AtomicU64,
    progress: Mutex<HashMap<JobId, f32>>,
    runtime_handle: tokio::runtime::Handle,
}

impl FfmpegTranscoder {
    /// `pool_size` caps how many ffmpeg processes run at once
    pub fn new(
        ffmpeg: impl Into<PathBuf>,
        pool_size: usize,
        runtime_handle: tokio::runtime::Handle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                ffmpeg: ffmpeg.into(),
                pool: Arc::new(Semaphore::new(pool_size.max(1))),
                next_id: AtomicU64::new(1),
                progress: Mutex::new(HashMap::new()),
                runtime_handle,
            }),
        }
    }
}

impl Transcoder for FfmpegTranscoder {
    fn submit_job(
        &self,
        job: TranscodeJob,
        completion_tx: mpsc::UnboundedSender<JobCompletion>,
    ) -> Result<JobId, TranscodeError> {
        if !job.input.is_file() {
            return Err(TranscodeError::MissingInput(job.input));
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner.progress_map().insert(id, 0.0);

        let inner = self.inner.clone();
        self.inner.runtime_handle.spawn(async move {
            let success = match inner.run_job(id, &job).await {
                Ok(()) => {
                    info!("Transcode job {} finished: {}", id, job.output.display());
                    true
                }
                Err(e) => {
                    warn!(
                        "Transcode job {} failed for {}: {}",
                        id,
                        job.input.display(),
                        e
                    );
                    false
                }
            };

            inner.progress_map().remove(&id);
            let _ = completion_tx.send(JobCompletion {
                job: id,
                input: job.input,
                output: job.output,
                success,
            });
        });

        Ok(id)
    }

    fn job_progress(&self, job: JobId) -> Option<f32> {
        self.inner.progress_map().get(&job).copied()
    }
}

impl Inner {
    fn progress_map(&self) -> MutexGuard<'_, HashMap<JobId, f32>> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_job(&self, id: JobId, job: &TranscodeJob) -> Result<(), TranscodeError> {
        let _permit = self
            .pool
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TranscodeError::PoolClosed)?;

        let input = job.input.clone();
        let duration = tokio::task::spawn_blocking(move || WavHeader::read_from_path(&input))
            .await
            .ok()
            .and_then(|header| header.ok())
            .map(|header| header.duration_secs());

        if let Some(parent) = job.output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        debug!(
            "Starting ffmpeg for job {} ({} -> {}, preset {})",
            id,
            job.input.display(),
            job.output.display(),
            job.preset.name
        );

        let mut child = Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-nostdin", "-loglevel", "error", "-y", "-i"])
            .arg(&job.input)
            .args(&job.preset.codec_args)
            .args(["-progress", "pipe:1", "-nostats"])
            .arg(&job.output)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Drained concurrently so a chatty encoder cannot fill the pipe and stall
        let stderr_tail = child.stderr.take().map(|stderr| tokio::spawn(drain_tail(stderr)));

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                if let Some(fraction) = parse_progress_line(&line, duration) {
                    if let Some(entry) = self.progress_map().get_mut(&id) {
                        *entry = entry.max(fraction);
                    }
                }
            }
        }

        let status = child.wait().await?;
        let stderr = match stderr_tail {
            Some(task) => task.await.unwrap_or_default(),
            None => Vec::new(),
        };
        if !status.success() {
            return Err(TranscodeError::Exited {
                status: status.to_string(),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

/// Read a pipe to EOF, keeping only its last `STDERR_TAIL_BYTES`
async fn drain_tail<R: AsyncRead + Unpin>(mut reader: R) -> Vec<u8> {
    let mut tail = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                tail.extend_from_slice(&buf[..n]);
                if tail.len() > STDERR_TAIL_BYTES {
                    tail.drain(..tail.len() - STDERR_TAIL_BYTES);
                }
            }
        }
    }
    tail
}

/// Turn one line of ffmpeg's `-progress` output into a completed fraction
fn parse_progress_line(line: &str, duration_secs: Option<f64>) -> Option<f32> {
    let line = line.trim();
    if line == "progress=end" {
        return Some(1.0);
    }

    let micros: f64 = line.strip_prefix("out_time_us=")?.parse().ok()?;
    let duration = duration_secs.filter(|d| *d > 0.0)?;
    Some((micros / 1_000_000.0 / duration).clamp(0.0, 1.0) as f32)
}
