#![allow(dead_code)]

pub mod mock_disc;
pub mod mock_pipeline;

pub use mock_disc::MockDisc;
pub use mock_pipeline::{MockTranscoder, RecordingTagWriter, SubmittedJob};

use cdrip::{Ripper, RipperConfig, RipperEvent};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Initialize tracing for tests with proper test output handling
pub fn tracing_init() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Fast timers and a private temp root so runs can be inspected afterwards
pub fn test_config(temp_root: &Path, max_parallel_jobs: usize) -> RipperConfig {
    RipperConfig {
        temp_root: Some(temp_root.to_path_buf()),
        progress_interval: Duration::from_millis(10),
        transcode_poll_interval: Duration::from_millis(10),
        max_parallel_jobs,
        ..RipperConfig::default()
    }
}

pub fn build_ripper(
    disc: Arc<MockDisc>,
    transcoder: Arc<MockTranscoder>,
    tagger: Arc<RecordingTagWriter>,
    config: RipperConfig,
) -> Ripper {
    Ripper::new(
        disc,
        transcoder,
        tagger,
        config,
        tokio::runtime::Handle::current(),
    )
}

/// Collect events until `Finished` or `Cancelled` arrives
pub async fn wait_for_outcome(events: &mut mpsc::UnboundedReceiver<RipperEvent>) -> Vec<RipperEvent> {
    let mut seen = Vec::new();
    let collect = async {
        while let Some(event) = events.recv().await {
            let terminal = matches!(event, RipperEvent::Finished(_) | RipperEvent::Cancelled);
            seen.push(event);
            if terminal {
                break;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(10), collect)
        .await
        .expect("run did not reach a terminal state");
    seen
}

/// Poll until `condition` holds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let poll = async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(10), poll)
        .await
        .expect("condition not reached");
}

pub fn progress_updates(events: &[RipperEvent]) -> Vec<u32> {
    events
        .iter()
        .filter_map(|event| match event {
            RipperEvent::ProgressUpdated(percent) => Some(*percent),
            _ => None,
        })
        .collect()
}

pub fn dir_is_empty(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}
