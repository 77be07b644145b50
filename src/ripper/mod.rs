// # Ripper Module
//
// Audio CD ripping pipeline with focused, testable components:
//
// - **TrackRegistry**: Tracks selected for ripping plus album metadata
// - **ProgressAggregate**: Lock-guarded per-track progress and counters
// - **RipStage**: Blocking disc → WAV staging loop
// - **RunDriver**: Per-run state machine sequencing rip → transcode → tag
// - **Ripper**: Public API, owns the registry and starts/cancels runs
//
// Public API:
// - `Ripper`: Register tracks, start and cancel runs
// - `RipperEvent`: Progress and completion notifications
// - `RunState`, `RipSummary`: Observable run status

mod events;
mod progress;
mod registry;
mod rip_stage;
mod run;
mod service;
mod types;

pub use events::EventBroadcaster;
pub use progress::{ProgressAggregate, ProgressSnapshot};
pub use registry::{TrackEntry, TrackRegistry};
pub use service::Ripper;
pub use types::{RipSummary, RipperError, RipperEvent, RunState};
