// Library exports for the rip_cd binary and integration tests

pub mod cd;
pub mod config;
pub mod models;
pub mod ripper;
pub mod tagging;
pub mod transcode;

pub use config::RipperConfig;
pub use models::{AlbumInfo, ContainerType};
pub use ripper::{RipSummary, Ripper, RipperError, RipperEvent, RunState, TrackEntry};
