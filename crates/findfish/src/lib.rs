//! Facade crate for the findfish stereo video pipeline.
//!
//! - `findfish::calib`: dot-grid calibration, rectification, triangulation.
//! - `findfish::track`: activity tracking and sync markers.
//! - [`StreamProcessor`]: syncs two streams on their markers, undistorts,
//!   tracks activity and writes side-by-side frames.
//! - [`VideoPairCoordinator`] (feature `image`): processes a directory of
//!   recorded pairs in parallel.
//! - [`EventLog`]: the `DetectedEvents` record of a run.
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use findfish::calib::StereoArtifact;
//! use findfish::{ProcessorConfig, VideoPairCoordinator};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let model = StereoArtifact::load_json("calib_config/stereo_calibration.json")?.decode()?;
//! let undistorter = findfish::calib::StereoUndistorter::new(&model.left, &model.right, model.image_size);
//! let coordinator = VideoPairCoordinator::new(Arc::new(undistorter), ProcessorConfig::default(), "out");
//! let pairs = coordinator.discover(Path::new("videos"))?;
//! for report in coordinator.run(&pairs) {
//!     println!("{}: {}", report.tag, report.is_ok());
//! }
//! # Ok(())
//! # }
//! ```

pub use findfish_calib as calib;
pub use findfish_core as core;
pub use findfish_track as track;

mod config;
mod error;
mod events;
mod pipeline;
mod scan;
mod stream;

#[cfg(feature = "image")]
mod batch;
#[cfg(feature = "image")]
mod sequence;

pub use config::ProcessorConfig;
pub use error::ProcessError;
pub use events::{EventLog, StreamSide};
pub use pipeline::{RunSummary, StreamProcessor, SyncPhase};
pub use scan::{recording_tag, scan_dir, scan_subdirs, IMAGE_EXTENSIONS};
pub use stream::{FrameReader, FrameSink, FrameSource, StreamError, StreamInfo};

#[cfg(feature = "image")]
pub use batch::{pair_recordings, PairReport, VideoPair, VideoPairCoordinator};
#[cfg(feature = "image")]
pub use sequence::{ImageSequenceSink, ImageSequenceSource};

pub use findfish_core::{init_with_level, level_from_verbosity};

/// Install the `tracing` subscriber and route `log` records into it.
/// `RUST_LOG` overrides `level` when set.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool, level: log::LevelFilter) {
    let _ = tracing_log::LogTracer::init();
    findfish_core::init_tracing(json, level);
}
