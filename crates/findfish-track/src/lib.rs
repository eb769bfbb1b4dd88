//! Per-stream state for paired video processing.
//!
//! - [`ActivityTracker`] turns a background-subtraction mask into motion
//!   intervals, one open interval at a time.
//! - [`MarkerDetector`] latches the frame where a stream's sync marker is
//!   first decoded and parses its geo-URI payload.
//!
//! Both are owned by a single stream and are never shared between streams.

mod activity;
mod background;
mod marker;
#[cfg(feature = "qr")]
mod qr;

pub use activity::{ActivityInterval, ActivityTracker, TrackerSettings};
pub use background::{KnnParams, KnnSubtractor};
pub use marker::{parse_geo_uri, MarkerDecoder, MarkerDetector, SyncState};

#[cfg(feature = "qr")]
pub use qr::QrDecoder;
