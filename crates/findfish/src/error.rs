use findfish_calib::CalibError;
use findfish_core::ImageError;

use crate::stream::StreamError;

/// Failure of one pair run or of pipeline setup.
#[derive(thiserror::Error, Debug)]
pub enum ProcessError {
    /// Both streams ended before each had shown its sync marker.
    #[error("streams never synced ({frames} frames read)")]
    NeverSynced { frames: u64 },
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error(transparent)]
    Calib(#[from] CalibError),
    #[error(transparent)]
    Frame(#[from] ImageError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
