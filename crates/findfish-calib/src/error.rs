use std::path::PathBuf;

/// Coarse error classes used by callers to decide how to react.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A required calibration stage has not been computed or loaded.
    Configuration,
    /// Left and right inputs disagree (counts, resolution).
    InputMismatch,
    /// Not enough usable detections or points.
    InsufficientData,
    /// Calibration converged to an unacceptable residual.
    Quality,
    /// File or image could not be read or written.
    Io,
    /// Numerical failure (degenerate geometry, singular system).
    Numerical,
}

/// Errors produced by the calibration engine.
#[derive(thiserror::Error, Debug)]
pub enum CalibError {
    #[error("camera {camera}: {what} is empty; calibrate or load a calibration first")]
    MissingCalibration { camera: usize, what: &'static str },

    #[error("stereo rectification is not available; run stereo calibration first")]
    MissingRectification,

    #[error("stereo geometry is not available; run stereo calibration first")]
    MissingStereo,

    #[error("bad stereo pair: left has {left} point sets, right has {right}")]
    PointCountMismatch { left: usize, right: usize },

    #[error("point set {set}: left has {left} points, right has {right}")]
    SetLengthMismatch { set: usize, left: usize, right: usize },

    #[error("cameras do not have the same resolution ({left:?} vs {right:?})")]
    ResolutionMismatch {
        left: (usize, usize),
        right: (usize, usize),
    },

    #[error("camera {camera}: need at least {needed} grid detections, found {found}")]
    InsufficientDetections {
        camera: usize,
        needed: usize,
        found: usize,
    },

    #[error("no 2D points available for triangulation")]
    NoPoints,

    #[error("reprojection RMS {rms:.3}px exceeds {limit:.1}px; use better calibration images")]
    Quality { rms: f64, limit: f64 },

    #[error("camera index {0} is not part of this calibration plan")]
    UnknownCamera(usize),

    #[error("degenerate calibration geometry: {0}")]
    Degenerate(&'static str),

    #[error("malformed calibration artifact field `{key}`: {reason}")]
    MalformedArtifact { key: &'static str, reason: String },

    #[error("failed to decode image {path}: {reason}")]
    Image { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CalibError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CalibError::MissingCalibration { .. }
            | CalibError::MissingRectification
            | CalibError::MissingStereo
            | CalibError::UnknownCamera(_) => ErrorKind::Configuration,
            CalibError::PointCountMismatch { .. }
            | CalibError::SetLengthMismatch { .. }
            | CalibError::ResolutionMismatch { .. } => ErrorKind::InputMismatch,
            CalibError::InsufficientDetections { .. } | CalibError::NoPoints => {
                ErrorKind::InsufficientData
            }
            CalibError::Quality { .. } => ErrorKind::Quality,
            CalibError::Degenerate(_) => ErrorKind::Numerical,
            CalibError::MalformedArtifact { .. }
            | CalibError::Image { .. }
            | CalibError::Io(_)
            | CalibError::Json(_) => ErrorKind::Io,
        }
    }
}
