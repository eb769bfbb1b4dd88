//! Stereo calibration for the findfish pipeline.
//!
//! - Detect a symmetric dot grid in calibration images ([`DotGridDetector`]).
//! - Calibrate each camera with a constrained pinhole model, then refine
//!   both jointly with their relative pose ([`GeometricCalibrator`]).
//! - Rectify the pair, remap detections and triangulate them.
//! - Persist and reload everything as JSON artifacts.
//!
//! ```no_run
//! use findfish_calib::{
//!     Calibrate, CalibrationConfig, CalibrationPlan, CameraSpec, FsImageLoader,
//!     GeometricCalibrator,
//! };
//!
//! # fn main() -> Result<(), findfish_calib::CalibError> {
//! let plan = CalibrationPlan::stereo(
//!     CameraSpec::new("left", vec!["l0.png".into(), "l1.png".into()]),
//!     CameraSpec::new("right", vec!["r0.png".into(), "r1.png".into()]),
//! );
//! let mut calib = GeometricCalibrator::new(plan, CalibrationConfig::default());
//! calib.find_points(&FsImageLoader)?;
//! calib.calibrate()?;
//! # Ok(())
//! # }
//! ```

mod artifact;
mod calibrator;
mod dots;
mod error;
mod grid;
mod intrinsics;
mod loader;
mod pose;
mod rectify;
mod single;
mod solver;
mod stereo;
mod triangulate;
mod undistort;

pub use artifact::{
    camera_artifact_name, CameraArtifact, MatrixRecord, ObjectPointsFile, PointFile, Size,
    StereoArtifact, StereoModel, OBJECT_POINTS_FILE, STEREO_ARTIFACT,
};
pub use calibrator::{
    Calibrate, CalibrationConfig, CalibrationInput, CalibrationPlan, CalibrationResult,
    CalibrationStage, CameraSpec, GeometricCalibrator, PointSets, SharedCalibrator,
    SingleCameraPlan, StereoCameraPlan,
};
pub use dots::{DotGridDetector, DotGridParams};
pub use error::{CalibError, ErrorKind};
pub use grid::DotGrid;
pub use intrinsics::{CalibrationFlags, SPARSE_STEREO_PAIRS};
pub use loader::ImageLoader;
pub use pose::{pose_from_homography, skew, Pose};
pub use rectify::{q_from_projections, stereo_rectify, Rectification};
pub use single::{calibrate_camera, CameraCalibration, PlanarView, SINGLE_TERM};
pub use solver::{levenberg_marquardt, BlockProblem, LmReport, TermCriteria};
pub use stereo::{calibrate_stereo, StereoCalibration, StereoGeometry, STEREO_TERM};
pub use triangulate::{projections_f32, triangulate_point, triangulate_sets};
pub use undistort::StereoUndistorter;

#[cfg(feature = "image")]
pub use loader::FsImageLoader;
