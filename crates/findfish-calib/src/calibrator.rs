//! Calibration workflow: point discovery, single and stereo calibration,
//! rectification, point undistortion and triangulation.
//!
//! [`GeometricCalibrator`] owns the inputs and the results of every stage.
//! Each stage checks that its prerequisites are present and reports a
//! [`CalibError`] with [`ErrorKind::Configuration`](crate::ErrorKind) when
//! they are not.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use findfish_core::{Frame, PinholeCamera, RemapTable};
use nalgebra::{Matrix3, Matrix3x4, Point2, Point3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::artifact::{
    camera_artifact_name, CameraArtifact, ObjectPointsFile, PointFile, Size, StereoArtifact,
    OBJECT_POINTS_FILE, STEREO_ARTIFACT,
};
use crate::dots::{DotGridDetector, DotGridParams};
use crate::error::CalibError;
use crate::grid::DotGrid;
use crate::intrinsics::CalibrationFlags;
use crate::loader::ImageLoader;
use crate::rectify::{stereo_rectify, Rectification};
use crate::single::{calibrate_camera, CameraCalibration, PlanarView, SINGLE_TERM};
use crate::stereo::{calibrate_stereo, StereoGeometry, STEREO_TERM};
use crate::triangulate::{projections_f32, triangulate_sets};
use crate::undistort::StereoUndistorter;

/// Point sets of one camera, one entry per accepted image.
pub type PointSets = Vec<Vec<Point2<f32>>>;

/// Workflow settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub grid: DotGrid,
    pub detector: DotGridParams,
    /// Directory all artifacts are written to and read from.
    pub out_dir: PathBuf,
    /// Stereo artifact file name inside `out_dir`.
    pub stereo_file: String,
    /// Working resolution. Taken from the first readable image when unset.
    pub image_size: Option<Size>,
    /// Resolution used when no image can be read.
    pub fallback_resolution: Size,
    /// Fewest accepted detections per camera.
    pub min_detections: usize,
    pub single_rms_limit: f64,
    pub stereo_rms_limit: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            grid: DotGrid::default(),
            detector: DotGridParams::default(),
            out_dir: PathBuf::from("calib_config"),
            stereo_file: STEREO_ARTIFACT.to_string(),
            image_size: None,
            fallback_resolution: Size {
                width: 1920,
                height: 1440,
            },
            min_detections: 2,
            single_rms_limit: 5.0,
            stereo_rms_limit: 10.0,
        }
    }
}

impl CalibrationConfig {
    pub fn stereo_path(&self) -> PathBuf {
        self.out_dir.join(&self.stereo_file)
    }

    pub fn camera_path(&self, name: &str) -> PathBuf {
        self.out_dir.join(camera_artifact_name(name))
    }
}

/// A named camera and its calibration images.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraSpec {
    pub name: String,
    pub images: Vec<PathBuf>,
}

impl CameraSpec {
    pub fn new(name: impl Into<String>, images: Vec<PathBuf>) -> Self {
        Self {
            name: name.into(),
            images,
        }
    }

    /// Name a camera after the last component of its image directory.
    pub fn from_dir(dir: &Path, images: Vec<PathBuf>) -> Self {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "camera".to_string());
        Self::new(name, images)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SingleCameraPlan {
    pub camera: CameraSpec,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StereoCameraPlan {
    pub left: CameraSpec,
    pub right: CameraSpec,
}

/// What is being calibrated. The variant fixes the number of cameras.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CalibrationPlan {
    Single(SingleCameraPlan),
    Stereo(StereoCameraPlan),
}

impl CalibrationPlan {
    pub fn single(camera: CameraSpec) -> Self {
        Self::Single(SingleCameraPlan { camera })
    }

    pub fn stereo(left: CameraSpec, right: CameraSpec) -> Self {
        Self::Stereo(StereoCameraPlan { left, right })
    }

    pub fn camera_count(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Stereo(_) => 2,
        }
    }

    pub fn is_stereo(&self) -> bool {
        matches!(self, Self::Stereo(_))
    }

    pub fn camera(&self, index: usize) -> Option<&CameraSpec> {
        match (self, index) {
            (Self::Single(p), 0) => Some(&p.camera),
            (Self::Stereo(p), 0) => Some(&p.left),
            (Self::Stereo(p), 1) => Some(&p.right),
            _ => None,
        }
    }
}

/// Detections feeding the calibration.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CalibrationInput {
    pub image_points: [PointSets; 2],
    /// One template copy per accepted image (single) or pair (stereo).
    pub object_points: Vec<Vec<Point3<f32>>>,
    pub image_size: Option<(usize, usize)>,
    /// Images whose detections were accepted, in acceptance order.
    pub good_images: Vec<PathBuf>,
}

/// Everything computed so far.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CalibrationResult {
    pub cameras: [Option<CameraCalibration>; 2],
    pub stereo: Option<StereoGeometry>,
    pub rectification: Option<Rectification>,
    /// Detections remapped into the rectified views.
    pub undistorted_points: [PointSets; 2],
    /// Last triangulation output, in the rectified left camera frame.
    pub object_points: Vec<Vec<Point3<f32>>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CalibrationStage {
    Uninitialized,
    SingleCalibrated { left: bool, right: bool },
    StereoCalibrated,
    Rectified,
}

impl CalibrationResult {
    pub fn stage(&self) -> CalibrationStage {
        if self.rectification.is_some() {
            CalibrationStage::Rectified
        } else if self.stereo.is_some() {
            CalibrationStage::StereoCalibrated
        } else {
            match (self.cameras[0].is_some(), self.cameras[1].is_some()) {
                (false, false) => CalibrationStage::Uninitialized,
                (left, right) => CalibrationStage::SingleCalibrated { left, right },
            }
        }
    }
}

/// Calibration capability shared by every plan.
pub trait Calibrate {
    /// Detect the target in all plan images.
    fn find_points(&mut self, loader: &dyn ImageLoader) -> Result<(), CalibError>;
    /// Run every calibration stage the plan calls for.
    fn calibrate(&mut self) -> Result<(), CalibError>;
    /// Remove lens distortion from a frame of camera `camera`.
    fn undistort(&self, frame: &Frame, camera: usize) -> Result<Frame, CalibError>;
}

#[derive(Clone, Debug)]
pub struct GeometricCalibrator {
    plan: CalibrationPlan,
    config: CalibrationConfig,
    input: CalibrationInput,
    result: CalibrationResult,
}

fn to_views(object: &[Vec<Point3<f32>>], sets: &[Vec<Point2<f32>>]) -> Vec<PlanarView> {
    object
        .iter()
        .zip(sets)
        .map(|(obj, img)| {
            PlanarView::new(
                obj.iter().map(|p| p.cast::<f64>()).collect(),
                img.iter().map(|p| p.cast::<f64>()).collect(),
            )
        })
        .collect()
}

impl GeometricCalibrator {
    pub fn new(plan: CalibrationPlan, config: CalibrationConfig) -> Self {
        let input = CalibrationInput {
            image_size: config.image_size.map(Into::into),
            ..CalibrationInput::default()
        };
        Self {
            plan,
            config,
            input,
            result: CalibrationResult::default(),
        }
    }

    pub fn plan(&self) -> &CalibrationPlan {
        &self.plan
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    pub fn input(&self) -> &CalibrationInput {
        &self.input
    }

    pub fn result(&self) -> &CalibrationResult {
        &self.result
    }

    pub fn stage(&self) -> CalibrationStage {
        self.result.stage()
    }

    /// Working resolution: configured, detected, or the fallback.
    pub fn image_size(&self) -> (usize, usize) {
        self.input
            .image_size
            .unwrap_or_else(|| self.config.fallback_resolution.into())
    }

    fn camera_spec(&self, camera: usize) -> Result<&CameraSpec, CalibError> {
        self.plan
            .camera(camera)
            .ok_or(CalibError::UnknownCamera(camera))
    }

    fn calibrated(&self, camera: usize) -> Result<&CameraCalibration, CalibError> {
        self.camera_spec(camera)?;
        self.result.cameras[camera]
            .as_ref()
            .ok_or(CalibError::MissingCalibration {
                camera,
                what: "camera matrix",
            })
    }

    fn resolve_image_size(&mut self, loader: &dyn ImageLoader) -> (usize, usize) {
        if let Some(size) = self.input.image_size {
            return size;
        }
        let (left, right) = match &self.plan {
            CalibrationPlan::Single(p) => (&p.camera.images, &p.camera.images),
            CalibrationPlan::Stereo(p) => (&p.left.images, &p.right.images),
        };
        let candidates = left.iter().zip(right).flat_map(|(l, r)| [l, r]);
        let size = candidates
            .filter_map(|path| loader.load(path).ok())
            .find(|f| !f.is_empty())
            .map(|f| f.size())
            .unwrap_or_else(|| self.config.fallback_resolution.into());
        log::info!("working resolution {}x{}", size.0, size.1);
        self.input.image_size = Some(size);
        size
    }

    fn detect_all(
        &self,
        loader: &dyn ImageLoader,
        paths: &[PathBuf],
        size: (usize, usize),
    ) -> Vec<Option<Vec<Point2<f32>>>> {
        let detector = DotGridDetector::new(self.config.grid, self.config.detector.clone());
        paths
            .par_iter()
            .map(|path| {
                let frame = match loader.load(path) {
                    Ok(f) if !f.is_empty() => f,
                    Ok(_) => {
                        log::warn!("skipping empty image {}", path.display());
                        return None;
                    }
                    Err(e) => {
                        log::warn!("skipping {}: {e}", path.display());
                        return None;
                    }
                };
                let frame = if frame.size() == size {
                    frame
                } else {
                    frame.resize(size.0, size.1)
                };
                let found = detector.detect(&frame.to_gray().view());
                if found.is_none() {
                    log::debug!("no dot grid in {}", path.display());
                }
                found
            })
            .collect()
    }

    /// Detect the dot grid in every plan image and fill the input caches.
    ///
    /// Stereo plans only accept index-matched pairs detected on both sides.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip_all))]
    pub fn find_calibration_points(&mut self, loader: &dyn ImageLoader) -> Result<(), CalibError> {
        let size = self.resolve_image_size(loader);
        let template: Vec<Point3<f32>> = self
            .config
            .grid
            .object_points()
            .iter()
            .map(|p| p.cast::<f32>())
            .collect();

        let mut points: [PointSets; 2] = Default::default();
        let mut good = Vec::new();
        match &self.plan {
            CalibrationPlan::Single(p) => {
                let found = self.detect_all(loader, &p.camera.images, size);
                for (path, pts) in p.camera.images.iter().zip(found) {
                    if let Some(pts) = pts {
                        points[0].push(pts);
                        good.push(path.clone());
                    }
                }
            }
            CalibrationPlan::Stereo(p) => {
                if p.left.images.len() != p.right.images.len() {
                    log::warn!(
                        "{} left vs {} right images; unmatched images are ignored",
                        p.left.images.len(),
                        p.right.images.len()
                    );
                }
                let n = p.left.images.len().min(p.right.images.len());
                let left = self.detect_all(loader, &p.left.images[..n], size);
                let right = self.detect_all(loader, &p.right.images[..n], size);
                for (i, pair) in left.into_iter().zip(right).enumerate() {
                    match pair {
                        (Some(l), Some(r)) => {
                            points[0].push(l);
                            points[1].push(r);
                            good.push(p.left.images[i].clone());
                            good.push(p.right.images[i].clone());
                        }
                        (l, r) => log::debug!(
                            "pair {i} discarded (left {}, right {})",
                            l.is_some(),
                            r.is_some()
                        ),
                    }
                }
            }
        }

        let accepted = points[0].len();
        log::info!("accepted {accepted} detections");
        self.input.object_points = vec![template; accepted];
        self.input.image_points = points;
        self.input.good_images = good;
        self.result.undistorted_points = Default::default();

        for camera in 0..self.plan.camera_count() {
            let found = self.input.image_points[camera].len();
            if found < self.config.min_detections {
                return Err(CalibError::InsufficientDetections {
                    camera,
                    needed: self.config.min_detections,
                    found,
                });
            }
        }
        if self.plan.is_stereo() && self.input.image_points[0].len() != self.input.image_points[1].len() {
            return Err(CalibError::PointCountMismatch {
                left: self.input.image_points[0].len(),
                right: self.input.image_points[1].len(),
            });
        }
        Ok(())
    }

    /// Replace the cached detections of `camera`, e.g. from an external
    /// keypoint source. Downstream caches are cleared.
    pub fn set_image_points(&mut self, camera: usize, sets: PointSets) -> Result<(), CalibError> {
        self.camera_spec(camera)?;
        self.input.image_points[camera] = sets;
        self.result.undistorted_points = Default::default();
        Ok(())
    }

    /// Load matched keypoints from a point file into both cameras.
    pub fn load_point_file(&mut self, path: impl AsRef<Path>) -> Result<(), CalibError> {
        let file = PointFile::load_json(path)?;
        self.set_image_points(0, file.keypoints_left)?;
        self.set_image_points(1, file.keypoints_right)
    }

    /// Calibrate one camera with the constrained single-camera model and
    /// persist `calib_camera_<name>.json`.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self)))]
    pub fn calibrate_single(&mut self, camera: usize) -> Result<&CameraCalibration, CalibError> {
        let name = self.camera_spec(camera)?.name.clone();
        let sets = &self.input.image_points[camera];
        if sets.len() < self.config.min_detections.max(2) {
            return Err(CalibError::InsufficientDetections {
                camera,
                needed: self.config.min_detections.max(2),
                found: sets.len(),
            });
        }
        if self.input.object_points.len() != sets.len() {
            return Err(CalibError::PointCountMismatch {
                left: self.input.object_points.len(),
                right: sets.len(),
            });
        }

        log::info!("calibrating camera \"{name}\" from {} views", sets.len());
        let views = to_views(&self.input.object_points, sets);
        let calib = calibrate_camera(
            &views,
            self.image_size(),
            CalibrationFlags::single_camera(),
            SINGLE_TERM,
        )?;
        let rms = calib.rms.unwrap_or_default();
        if rms > self.config.single_rms_limit {
            return Err(CalibError::Quality {
                rms,
                limit: self.config.single_rms_limit,
            });
        }

        CameraArtifact::new(&calib, &self.config.grid).write_json(self.config.camera_path(&name))?;
        self.result.stereo = None;
        self.result.rectification = None;
        Ok(&*self.result.cameras[camera].insert(calib))
    }

    /// Jointly refine both cameras and estimate R, T, E and F.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self)))]
    pub fn stereo_calibrate(&mut self) -> Result<&StereoGeometry, CalibError> {
        let left = self.calibrated(0)?.clone();
        let right = self.calibrated(1)?.clone();
        let [pts_l, pts_r] = &self.input.image_points;
        if pts_l.len() != pts_r.len() {
            return Err(CalibError::PointCountMismatch {
                left: pts_l.len(),
                right: pts_r.len(),
            });
        }
        if left.image_size != right.image_size {
            return Err(CalibError::ResolutionMismatch {
                left: left.image_size,
                right: right.image_size,
            });
        }

        let out = calibrate_stereo(
            &left.camera,
            &right.camera,
            &to_views(&self.input.object_points, pts_l),
            &to_views(&self.input.object_points, pts_r),
            CalibrationFlags::stereo_for_pairs(pts_l.len()),
            STEREO_TERM,
        )?;
        let rms = out.geometry.rms.unwrap_or_default();
        if rms > self.config.stereo_rms_limit {
            return Err(CalibError::Quality {
                rms,
                limit: self.config.stereo_rms_limit,
            });
        }

        self.result.cameras[0] = Some(CameraCalibration {
            camera: out.left,
            poses: out.left_poses,
            ..left
        });
        self.result.cameras[1] = Some(CameraCalibration {
            camera: out.right,
            ..right
        });
        self.result.rectification = None;
        Ok(&*self.result.stereo.insert(out.geometry))
    }

    /// Compute the rectification for the current stereo geometry and
    /// persist the stereo artifact.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self)))]
    pub fn rectify(&mut self) -> Result<&Rectification, CalibError> {
        let left = self.calibrated(0)?.camera;
        let right = self.calibrated(1)?.camera;
        let geometry = self.result.stereo.as_ref().ok_or(CalibError::MissingStereo)?;
        let size = self.image_size();
        let rect = stereo_rectify(&left, &right, &geometry.r, &geometry.t, size)?;

        StereoArtifact::new(&left, &right, geometry, &rect, &self.config.grid, size)
            .write_json(self.config.stereo_path())?;
        log::info!("wrote {}", self.config.stereo_path().display());
        Ok(&*self.result.rectification.insert(rect))
    }

    /// Stereo calibration followed by rectification.
    pub fn calibrate_stereo(&mut self) -> Result<&Rectification, CalibError> {
        self.stereo_calibrate()?;
        self.rectify()
    }

    /// Read the artifacts for the plan from `out_dir`.
    pub fn load_calibration(&mut self) -> Result<(), CalibError> {
        match &self.plan {
            CalibrationPlan::Single(p) => {
                let path = self.config.camera_path(&p.camera.name);
                let calib = CameraArtifact::load_json(&path)?.to_calibration()?;
                log::info!("loaded {}", path.display());
                self.input.image_size = Some(calib.image_size);
                self.result.cameras[0] = Some(calib);
                Ok(())
            }
            CalibrationPlan::Stereo(_) => {
                let path = self.config.stereo_path();
                self.load_stereo_artifact(path)
            }
        }
    }

    /// Read a stereo artifact. Cached left and right point sets must agree
    /// in number; that number becomes the pair count.
    pub fn load_stereo_artifact(&mut self, path: impl AsRef<Path>) -> Result<(), CalibError> {
        if !self.plan.is_stereo() {
            return Err(CalibError::UnknownCamera(1));
        }
        let [pts_l, pts_r] = &self.input.image_points;
        if pts_l.len() != pts_r.len() {
            return Err(CalibError::PointCountMismatch {
                left: pts_l.len(),
                right: pts_r.len(),
            });
        }
        let pairs = pts_l.len();

        let model = StereoArtifact::load_json(path.as_ref())?.decode()?;
        log::info!("loaded {}", path.as_ref().display());
        let image_size = model.image_size;
        let calib = |camera| CameraCalibration {
            camera,
            poses: Vec::new(),
            rms: None,
            image_size,
        };
        self.result.cameras = [Some(calib(model.left)), Some(calib(model.right))];
        self.result.stereo = Some(StereoGeometry {
            pairs,
            ..model.geometry
        });
        self.result.rectification = Some(model.rectification);
        self.input.image_size = Some(image_size);
        self.config.grid = model.grid;
        Ok(())
    }

    /// Resize `frame` to the working resolution and remove lens distortion,
    /// keeping the camera matrix.
    pub fn undistort_image(&self, frame: &Frame, camera: usize) -> Result<Frame, CalibError> {
        let calib = self.calibrated(camera)?;
        let (w, h) = calib.image_size;
        let frame = if frame.size() == (w, h) {
            frame.clone()
        } else {
            frame.resize(w, h)
        };
        Ok(RemapTable::undistort(&calib.camera, w, h).apply(&frame))
    }

    /// Precomputed undistortion maps for both cameras, shareable across
    /// stream workers.
    pub fn stereo_undistorter(&self) -> Result<StereoUndistorter, CalibError> {
        let left = self.calibrated(0)?;
        let right = self.calibrated(1)?;
        if left.image_size != right.image_size {
            return Err(CalibError::ResolutionMismatch {
                left: left.image_size,
                right: right.image_size,
            });
        }
        Ok(StereoUndistorter::new(
            &left.camera,
            &right.camera,
            left.image_size,
        ))
    }

    /// Map all cached detections into the rectified views.
    pub fn undistort_points(&mut self) -> Result<(), CalibError> {
        let left = self.calibrated(0)?.camera;
        let right = self.calibrated(1)?.camera;
        let rect = self
            .result
            .rectification
            .as_ref()
            .ok_or(CalibError::MissingRectification)?;

        let remap = |cam: &PinholeCamera, r: &Matrix3<f64>, p: &Matrix3x4<f64>, sets: &PointSets| {
            let p3 = p.fixed_view::<3, 3>(0, 0).into_owned();
            sets.iter()
                .map(|set| {
                    set.iter()
                        .map(|px| cam.undistort_pixel(px.cast::<f64>(), r, &p3).cast::<f32>())
                        .collect()
                })
                .collect::<PointSets>()
        };
        let [pts_l, pts_r] = &self.input.image_points;
        self.result.undistorted_points = [
            remap(&left, &rect.r1, &rect.p1, pts_l),
            remap(&right, &rect.r2, &rect.p2, pts_r),
        ];
        Ok(())
    }

    /// Triangulate matched points with the rectified projections and write
    /// `object_points.json`. Uses the rectified point caches when present,
    /// the raw detections otherwise.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self)))]
    pub fn triangulate_points(&mut self) -> Result<&[Vec<Point3<f32>>], CalibError> {
        let rect = self
            .result
            .rectification
            .as_ref()
            .ok_or(CalibError::MissingRectification)?;
        let (p1, p2) = projections_f32(&rect.p1, &rect.p2);

        let [und_l, und_r] = &self.result.undistorted_points;
        let [raw_l, raw_r] = &self.input.image_points;
        let (left, right) = if !und_l.is_empty() && !und_r.is_empty() {
            (und_l, und_r)
        } else if !raw_l.is_empty() && !raw_r.is_empty() {
            log::info!("no rectified points cached; triangulating raw detections");
            (raw_l, raw_r)
        } else {
            return Err(CalibError::NoPoints);
        };

        let object_points = triangulate_sets(&p1, &p2, left, right)?;
        log::info!("triangulated {} point sets", object_points.len());
        let file = ObjectPointsFile { object_points };
        file.write_json(self.config.out_dir.join(OBJECT_POINTS_FILE))?;
        self.result.object_points = file.object_points;
        Ok(&self.result.object_points)
    }
}

impl Calibrate for GeometricCalibrator {
    fn find_points(&mut self, loader: &dyn ImageLoader) -> Result<(), CalibError> {
        self.find_calibration_points(loader)
    }

    fn calibrate(&mut self) -> Result<(), CalibError> {
        for camera in 0..self.plan.camera_count() {
            self.calibrate_single(camera)?;
        }
        if self.plan.is_stereo() {
            self.calibrate_stereo()?;
            self.undistort_points()?;
        }
        Ok(())
    }

    fn undistort(&self, frame: &Frame, camera: usize) -> Result<Frame, CalibError> {
        self.undistort_image(frame, camera)
    }
}

/// A calibrator behind one coarse lock. Calibration stages run one at a
/// time; a poisoned lock is recovered because every stage leaves the
/// calibrator in a consistent state on error.
#[derive(Debug)]
pub struct SharedCalibrator {
    inner: Mutex<GeometricCalibrator>,
}

impl SharedCalibrator {
    pub fn new(calibrator: GeometricCalibrator) -> Self {
        Self {
            inner: Mutex::new(calibrator),
        }
    }

    /// Run `f` with exclusive access to the calibrator.
    pub fn with<R>(&self, f: impl FnOnce(&mut GeometricCalibrator) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn into_inner(self) -> GeometricCalibrator {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo_plan() -> CalibrationPlan {
        CalibrationPlan::stereo(
            CameraSpec::new("left", Vec::new()),
            CameraSpec::new("right", Vec::new()),
        )
    }

    #[test]
    fn stage_follows_filled_results() {
        let mut result = CalibrationResult::default();
        assert_eq!(result.stage(), CalibrationStage::Uninitialized);
        result.cameras[0] = Some(CameraCalibration {
            camera: PinholeCamera::new(Matrix3::identity(), Default::default()),
            poses: Vec::new(),
            rms: None,
            image_size: (10, 10),
        });
        assert_eq!(
            result.stage(),
            CalibrationStage::SingleCalibrated {
                left: true,
                right: false
            }
        );
    }

    #[test]
    fn later_stages_require_earlier_ones() {
        let mut calib = GeometricCalibrator::new(stereo_plan(), CalibrationConfig::default());
        let err = calib.stereo_calibrate().unwrap_err();
        assert!(matches!(err, CalibError::MissingCalibration { camera: 0, .. }));
        assert!(matches!(calib.rectify().unwrap_err(), CalibError::MissingCalibration { .. }));
        assert!(matches!(calib.triangulate_points().unwrap_err(), CalibError::MissingRectification));
    }

    #[test]
    fn single_plan_has_no_right_camera() {
        let plan = CalibrationPlan::single(CameraSpec::new("cam", Vec::new()));
        let mut calib = GeometricCalibrator::new(plan, CalibrationConfig::default());
        assert!(matches!(
            calib.set_image_points(1, Vec::new()).unwrap_err(),
            CalibError::UnknownCamera(1)
        ));
    }

    #[test]
    fn camera_named_after_directory() {
        let spec = CameraSpec::from_dir(Path::new("/data/calib/GoPro_L"), Vec::new());
        assert_eq!(spec.name, "GoPro_L");
    }

    #[test]
    fn config_defaults_survive_partial_json() {
        let cfg: CalibrationConfig = serde_json::from_str(r#"{"single_rms_limit": 2.0}"#).unwrap();
        assert_eq!(cfg.single_rms_limit, 2.0);
        assert_eq!(cfg.out_dir, PathBuf::from("calib_config"));
        assert_eq!(cfg.grid, DotGrid::default());
    }

    #[test]
    fn shared_calibrator_serialises_access() {
        let shared = SharedCalibrator::new(GeometricCalibrator::new(stereo_plan(), CalibrationConfig::default()));
        std::thread::scope(|s| {
            for camera in 0..2 {
                let shared = &shared;
                s.spawn(move || {
                    shared.with(|c| c.set_image_points(camera, vec![vec![Point2::new(1.0, 2.0)]]))
                });
            }
        });
        let calib = shared.into_inner();
        assert_eq!(calib.input().image_points[1].len(), 1);
    }
}
