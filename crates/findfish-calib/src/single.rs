//! Single-camera calibration from planar dot-grid views.

use std::ops::Range;

use findfish_core::{camera_matrix, fit_homography, Distortion, PinholeCamera};
use nalgebra::{DVector, Matrix3, Point2, Point3, Vector3};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::error::CalibError;
use crate::intrinsics::{focal_from_homographies, CalibrationFlags, IntrinsicsCodec};
use crate::pose::{pose_from_homography, Pose};
use crate::solver::{levenberg_marquardt, BlockProblem, TermCriteria};

/// Termination used for single-camera refinement.
pub const SINGLE_TERM: TermCriteria = TermCriteria::new(30, 1e-12);

/// One view of the planar target: template points and their detections.
#[derive(Clone, Debug)]
pub struct PlanarView {
    pub object: Vec<Point3<f64>>,
    pub image: Vec<Point2<f64>>,
}

impl PlanarView {
    pub fn new(object: Vec<Point3<f64>>, image: Vec<Point2<f64>>) -> Self {
        Self { object, image }
    }

    pub fn len(&self) -> usize {
        self.object.len().min(self.image.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Planar `(x, y)` template coordinates.
    pub(crate) fn plane_points(&self) -> Vec<Point2<f64>> {
        self.object.iter().map(|p| Point2::new(p.x, p.y)).collect()
    }
}

/// Refined intrinsics plus the per-view target poses.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraCalibration {
    pub camera: PinholeCamera,
    /// Target-to-camera pose per view. Empty when loaded from an artifact.
    pub poses: Vec<Pose>,
    /// Reprojection RMS in pixels; `None` for loaded calibrations.
    pub rms: Option<f64>,
    pub image_size: (usize, usize),
}

/// Write `(projected - observed)` pixel residuals of one view into `out`.
pub(crate) fn reprojection_residuals(
    camera: &PinholeCamera,
    r: &Matrix3<f64>,
    t: &Vector3<f64>,
    view: &PlanarView,
    out: &mut [f64],
) {
    for (i, (obj, obs)) in view.object.iter().zip(&view.image).enumerate() {
        let pc = r * obj.coords + t;
        let proj = camera.project(&Point3::from(pc));
        out[2 * i] = proj.x - obs.x;
        out[2 * i + 1] = proj.y - obs.y;
    }
}

/// Initial intrinsics for `views`: principal point at the image centre,
/// focal length from homographies, zero distortion.
pub(crate) fn initial_camera(views: &[PlanarView], image_size: (usize, usize)) -> PinholeCamera {
    let (w, h) = image_size;
    let (cx, cy) = ((w as f64 - 1.0) * 0.5, (h as f64 - 1.0) * 0.5);
    let fallback = w.max(h) as f64;

    let hs: Vec<_> = views
        .iter()
        .filter_map(|v| fit_homography(&v.plane_points(), &v.image))
        .collect();
    let f = match focal_from_homographies(&hs, cx, cy) {
        Some(f) if f > 0.1 * fallback && f < 20.0 * fallback => f,
        other => {
            log::debug!("focal estimate {other:?} rejected, using {fallback}");
            fallback
        }
    };
    PinholeCamera::new(camera_matrix(f, f, cx, cy), Distortion::default())
}

struct SingleProblem<'a> {
    codec: IntrinsicsCodec,
    views: &'a [PlanarView],
    focal: usize,
    rest: usize,
}

impl SingleProblem<'_> {
    fn shared(&self) -> usize {
        self.focal + self.rest
    }

    fn camera(&self, x: &[f64]) -> PinholeCamera {
        self.codec
            .decode(&x[..self.focal], &x[self.focal..self.shared()])
    }
}

impl BlockProblem for SingleProblem<'_> {
    fn num_params(&self) -> usize {
        self.shared() + 6 * self.views.len()
    }

    fn shared_params(&self) -> usize {
        self.shared()
    }

    fn num_blocks(&self) -> usize {
        self.views.len()
    }

    fn block_len(&self, block: usize) -> usize {
        2 * self.views[block].len()
    }

    fn block_params(&self, block: usize) -> Range<usize> {
        let start = self.shared() + 6 * block;
        start..start + 6
    }

    fn block_residuals(&self, x: &[f64], block: usize, out: &mut [f64]) {
        let camera = self.camera(x);
        let pose = Pose::from_slice(&x[self.block_params(block)]);
        reprojection_residuals(&camera, &pose.rotation(), &pose.tvec, &self.views[block], out);
    }
}

/// Calibrate one camera from at least two planar views.
///
/// Returns the refined camera, per-view poses and the reprojection RMS.
/// The caller decides whether the RMS is acceptable.
#[cfg_attr(feature = "tracing", instrument(level = "info", skip(views), fields(views = views.len())))]
pub fn calibrate_camera(
    views: &[PlanarView],
    image_size: (usize, usize),
    flags: CalibrationFlags,
    term: TermCriteria,
) -> Result<CameraCalibration, CalibError> {
    if views.len() < 2 {
        return Err(CalibError::Degenerate("need at least two views"));
    }
    if views.iter().any(|v| v.len() < 4 || v.object.len() != v.image.len()) {
        return Err(CalibError::Degenerate("view with fewer than four correspondences"));
    }

    let init = initial_camera(views, image_size);
    let codec = IntrinsicsCodec::new(flags, init);
    let mut x0 = Vec::new();
    codec.encode_focal(&init, &mut x0);
    codec.encode_rest(&init, &mut x0);
    let shared = x0.len();

    for view in views {
        let h = fit_homography(&view.plane_points(), &view.image)
            .ok_or(CalibError::Degenerate("homography fit failed"))?;
        let pose =
            pose_from_homography(&init.k, &h).ok_or(CalibError::Degenerate("pose from homography"))?;
        let mut block = [0.0; 6];
        pose.write_to(&mut block);
        x0.extend_from_slice(&block);
    }

    let problem = SingleProblem {
        codec,
        views,
        focal: flags.focal_len(),
        rest: flags.rest_len(),
    };
    let report = levenberg_marquardt(&problem, DVector::from_vec(x0), term);
    let x = report.params.as_slice();
    let camera = problem.camera(x);
    let poses = (0..views.len())
        .map(|b| Pose::from_slice(&x[shared + 6 * b..shared + 6 * b + 6]))
        .collect();

    let n_points: usize = views.iter().map(PlanarView::len).sum();
    let rms = (report.cost / n_points as f64).sqrt();
    log::info!(
        "single calibration: f = {:.2}, k1 = {:.4}, k2 = {:.4}, rms = {rms:.4}px after {} evaluations",
        camera.fx(),
        camera.dist.k1,
        camera.dist.k2,
        report.evaluations
    );

    Ok(CameraCalibration {
        camera,
        poses,
        rms: Some(rms),
        image_size,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::grid::DotGrid;

    pub(crate) fn synthetic_views(camera: &PinholeCamera, grid: &DotGrid, poses: &[Pose]) -> Vec<PlanarView> {
        let object = grid.object_points();
        poses
            .iter()
            .map(|pose| {
                let image = object
                    .iter()
                    .map(|p| camera.project(&pose.transform(p)))
                    .collect();
                PlanarView::new(object.clone(), image)
            })
            .collect()
    }

    pub(crate) fn board_poses() -> Vec<Pose> {
        vec![
            Pose::new(Vector3::new(0.25, -0.1, 0.02), Vector3::new(-110.0, -60.0, 520.0)),
            Pose::new(Vector3::new(-0.2, 0.3, -0.05), Vector3::new(-130.0, -70.0, 560.0)),
            Pose::new(Vector3::new(0.1, 0.2, 0.1), Vector3::new(-90.0, -80.0, 480.0)),
            Pose::new(Vector3::new(-0.3, -0.15, 0.0), Vector3::new(-120.0, -50.0, 600.0)),
            Pose::new(Vector3::new(0.05, -0.35, -0.08), Vector3::new(-100.0, -65.0, 540.0)),
        ]
    }

    #[test]
    fn recovers_constrained_camera() {
        let truth = PinholeCamera::new(
            camera_matrix(820.0, 820.0, 319.5, 239.5),
            Distortion {
                k1: -0.12,
                k2: 0.04,
                ..Distortion::default()
            },
        );
        let views = synthetic_views(&truth, &DotGrid::default(), &board_poses());
        let calib = calibrate_camera(&views, (640, 480), CalibrationFlags::single_camera(), SINGLE_TERM)
            .expect("calibration");
        assert!((calib.camera.fx() - 820.0).abs() < 0.5, "fx {}", calib.camera.fx());
        assert!((calib.camera.dist.k1 + 0.12).abs() < 1e-3);
        assert_eq!(calib.camera.cx(), 319.5);
        assert_eq!(calib.poses.len(), 5);
        assert!(calib.rms.unwrap() < 1e-3);
    }

    #[test]
    fn one_view_is_rejected() {
        let truth = PinholeCamera::new(camera_matrix(800.0, 800.0, 319.5, 239.5), Distortion::default());
        let views = synthetic_views(&truth, &DotGrid::default(), &board_poses()[..1]);
        let err = calibrate_camera(&views, (640, 480), CalibrationFlags::single_camera(), SINGLE_TERM)
            .unwrap_err();
        assert!(matches!(err, CalibError::Degenerate(_)));
    }
}
