//! Joint stereo refinement of both cameras and their relative pose.

use std::ops::Range;

use findfish_core::{fit_homography, PinholeCamera};
use nalgebra::{DVector, Matrix3, Point2, Rotation3, Vector3};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::error::CalibError;
use crate::intrinsics::{CalibrationFlags, IntrinsicsCodec};
use crate::pose::{median_vector, pose_from_homography, skew, Pose};
use crate::single::{reprojection_residuals, PlanarView};
use crate::solver::{levenberg_marquardt, BlockProblem, TermCriteria};

/// Termination used for stereo refinement.
pub const STEREO_TERM: TermCriteria = TermCriteria::new(100, 1e-5);

/// Relative geometry of the right camera with respect to the left one:
/// `x_right = R * x_left + T`.
#[derive(Clone, Debug, PartialEq)]
pub struct StereoGeometry {
    pub r: Matrix3<f64>,
    pub t: Vector3<f64>,
    /// Essential matrix `[T]x R`.
    pub e: Matrix3<f64>,
    /// Fundamental matrix `K2^-T E K1^-1`, scaled so `F[2][2] = 1`.
    pub f: Matrix3<f64>,
    /// Joint reprojection RMS; `None` for loaded calibrations.
    pub rms: Option<f64>,
    /// Number of image pairs the geometry was computed (or loaded) for.
    pub pairs: usize,
}

impl StereoGeometry {
    /// Build E and F from a relative pose.
    pub fn from_relative_pose(
        left: &PinholeCamera,
        right: &PinholeCamera,
        r: Matrix3<f64>,
        t: Vector3<f64>,
    ) -> Self {
        let e = skew(&t) * r;
        let f = match (left.k.try_inverse(), right.k.try_inverse()) {
            (Some(k1_inv), Some(k2_inv)) => {
                let f = k2_inv.transpose() * e * k1_inv;
                if f[(2, 2)].abs() > 1e-12 {
                    f / f[(2, 2)]
                } else {
                    f
                }
            }
            _ => Matrix3::zeros(),
        };
        Self {
            r,
            t,
            e,
            f,
            rms: None,
            pairs: 0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct StereoCalibration {
    pub left: PinholeCamera,
    pub right: PinholeCamera,
    pub geometry: StereoGeometry,
    /// Target pose in the left camera per pair.
    pub left_poses: Vec<Pose>,
}

struct StereoProblem<'a> {
    left_codec: IntrinsicsCodec,
    right_codec: IntrinsicsCodec,
    left: &'a [PlanarView],
    right: &'a [PlanarView],
    focal: usize,
    shared_focal: bool,
    rest: usize,
}

impl StereoProblem<'_> {
    fn focal_total(&self) -> usize {
        if self.shared_focal {
            self.focal
        } else {
            2 * self.focal
        }
    }

    fn relative_offset(&self) -> usize {
        self.focal_total() + 2 * self.rest
    }

    fn cameras(&self, x: &[f64]) -> (PinholeCamera, PinholeCamera) {
        let f1 = &x[..self.focal];
        let f2 = if self.shared_focal {
            f1
        } else {
            &x[self.focal..2 * self.focal]
        };
        let r0 = self.focal_total();
        let left = self.left_codec.decode(f1, &x[r0..r0 + self.rest]);
        let right = self
            .right_codec
            .decode(f2, &x[r0 + self.rest..r0 + 2 * self.rest]);
        (left, right)
    }
}

impl BlockProblem for StereoProblem<'_> {
    fn num_params(&self) -> usize {
        self.shared_params() + 6 * self.left.len()
    }

    fn shared_params(&self) -> usize {
        self.relative_offset() + 6
    }

    fn num_blocks(&self) -> usize {
        self.left.len()
    }

    fn block_len(&self, block: usize) -> usize {
        2 * (self.left[block].len() + self.right[block].len())
    }

    fn block_params(&self, block: usize) -> Range<usize> {
        let start = self.shared_params() + 6 * block;
        start..start + 6
    }

    fn block_residuals(&self, x: &[f64], block: usize, out: &mut [f64]) {
        let (left, right) = self.cameras(x);
        let rel = Pose::from_slice(&x[self.relative_offset()..]);
        let pose_l = Pose::from_slice(&x[self.block_params(block)]);
        let r = rel.rotation();
        let r_l = pose_l.rotation();
        let (r_r, t_r) = (r * r_l, r * pose_l.tvec + rel.tvec);

        let split = 2 * self.left[block].len();
        let (out_l, out_r) = out.split_at_mut(split);
        reprojection_residuals(&left, &r_l, &pose_l.tvec, &self.left[block], out_l);
        reprojection_residuals(&right, &r_r, &t_r, &self.right[block], out_r);
    }
}

/// Target pose from undistorted normalised detections.
fn normalized_pose(camera: &PinholeCamera, view: &PlanarView) -> Option<Pose> {
    let normalized: Vec<Point2<f64>> = view
        .image
        .iter()
        .map(|&p| Point2::from(camera.normalize(p)))
        .collect();
    let h = fit_homography(&view.plane_points(), &normalized)?;
    pose_from_homography(&Matrix3::identity(), &h)
}

/// Refine both cameras and their relative pose from index-matched views.
///
/// `left` and `right` come from single-camera calibration and serve as the
/// initial guess.
#[cfg_attr(feature = "tracing", instrument(level = "info", skip_all, fields(pairs = left_views.len())))]
pub fn calibrate_stereo(
    left: &PinholeCamera,
    right: &PinholeCamera,
    left_views: &[PlanarView],
    right_views: &[PlanarView],
    flags: CalibrationFlags,
    term: TermCriteria,
) -> Result<StereoCalibration, CalibError> {
    if left_views.len() != right_views.len() {
        return Err(CalibError::PointCountMismatch {
            left: left_views.len(),
            right: right_views.len(),
        });
    }
    if left_views.is_empty() {
        return Err(CalibError::Degenerate("no stereo pairs"));
    }

    let mut left_poses = Vec::with_capacity(left_views.len());
    let mut rvecs = Vec::with_capacity(left_views.len());
    let mut tvecs = Vec::with_capacity(left_views.len());
    for (vl, vr) in left_views.iter().zip(right_views) {
        let (Some(pl), Some(pr)) = (normalized_pose(left, vl), normalized_pose(right, vr)) else {
            return Err(CalibError::Degenerate("pose from homography"));
        };
        let r = pr.rotation() * pl.rotation().transpose();
        rvecs.push(Rotation3::from_matrix(&r).scaled_axis());
        tvecs.push(pr.tvec - r * pl.tvec);
        left_poses.push(pl);
    }
    let rel = Pose::new(median_vector(&rvecs), median_vector(&tvecs));
    log::debug!(
        "stereo init: baseline {:.3}, rotation {:.4} rad",
        rel.tvec.norm(),
        rel.rvec.norm()
    );

    let mut left_init = *left;
    let mut right_init = *right;
    if flags.same_focal_length {
        let fx = 0.5 * (left.fx() + right.fx());
        let fy = 0.5 * (left.fy() + right.fy());
        for cam in [&mut left_init, &mut right_init] {
            cam.k[(0, 0)] = fx;
            cam.k[(1, 1)] = fy;
        }
    }

    let problem = StereoProblem {
        left_codec: IntrinsicsCodec::new(flags, left_init),
        right_codec: IntrinsicsCodec::new(flags, right_init),
        left: left_views,
        right: right_views,
        focal: flags.focal_len(),
        shared_focal: flags.same_focal_length,
        rest: flags.rest_len(),
    };

    let mut x0 = Vec::with_capacity(problem.num_params());
    problem.left_codec.encode_focal(&left_init, &mut x0);
    if !flags.same_focal_length {
        problem.right_codec.encode_focal(&right_init, &mut x0);
    }
    problem.left_codec.encode_rest(&left_init, &mut x0);
    problem.right_codec.encode_rest(&right_init, &mut x0);
    let mut block = [0.0; 6];
    rel.write_to(&mut block);
    x0.extend_from_slice(&block);
    for pose in &left_poses {
        pose.write_to(&mut block);
        x0.extend_from_slice(&block);
    }

    let report = levenberg_marquardt(&problem, DVector::from_vec(x0), term);
    let x = report.params.as_slice();
    let (left, right) = problem.cameras(x);
    let rel = Pose::from_slice(&x[problem.relative_offset()..]);
    let left_poses = (0..left_views.len())
        .map(|b| Pose::from_slice(&x[problem.block_params(b)]))
        .collect();

    let n_points: usize = left_views
        .iter()
        .chain(right_views)
        .map(PlanarView::len)
        .sum();
    let rms = (report.cost / n_points as f64).sqrt();

    let mut geometry = StereoGeometry::from_relative_pose(&left, &right, rel.rotation(), rel.tvec);
    geometry.rms = Some(rms);
    geometry.pairs = left_views.len();
    log::info!(
        "stereo calibration: baseline {:.3}, rms = {rms:.4}px after {} evaluations",
        geometry.t.norm(),
        report.evaluations
    );

    Ok(StereoCalibration {
        left,
        right,
        geometry,
        left_poses,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::grid::DotGrid;
    use crate::single::tests::{board_poses, synthetic_views};
    use findfish_core::{camera_matrix, Distortion};

    pub(crate) fn rig() -> (PinholeCamera, PinholeCamera, Pose) {
        let left = PinholeCamera::new(
            camera_matrix(800.0, 800.0, 321.0, 238.0),
            Distortion {
                k1: -0.1,
                k2: 0.02,
                ..Distortion::default()
            },
        );
        let right = PinholeCamera::new(
            camera_matrix(800.0, 800.0, 317.0, 242.0),
            Distortion {
                k1: -0.08,
                k2: 0.01,
                ..Distortion::default()
            },
        );
        let rel = Pose::new(Vector3::new(0.0, -0.05, 0.01), Vector3::new(-60.0, 0.5, 1.0));
        (left, right, rel)
    }

    pub(crate) fn stereo_views(
        left: &PinholeCamera,
        right: &PinholeCamera,
        rel: &Pose,
    ) -> (Vec<PlanarView>, Vec<PlanarView>) {
        let grid = DotGrid::default();
        let poses_l = board_poses();
        let r = rel.rotation();
        let poses_r: Vec<Pose> = poses_l
            .iter()
            .map(|p| Pose::from_rt(&(r * p.rotation()), r * p.tvec + rel.tvec))
            .collect();
        (
            synthetic_views(left, &grid, &poses_l),
            synthetic_views(right, &grid, &poses_r),
        )
    }

    #[test]
    fn recovers_relative_pose() {
        let (left, right, rel) = rig();
        let (vl, vr) = stereo_views(&left, &right, &rel);
        // Start from slightly wrong intrinsics, as single calibration would.
        let mut l0 = left;
        l0.k[(0, 0)] = 790.0;
        l0.k[(1, 1)] = 790.0;
        let out = calibrate_stereo(&l0, &right, &vl, &vr, CalibrationFlags::stereo(), STEREO_TERM)
            .expect("stereo");
        let g = &out.geometry;
        assert!((g.t - rel.tvec).norm() < 0.1, "t = {}", g.t);
        assert!((g.r - rel.rotation()).norm() < 1e-3);
        assert!(g.rms.unwrap() < 1e-2);
        assert_eq!(g.pairs, 5);
        assert_eq!(out.left.fx(), out.right.fx());
    }

    #[test]
    fn sparse_pairs_keep_single_camera_distortion() {
        let (left, right, rel) = rig();
        let (vl, vr) = stereo_views(&left, &right, &rel);
        let mut l0 = left;
        l0.k[(0, 0)] = 795.0;
        l0.k[(1, 1)] = 795.0;
        let flags = CalibrationFlags::stereo_for_pairs(vl.len());
        assert!(flags.fix_distortion);
        let out = calibrate_stereo(&l0, &right, &vl, &vr, flags, STEREO_TERM).expect("stereo");
        assert_eq!(out.left.dist, left.dist);
        assert_eq!(out.right.dist, right.dist);
        assert_eq!((out.left.cx(), out.left.cy()), (left.cx(), left.cy()));
        assert!((out.left.fx() - 800.0).abs() < 0.5, "fx {}", out.left.fx());
        assert!((out.geometry.t - rel.tvec).norm() < 0.1, "t = {}", out.geometry.t);
    }

    #[test]
    fn essential_matrix_satisfies_epipolar_constraint() {
        let (left, right, rel) = rig();
        let geometry = StereoGeometry::from_relative_pose(&left, &right, rel.rotation(), rel.tvec);
        let x_l = Vector3::new(10.0, -20.0, 500.0);
        let x_r = rel.rotation() * x_l + rel.tvec;
        let (n_l, n_r) = (x_l / x_l.z, x_r / x_r.z);
        assert!((n_r.transpose() * geometry.e * n_l)[(0, 0)].abs() < 1e-9);
        assert_eq!(geometry.f[(2, 2)], 1.0);
    }

    #[test]
    fn unequal_pair_counts_are_rejected() {
        let (left, right, rel) = rig();
        let (vl, mut vr) = stereo_views(&left, &right, &rel);
        vr.pop();
        let err = calibrate_stereo(&left, &right, &vl, &vr, CalibrationFlags::stereo(), STEREO_TERM)
            .unwrap_err();
        assert!(matches!(err, CalibError::PointCountMismatch { left: 5, right: 4 }));
    }
}
