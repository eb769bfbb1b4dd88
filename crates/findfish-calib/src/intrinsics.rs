//! Intrinsic parametrisation under calibration flags, and the closed-form
//! focal-length initialisation.

use findfish_core::{camera_matrix, Distortion, Homography, PinholeCamera};
use serde::{Deserialize, Serialize};

/// Below this many stereo pairs the joint refinement keeps each camera's
/// distortion and principal point from single-camera calibration.
pub const SPARSE_STEREO_PAIRS: usize = 10;

/// Which intrinsic parameters are optimised. Built fresh for every
/// calibration call; never accumulated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationFlags {
    /// Keep `fx / fy` at its initial ratio.
    pub fix_aspect_ratio: bool,
    /// Keep the principal point at its initial value.
    pub fix_principal_point: bool,
    /// Force `p1 = p2 = 0`.
    pub zero_tangent_dist: bool,
    /// Keep `k3` at its initial value.
    pub fix_k3: bool,
    /// Keep all distortion coefficients at their initial values.
    #[serde(default)]
    pub fix_distortion: bool,
    /// Stereo only: both cameras share `fx` and `fy`.
    pub same_focal_length: bool,
}

impl CalibrationFlags {
    /// Sparse dot grids: one focal length, centred principal point, two
    /// radial terms.
    pub fn single_camera() -> Self {
        Self {
            fix_aspect_ratio: true,
            fix_principal_point: true,
            zero_tangent_dist: true,
            fix_k3: true,
            fix_distortion: false,
            same_focal_length: false,
        }
    }

    /// Joint refinement starting from the single-camera intrinsics.
    pub fn stereo() -> Self {
        Self {
            fix_aspect_ratio: false,
            fix_principal_point: false,
            zero_tangent_dist: false,
            fix_k3: true,
            fix_distortion: false,
            same_focal_length: true,
        }
    }

    /// Stereo flags for `pairs` image pairs. A handful of dot-grid pairs
    /// cannot separate distortion from pose, so sparse sets only refine the
    /// shared focal length and the rig geometry.
    pub fn stereo_for_pairs(pairs: usize) -> Self {
        if pairs >= SPARSE_STEREO_PAIRS {
            return Self::stereo();
        }
        Self {
            fix_aspect_ratio: true,
            fix_principal_point: true,
            zero_tangent_dist: true,
            fix_distortion: true,
            ..Self::stereo()
        }
    }

    pub(crate) fn focal_len(&self) -> usize {
        if self.fix_aspect_ratio {
            1
        } else {
            2
        }
    }

    pub(crate) fn rest_len(&self) -> usize {
        let pp = if self.fix_principal_point { 0 } else { 2 };
        if self.fix_distortion {
            return pp;
        }
        let tangent = if self.zero_tangent_dist { 0 } else { 2 };
        let k3 = if self.fix_k3 { 0 } else { 1 };
        pp + 2 + tangent + k3
    }
}

/// Packs one camera's free intrinsics into a parameter vector and back.
/// Fixed values are taken from `base`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct IntrinsicsCodec {
    flags: CalibrationFlags,
    base: PinholeCamera,
    aspect: f64,
}

impl IntrinsicsCodec {
    pub(crate) fn new(flags: CalibrationFlags, mut base: PinholeCamera) -> Self {
        if flags.zero_tangent_dist {
            base.dist.p1 = 0.0;
            base.dist.p2 = 0.0;
        }
        let aspect = if base.fy().abs() > 1e-12 {
            base.fx() / base.fy()
        } else {
            1.0
        };
        Self {
            flags,
            base,
            aspect,
        }
    }

    pub(crate) fn encode_focal(&self, cam: &PinholeCamera, out: &mut Vec<f64>) {
        out.push(cam.fx());
        if !self.flags.fix_aspect_ratio {
            out.push(cam.fy());
        }
    }

    pub(crate) fn encode_rest(&self, cam: &PinholeCamera, out: &mut Vec<f64>) {
        if !self.flags.fix_principal_point {
            out.push(cam.cx());
            out.push(cam.cy());
        }
        if self.flags.fix_distortion {
            return;
        }
        out.push(cam.dist.k1);
        out.push(cam.dist.k2);
        if !self.flags.zero_tangent_dist {
            out.push(cam.dist.p1);
            out.push(cam.dist.p2);
        }
        if !self.flags.fix_k3 {
            out.push(cam.dist.k3);
        }
    }

    pub(crate) fn decode(&self, focal: &[f64], rest: &[f64]) -> PinholeCamera {
        let fx = focal[0];
        let fy = if self.flags.fix_aspect_ratio {
            fx / self.aspect
        } else {
            focal[1]
        };
        let mut i = 0;
        let mut next = || {
            let v = rest[i];
            i += 1;
            v
        };
        let (cx, cy) = if self.flags.fix_principal_point {
            (self.base.cx(), self.base.cy())
        } else {
            (next(), next())
        };
        if self.flags.fix_distortion {
            return PinholeCamera::new(camera_matrix(fx, fy, cx, cy), self.base.dist);
        }
        let k1 = next();
        let k2 = next();
        let (p1, p2) = if self.flags.zero_tangent_dist {
            (0.0, 0.0)
        } else {
            (next(), next())
        };
        let k3 = if self.flags.fix_k3 {
            self.base.dist.k3
        } else {
            next()
        };
        PinholeCamera::new(
            camera_matrix(fx, fy, cx, cy),
            Distortion { k1, k2, p1, p2, k3 },
        )
    }
}

/// Focal length from plane homographies, assuming square pixels and a known
/// principal point (Zhang's constraints with `omega = diag(a, a, 1)`,
/// `a = 1 / f^2`). `None` when the views are too fronto-parallel.
pub(crate) fn focal_from_homographies(hs: &[Homography], cx: f64, cy: f64) -> Option<f64> {
    let (mut num, mut den) = (0.0, 0.0);
    for h in hs {
        let mut m = h.h;
        // Move the principal point to the origin.
        for c in 0..3 {
            m[(0, c)] -= cx * m[(2, c)];
            m[(1, c)] -= cy * m[(2, c)];
        }
        let m = m / m.norm();
        let (h11, h21, h31) = (m[(0, 0)], m[(1, 0)], m[(2, 0)]);
        let (h12, h22, h32) = (m[(0, 1)], m[(1, 1)], m[(2, 1)]);

        // a * coeff + rhs_const = 0
        for (coeff, constant) in [
            (h11 * h12 + h21 * h22, h31 * h32),
            (
                h11 * h11 + h21 * h21 - h12 * h12 - h22 * h22,
                h31 * h31 - h32 * h32,
            ),
        ] {
            num += -coeff * constant;
            den += coeff * coeff;
        }
    }
    if den <= 0.0 {
        return None;
    }
    let a = num / den;
    (a > 0.0).then(|| 1.0 / a.sqrt())
}
