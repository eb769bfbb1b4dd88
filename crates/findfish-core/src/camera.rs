//! Pinhole camera with Brown-Conrady lens distortion.
//!
//! Coefficients follow the usual `(k1, k2, p1, p2, k3)` ordering so that
//! calibration artifacts stay interchangeable with other tooling.

use nalgebra::{Matrix3, Point2, Point3, Vector2, Vector3};
use serde::{Deserialize, Serialize};

const UNDISTORT_ITERS: usize = 20;

/// Radial (`k1`, `k2`, `k3`) and tangential (`p1`, `p2`) distortion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl Distortion {
    /// Build from a coefficient slice; missing trailing terms are zero.
    pub fn from_slice(c: &[f64]) -> Self {
        let at = |i: usize| c.get(i).copied().unwrap_or(0.0);
        Self {
            k1: at(0),
            k2: at(1),
            p1: at(2),
            p2: at(3),
            k3: at(4),
        }
    }

    pub fn to_array(&self) -> [f64; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    /// Apply distortion to an ideal normalized image point.
    #[inline]
    pub fn distort(&self, p: Vector2<f64>) -> Vector2<f64> {
        let (x, y) = (p.x, p.y);
        let r2 = x * x + y * y;
        let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
        let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        Vector2::new(x * radial + dx, y * radial + dy)
    }

    /// Invert [`Distortion::distort`] by fixed-point iteration.
    pub fn undistort(&self, distorted: Vector2<f64>) -> Vector2<f64> {
        let mut p = distorted;
        for _ in 0..UNDISTORT_ITERS {
            let (x, y) = (p.x, p.y);
            let r2 = x * x + y * y;
            let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
            let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
            let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
            if radial.abs() < 1e-12 {
                break;
            }
            p = Vector2::new((distorted.x - dx) / radial, (distorted.y - dy) / radial);
        }
        p
    }
}

/// Intrinsic matrix plus lens distortion.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PinholeCamera {
    pub k: Matrix3<f64>,
    pub dist: Distortion,
}

/// Build `[[fx, 0, cx], [0, fy, cy], [0, 0, 1]]`.
pub fn camera_matrix(fx: f64, fy: f64, cx: f64, cy: f64) -> Matrix3<f64> {
    Matrix3::new(fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0)
}

impl PinholeCamera {
    pub fn new(k: Matrix3<f64>, dist: Distortion) -> Self {
        Self { k, dist }
    }

    #[inline]
    pub fn fx(&self) -> f64 {
        self.k[(0, 0)]
    }
    #[inline]
    pub fn fy(&self) -> f64 {
        self.k[(1, 1)]
    }
    #[inline]
    pub fn cx(&self) -> f64 {
        self.k[(0, 2)]
    }
    #[inline]
    pub fn cy(&self) -> f64 {
        self.k[(1, 2)]
    }

    /// Project a point given in camera coordinates.
    #[inline]
    pub fn project(&self, p: &Point3<f64>) -> Point2<f64> {
        let n = Vector2::new(p.x / p.z, p.y / p.z);
        self.pixel_from_normalized(n)
    }

    /// Distort a normalized point and map it through `K`.
    #[inline]
    pub fn pixel_from_normalized(&self, n: Vector2<f64>) -> Point2<f64> {
        let d = self.dist.distort(n);
        Point2::new(
            self.fx() * d.x + self.k[(0, 1)] * d.y + self.cx(),
            self.fy() * d.y + self.cy(),
        )
    }

    /// Ideal (undistorted) normalized coordinates of a pixel.
    pub fn normalize(&self, px: Point2<f64>) -> Vector2<f64> {
        let y = (px.y - self.cy()) / self.fy();
        let x = (px.x - self.cx() - self.k[(0, 1)] * y) / self.fx();
        self.dist.undistort(Vector2::new(x, y))
    }

    /// Undistort a pixel, rotate it by `r` and re-project with `p`
    /// (the left 3x3 block of a projection matrix).
    pub fn undistort_pixel(
        &self,
        px: Point2<f64>,
        r: &Matrix3<f64>,
        p: &Matrix3<f64>,
    ) -> Point2<f64> {
        let n = self.normalize(px);
        let v = p * (r * Vector3::new(n.x, n.y, 1.0));
        Point2::new(v.x / v.z, v.y / v.z)
    }
}
