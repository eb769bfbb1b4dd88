//! Bouguet stereo rectification with zero-disparity principal points.

use findfish_core::PinholeCamera;
use nalgebra::{Matrix3, Matrix3x4, Matrix4, Point2, Rotation3, Vector3};

use crate::error::CalibError;

/// Rectifying rotations and projections for a stereo pair.
#[derive(Clone, Debug, PartialEq)]
pub struct Rectification {
    pub r1: Matrix3<f64>,
    pub r2: Matrix3<f64>,
    pub p1: Matrix3x4<f64>,
    pub p2: Matrix3x4<f64>,
    /// Disparity-to-depth reprojection matrix.
    pub q: Matrix4<f64>,
}

impl Rectification {
    /// Rebuild from stored rotations and projections, deriving `Q`.
    pub fn from_projections(
        r1: Matrix3<f64>,
        r2: Matrix3<f64>,
        p1: Matrix3x4<f64>,
        p2: Matrix3x4<f64>,
    ) -> Result<Self, CalibError> {
        let q = q_from_projections(&p1, &p2)
            .ok_or(CalibError::Degenerate("rectified projections carry no baseline"))?;
        Ok(Self { r1, r2, p1, p2, q })
    }

    /// True for side-by-side rigs (baseline along the rectified x axis).
    pub fn is_horizontal(&self) -> bool {
        self.p2[(0, 3)].abs() >= self.p2[(1, 3)].abs()
    }
}

/// Reprojection matrix `Q` for rectified projections `p1`, `p2`.
pub fn q_from_projections(p1: &Matrix3x4<f64>, p2: &Matrix3x4<f64>) -> Option<Matrix4<f64>> {
    let fc = p1[(0, 0)];
    let idx = if p2[(0, 3)].abs() >= p2[(1, 3)].abs() { 0 } else { 1 };
    if fc.abs() < 1e-12 || p2[(idx, 3)].abs() < 1e-12 {
        return None;
    }
    let t = p2[(idx, 3)] / fc;
    let (c0, c1) = ((p1[(0, 2)], p1[(1, 2)]), (p2[(0, 2)], p2[(1, 2)]));
    let shift = if idx == 0 { c0.0 - c1.0 } else { c0.1 - c1.1 };
    #[rustfmt::skip]
    let q = Matrix4::new(
        1.0, 0.0, 0.0, -c0.0,
        0.0, 1.0, 0.0, -c0.1,
        0.0, 0.0, 0.0, fc,
        0.0, 0.0, -1.0 / t, shift / t,
    );
    Some(q)
}

/// Rotate both cameras so that epipolar lines become image rows (or columns
/// for a vertical rig). Principal points are shared so that points at
/// infinity have zero disparity; no output scaling is applied.
pub fn stereo_rectify(
    left: &PinholeCamera,
    right: &PinholeCamera,
    r: &Matrix3<f64>,
    t: &Vector3<f64>,
    image_size: (usize, usize),
) -> Result<Rectification, CalibError> {
    // Split the relative rotation half-and-half between the cameras.
    let om = Rotation3::from_matrix(r).scaled_axis() * -0.5;
    let r_r = Rotation3::new(om).into_inner();
    let t_half = r_r * t;

    let idx = if t_half.x.abs() > t_half.y.abs() { 0 } else { 1 };
    let c = t_half[idx];
    let nt = t_half.norm();
    if nt < 1e-12 {
        return Err(CalibError::Degenerate("zero stereo baseline"));
    }
    let mut uu = Vector3::zeros();
    uu[idx] = if c > 0.0 { 1.0 } else { -1.0 };

    // Align the baseline with the chosen image axis.
    let mut ww = t_half.cross(&uu);
    let nw = ww.norm();
    if nw > 0.0 {
        ww *= (c.abs() / nt).acos() / nw;
    }
    let w_r = Rotation3::new(ww).into_inner();

    let r1 = w_r * r_r.transpose();
    let r2 = w_r * r_r;
    let t_new = r2 * t;

    let other = idx ^ 1;
    let fc = 0.5 * (left.k[(other, other)] + right.k[(other, other)]);

    let (w, h) = image_size;
    let (nx, ny) = (w as f64, h as f64);
    let centre_of = |cam: &PinholeCamera, rot: &Matrix3<f64>| -> (f64, f64) {
        let corners = [(0.0, 0.0), (nx - 1.0, 0.0), (0.0, ny - 1.0), (nx - 1.0, ny - 1.0)];
        let (mut sx, mut sy) = (0.0, 0.0);
        for (x, y) in corners {
            let n = cam.normalize(Point2::new(x, y));
            let v = rot * Vector3::new(n.x, n.y, 1.0);
            sx += fc * v.x / v.z;
            sy += fc * v.y / v.z;
        }
        ((nx - 1.0) * 0.5 - sx / 4.0, (ny - 1.0) * 0.5 - sy / 4.0)
    };
    let cc0 = centre_of(left, &r1);
    let cc1 = centre_of(right, &r2);
    let cc = ((cc0.0 + cc1.0) * 0.5, (cc0.1 + cc1.1) * 0.5);

    #[rustfmt::skip]
    let p1 = Matrix3x4::new(
        fc, 0.0, cc.0, 0.0,
        0.0, fc, cc.1, 0.0,
        0.0, 0.0, 1.0, 0.0,
    );
    let mut p2 = p1;
    p2[(idx, 3)] = t_new[idx] * fc;

    log::debug!(
        "rectified: f = {fc:.2}, c = ({:.2}, {:.2}), baseline {:.3}",
        cc.0,
        cc.1,
        t_new[idx]
    );
    Rectification::from_projections(r1, r2, p1, p2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stereo::tests::rig;
    use nalgebra::{Point3, Vector4};

    fn rectified(cam: &PinholeCamera, r: &Matrix3<f64>, p: &Matrix3x4<f64>, x: &Point3<f64>) -> Point2<f64> {
        let px = cam.project(x);
        cam.undistort_pixel(px, r, &p.fixed_view::<3, 3>(0, 0).into_owned())
    }

    #[test]
    fn rectified_points_share_rows() {
        let (left, right, rel) = rig();
        let rect = stereo_rectify(&left, &right, &rel.rotation(), &rel.tvec, (640, 480)).expect("rectify");
        assert!(rect.is_horizontal());
        for x in [
            Point3::new(10.0, -20.0, 500.0),
            Point3::new(-80.0, 45.0, 700.0),
            Point3::new(30.0, 60.0, 350.0),
        ] {
            let xr = rel.transform(&x);
            let a = rectified(&left, &rect.r1, &rect.p1, &x);
            let b = rectified(&right, &rect.r2, &rect.p2, &xr);
            assert!((a.y - b.y).abs() < 1e-6, "rows {} vs {}", a.y, b.y);
        }
        assert_eq!(rect.p1[(0, 2)], rect.p2[(0, 2)]);
    }

    #[test]
    fn q_reprojects_disparity_to_depth() {
        let (left, right, rel) = rig();
        let rect = stereo_rectify(&left, &right, &rel.rotation(), &rel.tvec, (640, 480)).expect("rectify");
        let x = Point3::new(15.0, 5.0, 600.0);
        let a = rectified(&left, &rect.r1, &rect.p1, &x);
        let b = rectified(&right, &rect.r2, &rect.p2, &rel.transform(&x));
        let h = rect.q * Vector4::new(a.x, a.y, a.x - b.x, 1.0);
        let depth = h.z / h.w;
        // Depth along the rectified left axis.
        let expected = (rect.r1 * x.coords).z;
        assert!((depth - expected).abs() < 1e-6 * expected, "{depth} vs {expected}");
    }

    #[test]
    fn q_is_rebuilt_from_projections() {
        let (left, right, rel) = rig();
        let rect = stereo_rectify(&left, &right, &rel.rotation(), &rel.tvec, (640, 480)).expect("rectify");
        let again = Rectification::from_projections(rect.r1, rect.r2, rect.p1, rect.p2).expect("q");
        assert_eq!(again.q, rect.q);
    }
}
