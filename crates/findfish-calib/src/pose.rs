use findfish_core::Homography;
use nalgebra::{Matrix3, Point3, Rotation3, Vector3};

/// Rigid transform stored as a Rodrigues rotation vector plus translation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub rvec: Vector3<f64>,
    pub tvec: Vector3<f64>,
}

impl Pose {
    pub fn new(rvec: Vector3<f64>, tvec: Vector3<f64>) -> Self {
        Self { rvec, tvec }
    }

    pub fn from_rt(r: &Matrix3<f64>, t: Vector3<f64>) -> Self {
        let rot = Rotation3::from_matrix(r);
        Self::new(rot.scaled_axis(), t)
    }

    pub fn rotation(&self) -> Matrix3<f64> {
        Rotation3::new(self.rvec).into_inner()
    }

    #[inline]
    pub fn transform(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation() * p.coords + self.tvec)
    }

    pub(crate) fn from_slice(x: &[f64]) -> Self {
        Self::new(
            Vector3::new(x[0], x[1], x[2]),
            Vector3::new(x[3], x[4], x[5]),
        )
    }

    pub(crate) fn write_to(&self, out: &mut [f64]) {
        out[..3].copy_from_slice(self.rvec.as_slice());
        out[3..6].copy_from_slice(self.tvec.as_slice());
    }
}

/// Cross-product matrix `[v]x`.
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// Pose of a `Z = 0` target from the plane-to-image homography `h` and the
/// intrinsic matrix `k`.
pub fn pose_from_homography(k: &Matrix3<f64>, h: &Homography) -> Option<Pose> {
    let k_inv = k.try_inverse()?;
    let a1 = k_inv * h.column(0);
    let a2 = k_inv * h.column(1);
    let a3 = k_inv * h.column(2);

    let denom = 0.5 * (a1.norm() + a2.norm());
    if denom <= 1e-12 {
        return None;
    }
    let lambda = 1.0 / denom;
    let (mut r1, mut r2, mut t) = (a1 * lambda, a2 * lambda, a3 * lambda);
    if t.z < 0.0 {
        r1 = -r1;
        r2 = -r2;
        t = -t;
    }
    let r3 = r1.cross(&r2);
    if r3.norm() <= 1e-12 {
        return None;
    }

    // Nearest rotation in the Frobenius sense.
    let approx = Matrix3::from_columns(&[r1, r2, r3]);
    let svd = approx.svd(true, true);
    let (u, v_t) = (svd.u?, svd.v_t?);
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let mut u_fixed = u;
        u_fixed.column_mut(2).neg_mut();
        r = u_fixed * v_t;
    }
    Some(Pose::new(Rotation3::from_matrix_unchecked(r).scaled_axis(), t))
}

/// Component-wise median, used to pick robust initial values.
pub(crate) fn median_vector(vs: &[Vector3<f64>]) -> Vector3<f64> {
    let mut out = Vector3::zeros();
    if vs.is_empty() {
        return out;
    }
    for axis in 0..3 {
        let mut c: Vec<f64> = vs.iter().map(|v| v[axis]).collect();
        c.sort_by(f64::total_cmp);
        let n = c.len();
        out[axis] = if n % 2 == 1 {
            c[n / 2]
        } else {
            0.5 * (c[n / 2 - 1] + c[n / 2])
        };
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use findfish_core::camera_matrix;

    #[test]
    fn homography_decomposition_recovers_pose() {
        let k = camera_matrix(700.0, 700.0, 320.0, 240.0);
        let truth = Pose::new(Vector3::new(0.2, -0.15, 0.05), Vector3::new(-40.0, 25.0, 400.0));
        let r = truth.rotation();
        let mut h = Matrix3::zeros();
        h.set_column(0, &(k * r.column(0)));
        h.set_column(1, &(k * r.column(1)));
        h.set_column(2, &(k * truth.tvec));
        let est = pose_from_homography(&k, &Homography::new(h * 3.7)).expect("pose");
        assert_relative_eq!(est.rvec, truth.rvec, epsilon = 1e-9);
        assert_relative_eq!(est.tvec, truth.tvec, epsilon = 1e-6);
    }

    #[test]
    fn median_ignores_outlier() {
        let vs = [
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(1.1, 0.0, 0.0),
            Vector3::new(50.0, 0.0, 0.0),
        ];
        assert_eq!(median_vector(&vs).x, 1.1);
    }

    #[test]
    fn skew_matches_cross_product() {
        let a = Vector3::new(1.0, -2.0, 0.5);
        let b = Vector3::new(0.3, 0.7, -1.1);
        assert_relative_eq!(skew(&a) * b, a.cross(&b), epsilon = 1e-12);
    }
}
