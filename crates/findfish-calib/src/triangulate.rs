//! Linear (DLT) triangulation of rectified point pairs.

use nalgebra::{Matrix3x4, Matrix4, Point2, Point3, RowVector4};

use crate::error::CalibError;

/// Single-precision projection matrices, as used for triangulation.
pub fn projections_f32(p1: &Matrix3x4<f64>, p2: &Matrix3x4<f64>) -> (Matrix3x4<f32>, Matrix3x4<f32>) {
    (p1.cast::<f32>(), p2.cast::<f32>())
}

/// Triangulate one correspondence. The result is expressed in the frame of
/// the first projection.
pub fn triangulate_point(
    p1: &Matrix3x4<f32>,
    p2: &Matrix3x4<f32>,
    a: Point2<f32>,
    b: Point2<f32>,
) -> Point3<f32> {
    let rows: [RowVector4<f32>; 4] = [
        a.x * p1.row(2) - p1.row(0),
        a.y * p1.row(2) - p1.row(1),
        b.x * p2.row(2) - p2.row(0),
        b.y * p2.row(2) - p2.row(1),
    ];
    let mut m = Matrix4::zeros();
    for (i, row) in rows.iter().enumerate() {
        let n = row.norm();
        m.set_row(i, &if n > 0.0 { row / n } else { *row });
    }

    let svd = m.svd(false, true);
    let Some(v_t) = svd.v_t else {
        return Point3::origin();
    };
    let (min_idx, _) = svd.singular_values.argmin();
    let x = v_t.row(min_idx);

    // Points at infinity keep their direction.
    let w = x[3];
    let scale = if w.abs() > f32::EPSILON { 1.0 / w } else { 1.0 };
    Point3::new(x[0] * scale, x[1] * scale, x[2] * scale)
}

/// Triangulate index-matched point sets. Sets are paired by index and
/// points within a set by position, so both sides must agree on the number
/// of sets and on the length of every set.
pub fn triangulate_sets(
    p1: &Matrix3x4<f32>,
    p2: &Matrix3x4<f32>,
    left: &[Vec<Point2<f32>>],
    right: &[Vec<Point2<f32>>],
) -> Result<Vec<Vec<Point3<f32>>>, CalibError> {
    if left.len() != right.len() {
        return Err(CalibError::PointCountMismatch {
            left: left.len(),
            right: right.len(),
        });
    }
    left.iter()
        .zip(right)
        .enumerate()
        .map(|(set, (l, r))| {
            if l.len() != r.len() {
                return Err(CalibError::SetLengthMismatch {
                    set,
                    left: l.len(),
                    right: r.len(),
                });
            }
            Ok(l.iter()
                .zip(r)
                .map(|(&a, &b)| triangulate_point(p1, p2, a, b))
                .collect())
        })
        .collect()
}
