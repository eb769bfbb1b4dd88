use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// Symmetric dot grid printed on the calibration target.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DotGrid {
    /// Dots per row.
    pub cols: usize,
    /// Dots per column.
    pub rows: usize,
    /// Centre-to-centre distance in millimetres.
    pub spacing: f64,
}

impl Default for DotGrid {
    fn default() -> Self {
        Self {
            cols: 19,
            rows: 11,
            spacing: 13.0,
        }
    }
}

impl DotGrid {
    pub fn new(cols: usize, rows: usize, spacing: f64) -> Self {
        Self {
            cols,
            rows,
            spacing,
        }
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Planar object points in row-major order; point `(r, c)` is
    /// `(c * spacing, r * spacing, 0)`.
    pub fn object_points(&self) -> Vec<Point3<f64>> {
        (0..self.rows)
            .flat_map(|r| {
                (0..self.cols)
                    .map(move |c| Point3::new(c as f64 * self.spacing, r as f64 * self.spacing, 0.0))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_has_rows_times_cols_points() {
        for (cols, rows, s) in [(19, 11, 13.0), (4, 4, 1.0), (7, 3, 2.5), (1, 9, 10.0)] {
            let grid = DotGrid::new(cols, rows, s);
            let pts = grid.object_points();
            assert_eq!(pts.len(), rows * cols);
            for r in 0..rows {
                for c in 0..cols {
                    assert_eq!(
                        pts[r * cols + c],
                        Point3::new(c as f64 * s, r as f64 * s, 0.0)
                    );
                }
            }
        }
    }
}
