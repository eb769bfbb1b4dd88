//! Symmetric circle-grid detector.
//!
//! Dark dots on a light background are segmented with an Otsu threshold,
//! filtered by shape, and then assigned to lattice nodes through a
//! homography fitted on the four outer corners of the point cloud.

use findfish_core::{
    fit_homography, label_components, otsu_threshold, Blob, Components, Connectivity,
    GrayImageView, Homography,
};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::grid::DotGrid;

/// Blob filtering and lattice snapping settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DotGridParams {
    /// Smallest accepted blob in pixels.
    pub min_area: usize,
    /// Largest accepted blob as a fraction of the image area.
    pub max_area_fraction: f64,
    /// Minimum ratio between blob area and its bounding-box area.
    pub min_fill: f64,
    /// Maximum bounding-box aspect ratio.
    pub max_aspect: f64,
    /// Maximum distance to a lattice node, in grid units.
    pub snap_tolerance: f64,
}

impl Default for DotGridParams {
    fn default() -> Self {
        Self {
            min_area: 9,
            max_area_fraction: 0.01,
            min_fill: 0.5,
            max_aspect: 2.5,
            snap_tolerance: 0.3,
        }
    }
}

/// Locates a [`DotGrid`] in grayscale images.
#[derive(Clone, Debug)]
pub struct DotGridDetector {
    grid: DotGrid,
    params: DotGridParams,
}

impl DotGridDetector {
    pub fn new(grid: DotGrid, params: DotGridParams) -> Self {
        Self { grid, params }
    }

    pub fn grid(&self) -> &DotGrid {
        &self.grid
    }

    pub fn params(&self) -> &DotGridParams {
        &self.params
    }

    /// Dot centres in row-major lattice order, or `None` when the full grid
    /// is not visible.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, img), fields(width = img.width, height = img.height))
    )]
    pub fn detect(&self, img: &GrayImageView<'_>) -> Option<Vec<Point2<f32>>> {
        let n = self.grid.len();
        if n < 4 || img.width == 0 || img.height == 0 {
            return None;
        }

        let t = otsu_threshold(img);
        let comps = label_components(img, Connectivity::Four, |v| v <= t);
        let mut dots = self.dot_candidates(img, &comps, t);
        if dots.len() < n {
            log::debug!("dot grid: {} candidates, need {}", dots.len(), n);
            return None;
        }
        if dots.len() > n {
            let mut areas: Vec<usize> = dots.iter().map(|d| d.1).collect();
            areas.sort_unstable();
            let median = areas[areas.len() / 2] as f64;
            dots.sort_by(|a, b| {
                let da = (a.1 as f64 - median).abs();
                let db = (b.1 as f64 - median).abs();
                da.total_cmp(&db)
            });
            dots.truncate(n);
        }

        let centres: Vec<Point2<f64>> = dots.iter().map(|d| d.0).collect();
        let ordered = self.order_on_lattice(&centres)?;
        Some(
            ordered
                .into_iter()
                .map(|p| Point2::new(p.x as f32, p.y as f32))
                .collect(),
        )
    }

    // (intensity-weighted centre, area) of every blob that looks like a dot.
    fn dot_candidates(
        &self,
        img: &GrayImageView<'_>,
        comps: &Components,
        t: u8,
    ) -> Vec<(Point2<f64>, usize)> {
        let max_area = (self.params.max_area_fraction * (img.width * img.height) as f64) as usize;
        comps
            .blobs
            .iter()
            .filter(|b| self.accept(b, max_area))
            .map(|b| (weighted_centre(img, comps, b, t), b.area))
            .collect()
    }

    fn accept(&self, b: &Blob, max_area: usize) -> bool {
        if b.touches_border || b.area < self.params.min_area || b.area > max_area.max(1) {
            return false;
        }
        let (w, h) = (b.bbox.width() as f64, b.bbox.height() as f64);
        let fill = b.area as f64 / (w * h);
        let aspect = w.max(h) / w.min(h);
        fill >= self.params.min_fill && aspect <= self.params.max_aspect
    }

    fn order_on_lattice(&self, pts: &[Point2<f64>]) -> Option<Vec<Point2<f64>>> {
        let (cols, rows) = (self.grid.cols, self.grid.rows);
        let quad = outer_quad(pts)?;

        // Pick the start corner so the first side runs along the columns.
        let side = |i: usize, j: usize| (quad[j] - quad[i]).norm();
        let l01 = 0.5 * (side(0, 1) + side(3, 2));
        let l12 = 0.5 * (side(1, 2) + side(0, 3));
        let start = if cols == rows || cols < 2 || rows < 2 {
            0
        } else {
            let want = ((cols - 1) as f64 / (rows - 1) as f64).ln();
            let have = (l01 / l12).ln();
            if (have - want).abs() <= (have + want).abs() {
                0
            } else if quad[1].x + quad[1].y <= quad[3].x + quad[3].y {
                1
            } else {
                3
            }
        };
        let corners: Vec<Point2<f64>> = (0..4).map(|k| quad[(start + k) % 4]).collect();
        let lattice = [
            Point2::new(0.0, 0.0),
            Point2::new((cols - 1) as f64, 0.0),
            Point2::new((cols - 1) as f64, (rows - 1) as f64),
            Point2::new(0.0, (rows - 1) as f64),
        ];

        let h = fit_homography(&lattice, &corners)?;
        let first = self.assign(pts, &h)?;

        // Refit on every dot; keeps the first assignment if the refit disagrees.
        let nodes: Vec<Point2<f64>> = (0..rows)
            .flat_map(|r| (0..cols).map(move |c| Point2::new(c as f64, r as f64)))
            .collect();
        let refined = fit_homography(&nodes, &first)
            .and_then(|h2| self.assign(pts, &h2))
            .unwrap_or_else(|| first.clone());
        Some(refined)
    }

    // Snap each point to the nearest lattice node through `h^-1`.
    fn assign(&self, pts: &[Point2<f64>], h: &Homography) -> Option<Vec<Point2<f64>>> {
        let (cols, rows) = (self.grid.cols, self.grid.rows);
        let inv = h.inverse()?;
        let mut slots: Vec<Option<Point2<f64>>> = vec![None; cols * rows];
        for &p in pts {
            let q = inv.apply(p);
            let (c, r) = (q.x.round(), q.y.round());
            if (q.x - c).hypot(q.y - r) > self.params.snap_tolerance {
                return None;
            }
            if c < 0.0 || r < 0.0 || c >= cols as f64 || r >= rows as f64 {
                return None;
            }
            let slot = &mut slots[r as usize * cols + c as usize];
            if slot.is_some() {
                return None;
            }
            *slot = Some(p);
        }
        slots.into_iter().collect()
    }
}

fn weighted_centre(img: &GrayImageView<'_>, comps: &Components, b: &Blob, t: u8) -> Point2<f64> {
    let (mut sw, mut sx, mut sy) = (0.0, 0.0, 0.0);
    for y in b.bbox.y0..=b.bbox.y1 {
        for x in b.bbox.x0..=b.bbox.x1 {
            let i = y * comps.width + x;
            if comps.labels[i] != b.label {
                continue;
            }
            let w = (t as f64 + 1.0) - img.data[i] as f64;
            sw += w;
            sx += w * x as f64;
            sy += w * y as f64;
        }
    }
    if sw <= 0.0 {
        return b.centroid;
    }
    Point2::new(sx / sw, sy / sw)
}

fn cross(o: Point2<f64>, a: Point2<f64>, b: Point2<f64>) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Andrew's monotone chain.
fn convex_hull(pts: &[Point2<f64>]) -> Vec<Point2<f64>> {
    let mut p = pts.to_vec();
    p.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    p.dedup();
    if p.len() < 3 {
        return p;
    }
    let half = |iter: &mut dyn Iterator<Item = Point2<f64>>| {
        let mut chain: Vec<Point2<f64>> = Vec::new();
        for q in iter {
            while chain.len() >= 2 && cross(chain[chain.len() - 2], chain[chain.len() - 1], q) <= 0.0
            {
                chain.pop();
            }
            chain.push(q);
        }
        chain.pop();
        chain
    };
    let mut hull = half(&mut p.iter().copied());
    hull.extend(half(&mut p.iter().rev().copied()));
    hull
}

/// Four extreme corners of the point cloud, clockwise on screen, starting
/// with the one closest to the image origin.
fn outer_quad(pts: &[Point2<f64>]) -> Option<[Point2<f64>; 4]> {
    let hull = convex_hull(pts);
    if hull.len() < 4 {
        return None;
    }
    let n = pts.len() as f64;
    let centre = Point2::new(
        pts.iter().map(|p| p.x).sum::<f64>() / n,
        pts.iter().map(|p| p.y).sum::<f64>() / n,
    );
    let farthest = |from: Point2<f64>| {
        hull.iter()
            .copied()
            .max_by(|a, b| (a - from).norm().total_cmp(&(b - from).norm()))
    };
    let a = farthest(centre)?;
    let b = farthest(a)?;
    let side = |p: &Point2<f64>| cross(a, b, *p);
    let c1 = hull.iter().copied().max_by(|p, q| side(p).total_cmp(&side(q)))?;
    let c2 = hull.iter().copied().min_by(|p, q| side(p).total_cmp(&side(q)))?;
    if side(&c1) <= 0.0 || side(&c2) >= 0.0 {
        return None;
    }

    let mut quad = [a, c1, b, c2];
    let area2: f64 = (0..4)
        .map(|i| {
            let (p, q) = (quad[i], quad[(i + 1) % 4]);
            p.x * q.y - q.x * p.y
        })
        .sum();
    if area2 < 0.0 {
        quad.reverse();
    }
    let first = (0..4)
        .min_by(|&i, &j| (quad[i].x + quad[i].y).total_cmp(&(quad[j].x + quad[j].y)))
        .unwrap_or(0);
    quad.rotate_left(first);
    Some(quad)
}
