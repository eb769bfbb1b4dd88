//! Connected components and external border tracing on binary images.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::image::GrayImageView;

/// Inclusive pixel bounding box.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: usize,
    pub y0: usize,
    pub x1: usize,
    pub y1: usize,
}

impl BoundingBox {
    pub fn width(&self) -> usize {
        self.x1 - self.x0 + 1
    }

    pub fn height(&self) -> usize {
        self.y1 - self.y0 + 1
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Connectivity {
    Four,
    Eight,
}

/// One labelled connected component.
#[derive(Clone, Debug)]
pub struct Blob {
    pub label: u32,
    pub area: usize,
    pub bbox: BoundingBox,
    pub centroid: Point2<f64>,
    pub touches_border: bool,
    /// First pixel in raster order; always on the outer border.
    pub seed: (usize, usize),
}

/// Label map (0 = background, blobs are 1-based) plus blob statistics.
#[derive(Clone, Debug)]
pub struct Components {
    pub width: usize,
    pub height: usize,
    pub labels: Vec<u32>,
    pub blobs: Vec<Blob>,
}

const N4: [(isize, isize); 4] = [(1, 0), (0, 1), (-1, 0), (0, -1)];
const N8: [(isize, isize); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

/// Label the pixels for which `is_fg` holds.
pub fn label_components(
    img: &GrayImageView<'_>,
    connectivity: Connectivity,
    is_fg: impl Fn(u8) -> bool,
) -> Components {
    let (w, h) = (img.width, img.height);
    let mut labels = vec![0u32; w * h];
    let mut blobs = Vec::new();
    let mut stack = Vec::new();
    let neighbours: &[(isize, isize)] = match connectivity {
        Connectivity::Four => &N4,
        Connectivity::Eight => &N8,
    };

    for start in 0..w * h {
        if labels[start] != 0 || !is_fg(img.data[start]) {
            continue;
        }
        let label = blobs.len() as u32 + 1;
        labels[start] = label;
        stack.push(start);

        let (mut area, mut sx, mut sy) = (0usize, 0f64, 0f64);
        let mut bbox = BoundingBox {
            x0: usize::MAX,
            y0: usize::MAX,
            x1: 0,
            y1: 0,
        };
        let mut touches_border = false;

        while let Some(i) = stack.pop() {
            let (x, y) = (i % w, i / w);
            area += 1;
            sx += x as f64;
            sy += y as f64;
            bbox.x0 = bbox.x0.min(x);
            bbox.y0 = bbox.y0.min(y);
            bbox.x1 = bbox.x1.max(x);
            bbox.y1 = bbox.y1.max(y);
            touches_border |= x == 0 || y == 0 || x + 1 == w || y + 1 == h;

            for &(dx, dy) in neighbours {
                let (nx, ny) = (x as isize + dx, y as isize + dy);
                if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                    continue;
                }
                let j = ny as usize * w + nx as usize;
                if labels[j] == 0 && is_fg(img.data[j]) {
                    labels[j] = label;
                    stack.push(j);
                }
            }
        }

        blobs.push(Blob {
            label,
            area,
            bbox,
            centroid: Point2::new(sx / area as f64, sy / area as f64),
            touches_border,
            seed: (start % w, start / w),
        });
    }

    Components {
        width: w,
        height: h,
        labels,
        blobs,
    }
}

/// Outer border of one component, in tracing order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contour {
    pub points: Vec<(usize, usize)>,
    pub bbox: BoundingBox,
}

impl Components {
    #[inline]
    fn is(&self, x: isize, y: isize, label: u32) -> bool {
        x >= 0
            && y >= 0
            && x < self.width as isize
            && y < self.height as isize
            && self.labels[y as usize * self.width + x as usize] == label
    }

    /// Moore-neighbour tracing of the outer border of `blob`.
    pub fn trace_border(&self, blob: &Blob) -> Contour {
        let start = (blob.seed.0 as isize, blob.seed.1 as isize);
        let mut points = vec![blob.seed];

        // The seed is first in raster order, so the search can begin at NW.
        let step = |cur: (isize, isize), from: usize| -> Option<((isize, isize), usize)> {
            (0..8).map(|i| (from + i) % 8).find_map(|d| {
                let (dx, dy) = N8[d];
                let n = (cur.0 + dx, cur.1 + dy);
                self.is(n.0, n.1, blob.label).then_some((n, d))
            })
        };
        let restart = |d: usize| if d % 2 == 0 { (d + 7) % 8 } else { (d + 6) % 8 };

        let Some((first, d0)) = step(start, 5) else {
            return Contour {
                points,
                bbox: blob.bbox,
            };
        };

        let mut cur = first;
        let mut dir = d0;
        let limit = 4 * blob.area + 8;
        for _ in 0..limit {
            if cur == start {
                match step(cur, restart(dir)) {
                    Some((n, _)) if n == first => break,
                    _ => {}
                }
            }
            points.push((cur.0 as usize, cur.1 as usize));
            match step(cur, restart(dir)) {
                Some((n, d)) => {
                    cur = n;
                    dir = d;
                }
                None => break,
            }
        }

        Contour {
            points,
            bbox: blob.bbox,
        }
    }
}

/// External contours of all non-zero regions (8-connected). Holes inside a
/// region are never traced.
pub fn find_external_contours(mask: &GrayImageView<'_>) -> Vec<Contour> {
    let comps = label_components(mask, Connectivity::Eight, |v| v != 0);
    comps.blobs.iter().map(|b| comps.trace_border(b)).collect()
}
