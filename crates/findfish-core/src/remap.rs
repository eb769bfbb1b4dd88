use nalgebra::{Matrix3, Vector2, Vector3};

use crate::camera::PinholeCamera;
use crate::image::Frame;

/// Per-pixel source coordinates for undistortion / rectification.
///
/// Build once per camera and reuse; applying a table is a pure function of
/// the frame, so one table can be shared across threads.
#[derive(Clone, Debug)]
pub struct RemapTable {
    width: usize,
    height: usize,
    map: Vec<[f32; 2]>,
}

impl RemapTable {
    /// Map for plain lens undistortion keeping the original camera matrix.
    pub fn undistort(camera: &PinholeCamera, width: usize, height: usize) -> Self {
        Self::rectify(camera, &Matrix3::identity(), &camera.k, width, height)
    }

    /// Map for a rectified view: output pixels live in the camera described
    /// by `new_k`, rotated by `r` relative to the original camera.
    pub fn rectify(
        camera: &PinholeCamera,
        r: &Matrix3<f64>,
        new_k: &Matrix3<f64>,
        width: usize,
        height: usize,
    ) -> Self {
        let inv = (new_k * r).try_inverse().unwrap_or_else(Matrix3::identity);
        let mut map = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                let ray = inv * Vector3::new(x as f64, y as f64, 1.0);
                let src = if ray.z.abs() > 1e-12 {
                    camera.pixel_from_normalized(Vector2::new(ray.x / ray.z, ray.y / ray.z))
                } else {
                    nalgebra::Point2::new(-1.0, -1.0)
                };
                map.push([src.x as f32, src.y as f32]);
            }
        }
        Self { width, height, map }
    }

    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Sample `src` through the table. Pixels mapping outside the source are black.
    pub fn apply(&self, src: &Frame) -> Frame {
        let c = src.channels();
        let mut out = Frame::new(self.width, self.height, src.format);
        if src.is_empty() {
            return out;
        }
        let (w, h) = (src.width as i64, src.height as i64);
        let fetch = |x: i64, y: i64, ch: usize| -> f32 {
            if x < 0 || y < 0 || x >= w || y >= h {
                0.0
            } else {
                src.data[(y as usize * src.width + x as usize) * c + ch] as f32
            }
        };

        for (i, &[sx, sy]) in self.map.iter().enumerate() {
            if sx < -1.0 || sy < -1.0 || sx > w as f32 || sy > h as f32 {
                continue;
            }
            let x0 = sx.floor() as i64;
            let y0 = sy.floor() as i64;
            let fx = sx - x0 as f32;
            let fy = sy - y0 as f32;
            for ch in 0..c {
                let a = fetch(x0, y0, ch) + fx * (fetch(x0 + 1, y0, ch) - fetch(x0, y0, ch));
                let b = fetch(x0, y0 + 1, ch)
                    + fx * (fetch(x0 + 1, y0 + 1, ch) - fetch(x0, y0 + 1, ch));
                out.data[i * c + ch] = (a + fy * (b - a)).round().clamp(0.0, 255.0) as u8;
            }
        }
        out
    }
}
