use findfish_core::{Frame, PinholeCamera, RemapTable};

use crate::error::CalibError;

/// Immutable per-camera undistortion maps, shared read-only between
/// stream workers.
#[derive(Clone, Debug)]
pub struct StereoUndistorter {
    tables: [RemapTable; 2],
    image_size: (usize, usize),
}

impl StereoUndistorter {
    /// Precompute lens-undistortion maps that keep each camera matrix.
    pub fn new(left: &PinholeCamera, right: &PinholeCamera, image_size: (usize, usize)) -> Self {
        let (w, h) = image_size;
        Self {
            tables: [
                RemapTable::undistort(left, w, h),
                RemapTable::undistort(right, w, h),
            ],
            image_size,
        }
    }

    pub fn image_size(&self) -> (usize, usize) {
        self.image_size
    }

    /// Resize `frame` to the calibrated resolution and remove lens
    /// distortion for camera `camera` (0 = left, 1 = right).
    pub fn undistort(&self, frame: &Frame, camera: usize) -> Result<Frame, CalibError> {
        let table = self
            .tables
            .get(camera)
            .ok_or(CalibError::UnknownCamera(camera))?;
        if frame.size() == self.image_size {
            Ok(table.apply(frame))
        } else {
            let (w, h) = self.image_size;
            Ok(table.apply(&frame.resize(w, h)))
        }
    }
}
