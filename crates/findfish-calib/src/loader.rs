use std::path::Path;

use findfish_core::Frame;

use crate::error::CalibError;

/// Source of calibration images. Called from worker threads.
pub trait ImageLoader: Sync {
    fn load(&self, path: &Path) -> Result<Frame, CalibError>;
}

impl<F> ImageLoader for F
where
    F: Fn(&Path) -> Result<Frame, CalibError> + Sync,
{
    fn load(&self, path: &Path) -> Result<Frame, CalibError> {
        self(path)
    }
}

/// Decodes any format the `image` crate supports into an RGB frame.
#[cfg(feature = "image")]
#[derive(Clone, Copy, Debug, Default)]
pub struct FsImageLoader;

#[cfg(feature = "image")]
impl ImageLoader for FsImageLoader {
    fn load(&self, path: &Path) -> Result<Frame, CalibError> {
        let img = image::ImageReader::open(path)?
            .with_guessed_format()?
            .decode()
            .map_err(|e| CalibError::Image {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
            .to_rgb8();
        let (w, h) = (img.width() as usize, img.height() as usize);
        Frame::from_raw(w, h, findfish_core::PixelFormat::Rgb8, img.into_raw()).map_err(|e| {
            CalibError::Image {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })
    }
}

#[cfg(all(test, feature = "image"))]
mod tests {
    use super::*;

    #[test]
    fn loads_png_as_rgb_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dots.png");
        image::RgbImage::from_pixel(4, 3, image::Rgb([10, 20, 30]))
            .save(&path)
            .unwrap();
        let frame = FsImageLoader.load(&path).unwrap();
        assert_eq!(frame.size(), (4, 3));
        assert_eq!(frame.pixel(3, 2), &[10, 20, 30]);
    }

    #[test]
    fn undecodable_file_is_an_image_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not a png").unwrap();
        let err = FsImageLoader.load(&path).unwrap_err();
        assert!(matches!(err, CalibError::Image { .. }));
    }
}
