//! Streams stored as directories of numbered still frames.

use std::path::{Path, PathBuf};

use findfish_core::{Frame, PixelFormat};

use crate::scan::{scan_dir, IMAGE_EXTENSIONS};
use crate::stream::{FrameSink, FrameSource, StreamError, StreamInfo};

/// Reads the images of a directory in path order.
#[derive(Clone, Debug)]
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    next: usize,
    info: StreamInfo,
}

impl ImageSequenceSource {
    /// Open `dir`. Frame size and codec come from the first image.
    pub fn open(dir: &Path, fps: f64) -> Result<Self, StreamError> {
        let paths = scan_dir(dir, IMAGE_EXTENSIONS).map_err(|e| StreamError::Open {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;
        let first = paths.first().ok_or_else(|| StreamError::Open {
            path: dir.to_path_buf(),
            reason: "no image frames".into(),
        })?;
        let (width, height) = image::image_dimensions(first).map_err(|e| StreamError::Open {
            path: first.clone(),
            reason: e.to_string(),
        })?;
        let codec = first
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let info = StreamInfo {
            frame_count: Some(paths.len() as u64),
            fps,
            width: width as usize,
            height: height as usize,
            codec,
        };
        log::debug!("opened {} ({} frames)", dir.display(), paths.len());
        Ok(Self {
            paths,
            next: 0,
            info,
        })
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl FrameSource for ImageSequenceSource {
    fn info(&self) -> StreamInfo {
        self.info.clone()
    }

    /// Undecodable images are empty reads.
    fn read_frame(&mut self) -> Result<Option<Frame>, StreamError> {
        let Some(path) = self.paths.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;
        let img = match image::open(path) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                log::warn!("unreadable frame {}: {e}", path.display());
                return Ok(None);
            }
        };
        let (w, h) = (img.width() as usize, img.height() as usize);
        Ok(Some(Frame::from_raw(w, h, PixelFormat::Rgb8, img.into_raw())?))
    }
}

/// Writes `frame_000000.<ext>`, `frame_000001.<ext>`, ... into a
/// directory created on the first frame.
#[derive(Clone, Debug)]
pub struct ImageSequenceSink {
    dir: PathBuf,
    extension: String,
    written: u64,
}

impl ImageSequenceSink {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
            written: 0,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn frames_written(&self) -> u64 {
        self.written
    }
}

impl FrameSink for ImageSequenceSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), StreamError> {
        if self.written == 0 {
            std::fs::create_dir_all(&self.dir)?;
        }
        let path = self
            .dir
            .join(format!("frame_{:06}.{}", self.written, self.extension));
        let (w, h) = (frame.width as u32, frame.height as u32);
        let bad = |reason: String| StreamError::Write {
            path: path.clone(),
            reason,
        };
        let saved = match frame.format {
            PixelFormat::Rgb8 => image::RgbImage::from_raw(w, h, frame.data.clone())
                .ok_or_else(|| bad("buffer does not match frame size".into()))?
                .save(&path),
            PixelFormat::Gray8 => image::GrayImage::from_raw(w, h, frame.data.clone())
                .ok_or_else(|| bad("buffer does not match frame size".into()))?
                .save(&path),
        };
        saved.map_err(|e| bad(e.to_string()))?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), StreamError> {
        log::info!("{} frames in {}", self.written, self.dir.display());
        Ok(())
    }
}
