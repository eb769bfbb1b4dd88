use serde::{Deserialize, Serialize};

/// Errors raised when building or combining pixel buffers.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("invalid pixel buffer length (expected {expected} bytes, got {got})")]
    InvalidBuffer { expected: usize, got: usize },

    #[error("frames differ in pixel format ({left:?} vs {right:?})")]
    FormatMismatch {
        left: PixelFormat,
        right: PixelFormat,
    },
}

#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8], // row-major, len = w*h
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl GrayImage {
    pub fn new(width: usize, height: usize) -> Self {
        Self::filled(width, height, 0)
    }

    pub fn filled(width: usize, height: usize, value: u8) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    pub fn from_raw(width: usize, height: usize, data: Vec<u8>) -> Result<Self, ImageError> {
        let expected = width * height;
        if data.len() != expected {
            return Err(ImageError::InvalidBuffer {
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn view(&self) -> GrayImageView<'_> {
        GrayImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, v: u8) {
        self.data[y * self.width + x] = v;
    }

    pub fn count_nonzero(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }
}

/// Pixel layout of a [`Frame`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    Gray8,
    Rgb8,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgb8 => 3,
        }
    }
}

/// Interleaved 8-bit video frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub width: usize,
    pub height: usize,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl Frame {
    /// Black frame of the given size.
    pub fn new(width: usize, height: usize, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
            data: vec![0; width * height * format.channels()],
        }
    }

    pub fn from_raw(
        width: usize,
        height: usize,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self, ImageError> {
        let expected = width * height * format.channels();
        if data.len() != expected {
            return Err(ImageError::InvalidBuffer {
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    pub fn from_gray(img: GrayImage) -> Self {
        Self {
            width: img.width,
            height: img.height,
            format: PixelFormat::Gray8,
            data: img.data,
        }
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.format.channels()
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> &[u8] {
        let c = self.channels();
        let i = (y * self.width + x) * c;
        &self.data[i..i + c]
    }

    #[inline]
    pub fn pixel_mut(&mut self, x: usize, y: usize) -> &mut [u8] {
        let c = self.channels();
        let i = (y * self.width + x) * c;
        &mut self.data[i..i + c]
    }

    /// Luma conversion with BT.601 weights.
    pub fn to_gray(&self) -> GrayImage {
        match self.format {
            PixelFormat::Gray8 => GrayImage {
                width: self.width,
                height: self.height,
                data: self.data.clone(),
            },
            PixelFormat::Rgb8 => {
                let data = self
                    .data
                    .chunks_exact(3)
                    .map(|p| luma(p[0], p[1], p[2]))
                    .collect();
                GrayImage {
                    width: self.width,
                    height: self.height,
                    data,
                }
            }
        }
    }

    /// Bilinear resize using pixel-centre alignment.
    pub fn resize(&self, width: usize, height: usize) -> Frame {
        if (width, height) == (self.width, self.height) {
            return self.clone();
        }
        let c = self.channels();
        let mut out = Frame::new(width, height, self.format);
        if self.is_empty() || width == 0 || height == 0 {
            return out;
        }
        let sx = self.width as f32 / width as f32;
        let sy = self.height as f32 / height as f32;
        let max_x = (self.width - 1) as f32;
        let max_y = (self.height - 1) as f32;

        for y in 0..height {
            let fy = ((y as f32 + 0.5) * sy - 0.5).clamp(0.0, max_y);
            let y0 = fy.floor() as usize;
            let y1 = (y0 + 1).min(self.height - 1);
            let wy = fy - y0 as f32;
            for x in 0..width {
                let fx = ((x as f32 + 0.5) * sx - 0.5).clamp(0.0, max_x);
                let x0 = fx.floor() as usize;
                let x1 = (x0 + 1).min(self.width - 1);
                let wx = fx - x0 as f32;
                for ch in 0..c {
                    let p00 = self.data[(y0 * self.width + x0) * c + ch] as f32;
                    let p10 = self.data[(y0 * self.width + x1) * c + ch] as f32;
                    let p01 = self.data[(y1 * self.width + x0) * c + ch] as f32;
                    let p11 = self.data[(y1 * self.width + x1) * c + ch] as f32;
                    let a = p00 + wx * (p10 - p00);
                    let b = p01 + wx * (p11 - p01);
                    out.data[(y * width + x) * c + ch] = (a + wy * (b - a)).round() as u8;
                }
            }
        }
        out
    }

    /// Outline an axis-aligned rectangle (inclusive corners) in place.
    pub fn draw_rect(&mut self, x0: usize, y0: usize, x1: usize, y1: usize, color: [u8; 3]) {
        if self.is_empty() {
            return;
        }
        let x1 = x1.min(self.width - 1);
        let y1 = y1.min(self.height - 1);
        if x0 > x1 || y0 > y1 {
            return;
        }
        let gray = luma(color[0], color[1], color[2]);
        let paint = |f: &mut Frame, x: usize, y: usize| {
            let px = f.pixel_mut(x, y);
            if px.len() == 3 {
                px.copy_from_slice(&color);
            } else {
                px[0] = gray;
            }
        };
        for x in x0..=x1 {
            paint(self, x, y0);
            paint(self, x, y1);
        }
        for y in y0..=y1 {
            paint(self, x0, y);
            paint(self, x1, y);
        }
    }
}

#[inline]
fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((299 * r as u32 + 587 * g as u32 + 114 * b as u32 + 500) / 1000) as u8
}

/// Place two frames next to each other; the shorter one is padded with black.
pub fn hconcat(left: &Frame, right: &Frame) -> Result<Frame, ImageError> {
    if left.format != right.format {
        return Err(ImageError::FormatMismatch {
            left: left.format,
            right: right.format,
        });
    }
    let c = left.channels();
    let width = left.width + right.width;
    let height = left.height.max(right.height);
    let mut out = Frame::new(width, height, left.format);
    for (src, x_off) in [(left, 0usize), (right, left.width)] {
        let row_len = src.width * c;
        for y in 0..src.height {
            let dst = (y * width + x_off) * c;
            out.data[dst..dst + row_len].copy_from_slice(&src.data[y * row_len..(y + 1) * row_len]);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_checks_length() {
        let err = Frame::from_raw(4, 2, PixelFormat::Rgb8, vec![0; 10]).unwrap_err();
        assert_eq!(
            err,
            ImageError::InvalidBuffer {
                expected: 24,
                got: 10
            }
        );
    }

    #[test]
    fn hconcat_pads_shorter_frame_with_black() {
        let left = Frame::from_raw(2, 2, PixelFormat::Gray8, vec![9; 4]).unwrap();
        let right = Frame::from_raw(3, 1, PixelFormat::Gray8, vec![7; 3]).unwrap();
        let out = hconcat(&left, &right).unwrap();
        assert_eq!(out.size(), (5, 2));
        assert_eq!(&out.data[0..5], &[9, 9, 7, 7, 7]);
        assert_eq!(&out.data[5..10], &[9, 9, 0, 0, 0]);
    }

    #[test]
    fn hconcat_rejects_mixed_formats() {
        let a = Frame::new(1, 1, PixelFormat::Gray8);
        let b = Frame::new(1, 1, PixelFormat::Rgb8);
        assert!(hconcat(&a, &b).is_err());
    }

    #[test]
    fn resize_keeps_constant_image_constant() {
        let f = Frame::from_raw(8, 6, PixelFormat::Rgb8, vec![42; 8 * 6 * 3]).unwrap();
        let r = f.resize(5, 11);
        assert_eq!(r.size(), (5, 11));
        assert!(r.data.iter().all(|&v| v == 42));
    }

    #[test]
    fn gray_conversion_uses_luma_weights() {
        let f = Frame::from_raw(1, 1, PixelFormat::Rgb8, vec![255, 0, 0]).unwrap();
        assert_eq!(f.to_gray().data[0], 76);
    }
}
