#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use findfish::calib::StereoUndistorter;
use findfish::core::{camera_matrix, Distortion, Frame, GrayImageView, PinholeCamera, PixelFormat};
use findfish::track::MarkerDecoder;
use findfish::{FrameSink, FrameSource, StreamError, StreamInfo};

pub const W: usize = 80;
pub const H: usize = 60;
pub const PAYLOAD: &str = "geo:59.91,10.75;site=tank3;cam=rig1";

/// Flat scene. A marker frame has a white top-left pixel; a fish is a
/// bright square whose position follows `index`.
pub fn scene(index: u64, marker: bool, fish: bool) -> Frame {
    let mut frame = Frame::new(W, H, PixelFormat::Rgb8);
    frame.data.fill(60);
    if marker {
        frame.pixel_mut(0, 0).copy_from_slice(&[255, 255, 255]);
    }
    if fish {
        let x0 = 10 + 3 * index as usize % 30;
        for y in 20..40 {
            for x in x0..x0 + 20 {
                frame.pixel_mut(x, y).copy_from_slice(&[210, 190, 170]);
            }
        }
    }
    frame
}

/// `count` frames with the marker at `marker_at` and a fish on `fish`.
pub fn recording(count: u64, marker_at: Option<u64>, fish: std::ops::Range<u64>) -> Vec<Frame> {
    (0..count)
        .map(|i| scene(i, Some(i) == marker_at, fish.contains(&i)))
        .collect()
}

/// Decodes the white corner pixel as [`PAYLOAD`].
pub fn corner_decoder() -> Box<dyn MarkerDecoder> {
    Box::new(|img: &GrayImageView<'_>| {
        (img.data.first().copied().unwrap_or(0) > 250).then(|| PAYLOAD.to_string())
    })
}

/// Zero-distortion maps: undistortion leaves frames untouched.
pub fn identity_undistorter() -> Arc<StereoUndistorter> {
    let cam = PinholeCamera::new(
        camera_matrix(100.0, 100.0, (W as f64 - 1.0) / 2.0, (H as f64 - 1.0) / 2.0),
        Distortion::default(),
    );
    Arc::new(StereoUndistorter::new(&cam, &cam, (W, H)))
}

pub struct VecSource {
    frames: VecDeque<Frame>,
    count: u64,
}

impl VecSource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            count: frames.len() as u64,
            frames: frames.into(),
        }
    }
}

impl FrameSource for VecSource {
    fn info(&self) -> StreamInfo {
        StreamInfo {
            frame_count: Some(self.count),
            fps: 30.0,
            width: W,
            height: H,
            codec: "raw".into(),
        }
    }

    fn read_frame(&mut self) -> Result<Option<Frame>, StreamError> {
        Ok(self.frames.pop_front())
    }
}

#[derive(Default)]
pub struct VecSink {
    pub frames: Vec<Frame>,
    pub finished: bool,
}

impl FrameSink for VecSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), StreamError> {
        self.frames.push(frame.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<(), StreamError> {
        self.finished = true;
        Ok(())
    }
}
