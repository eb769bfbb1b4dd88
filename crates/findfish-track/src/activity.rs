//! Motion intervals from a background-subtraction mask.

use findfish_core::{
    close, dilate, erode, find_external_contours, gaussian_blur, gaussian_kernel,
    threshold_binary, Contour, Frame, GrayImage, StructuringElement,
};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::background::{KnnParams, KnnSubtractor};

/// Mask pipeline settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSettings {
    pub knn: KnnParams,
    /// Gaussian aperture; also the height of the closing element.
    pub blur_size: usize,
    pub blur_sigma: f64,
    /// Side of the elliptic dilate/erode element.
    pub morph_size: usize,
    pub min_threshold: u8,
    pub max_threshold: u8,
    /// Outline detected regions on the processed frame.
    pub draw_contours: bool,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            knn: KnnParams::default(),
            blur_size: 9,
            blur_sigma: 10.0,
            morph_size: 21,
            min_threshold: 200,
            max_threshold: 255,
            draw_contours: false,
        }
    }
}

/// A run of frames with motion. `end` is the first frame without motion,
/// `None` while the interval is open.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityInterval {
    pub id: u32,
    pub start: u64,
    pub end: Option<u64>,
}

impl ActivityInterval {
    pub fn active(&self) -> bool {
        self.end.is_none()
    }
}

const OUTLINE: [u8; 3] = [0, 255, 0];

/// Per-stream motion detector.
///
/// At most one interval is open at a time. Each stream owns its own tracker;
/// intervals from several trackers are only merged by the caller.
#[derive(Clone, Debug)]
pub struct ActivityTracker {
    settings: TrackerSettings,
    subtractor: KnnSubtractor,
    close_se: StructuringElement,
    morph_se: StructuringElement,
    contours: Vec<Contour>,
    intervals: Vec<ActivityInterval>,
}

impl ActivityTracker {
    pub fn new(settings: TrackerSettings) -> Self {
        // Closing uses the support of the 1D Gaussian kernel, a vertical line.
        let taps = gaussian_kernel(settings.blur_size, settings.blur_sigma);
        let close_se = StructuringElement::column(taps.iter().filter(|&&t| t > 0.0).count());
        let morph_se = StructuringElement::ellipse(settings.morph_size, settings.morph_size);
        Self {
            subtractor: KnnSubtractor::new(settings.knn.clone()),
            settings,
            close_se,
            morph_se,
            contours: Vec::new(),
            intervals: Vec::new(),
        }
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    /// Update the background model with `frame` and return the cleaned
    /// binary foreground mask.
    pub fn create_mask(&mut self, frame: &Frame) -> GrayImage {
        let s = &self.settings;
        let raw = self.subtractor.apply(&frame.to_gray().view());
        let blurred = gaussian_blur(&raw.view(), s.blur_size, s.blur_sigma);
        let closed = close(&blurred.view(), &self.close_se);
        let grown = dilate(&closed.view(), &self.morph_se);
        let shrunk = erode(&grown.view(), &self.morph_se);
        threshold_binary(&shrunk.view(), s.min_threshold, s.max_threshold)
    }

    /// Run the mask pipeline on `frame` and keep the external contours of
    /// the moving regions. Bounding boxes are drawn onto `frame` when
    /// `draw_contours` is set.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "trace", skip_all, fields(width = frame.width, height = frame.height))
    )]
    pub fn object_contours(&mut self, frame: &mut Frame) -> &[Contour] {
        let mask = self.create_mask(frame);
        self.contours = find_external_contours(&mask.view());
        if self.settings.draw_contours {
            for c in &self.contours {
                frame.draw_rect(c.bbox.x0, c.bbox.y0, c.bbox.x1, c.bbox.y1, OUTLINE);
            }
        }
        &self.contours
    }

    /// Contours found by the last [`object_contours`](Self::object_contours) call.
    pub fn contours(&self) -> &[Contour] {
        &self.contours
    }

    /// Open an interval at `frame_index` when motion appears, close the open
    /// one when it disappears. Returns the interval that changed state.
    pub fn check_for_activity(&mut self, frame_index: u64) -> Option<ActivityInterval> {
        let moving = !self.contours.is_empty();
        self.update(moving, frame_index)
    }

    /// Contours then activity check for one frame.
    pub fn process(&mut self, frame: &mut Frame, frame_index: u64) -> Option<ActivityInterval> {
        self.object_contours(frame);
        self.check_for_activity(frame_index)
    }

    fn update(&mut self, moving: bool, frame_index: u64) -> Option<ActivityInterval> {
        let open = self.open_interval().is_some();
        match (moving, open) {
            (true, false) => {
                let interval = ActivityInterval {
                    id: self.intervals.len() as u32 + 1,
                    start: frame_index,
                    end: None,
                };
                log::debug!("activity {} opened at frame {frame_index}", interval.id);
                self.intervals.push(interval);
                Some(interval)
            }
            (false, true) => self.close_open(frame_index),
            _ => None,
        }
    }

    fn close_open(&mut self, frame_index: u64) -> Option<ActivityInterval> {
        let open = self.intervals.last_mut().filter(|i| i.active())?;
        open.end = Some(frame_index);
        log::debug!("activity {} closed at frame {frame_index}", open.id);
        Some(*open)
    }

    /// The open interval, if any.
    pub fn open_interval(&self) -> Option<&ActivityInterval> {
        self.intervals.last().filter(|i| i.active())
    }

    /// Force-close any open interval at `last_frame`.
    pub fn finish(&mut self, last_frame: u64) -> Option<ActivityInterval> {
        self.close_open(last_frame)
    }

    pub fn intervals(&self) -> &[ActivityInterval] {
        &self.intervals
    }

    pub fn into_intervals(self) -> Vec<ActivityInterval> {
        self.intervals
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new(TrackerSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use findfish_core::PixelFormat;

    fn run(tracker: &mut ActivityTracker, moving: &[bool]) {
        for (i, &m) in moving.iter().enumerate() {
            tracker.update(m, i as u64);
        }
    }

    #[test]
    fn intervals_open_and_close_on_motion() {
        let mut tracker = ActivityTracker::default();
        let moving: Vec<bool> = (0..15).map(|i| (3..7).contains(&i) || (10..12).contains(&i)).collect();
        run(&mut tracker, &moving);
        assert_eq!(
            tracker.intervals(),
            &[
                ActivityInterval { id: 1, start: 3, end: Some(7) },
                ActivityInterval { id: 2, start: 10, end: Some(12) },
            ]
        );
        assert!(tracker.open_interval().is_none());
    }

    #[test]
    fn open_interval_is_force_closed() {
        let mut tracker = ActivityTracker::default();
        run(&mut tracker, &[false, true, true, true]);
        assert_eq!(tracker.open_interval().map(|i| i.start), Some(1));
        let closed = tracker.finish(3).unwrap();
        assert_eq!(closed.end, Some(3));
        assert!(tracker.finish(9).is_none());
        assert_eq!(tracker.into_intervals().len(), 1);
    }

    #[test]
    fn only_one_interval_is_open() {
        let mut tracker = ActivityTracker::default();
        assert!(tracker.update(true, 0).is_some());
        assert!(tracker.update(true, 1).is_none());
        assert_eq!(tracker.intervals().iter().filter(|i| i.active()).count(), 1);
    }

    #[test]
    fn static_scene_has_no_contours() {
        let mut tracker = ActivityTracker::default();
        let mut frame = Frame::new(48, 32, PixelFormat::Rgb8);
        for _ in 0..3 {
            assert!(tracker.object_contours(&mut frame).is_empty());
        }
    }

    #[test]
    fn drawn_outline_marks_moving_region() {
        let settings = TrackerSettings {
            draw_contours: true,
            ..TrackerSettings::default()
        };
        let mut tracker = ActivityTracker::new(settings);
        let mut bg = Frame::new(64, 48, PixelFormat::Rgb8);
        tracker.object_contours(&mut bg);

        let mut frame = Frame::new(64, 48, PixelFormat::Rgb8);
        for y in 16..32 {
            for x in 24..40 {
                frame.pixel_mut(x, y).copy_from_slice(&[250, 250, 250]);
            }
        }
        let contours = tracker.object_contours(&mut frame).to_vec();
        assert_eq!(contours.len(), 1);
        let b = contours[0].bbox;
        assert!(b.x0 <= 30 && b.x1 >= 34 && b.y0 <= 22 && b.y1 >= 26, "{b:?}");
        assert_eq!(frame.pixel(b.x0, b.y0), &OUTLINE);
    }
}
