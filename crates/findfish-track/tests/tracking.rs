use findfish_core::{Frame, PixelFormat};
use findfish_track::{ActivityInterval, ActivityTracker, MarkerDetector, TrackerSettings};

const W: usize = 80;
const H: usize = 60;

/// Flat background with an optional bright square whose position depends on
/// the frame index.
fn scene(index: u64, fish: bool) -> Frame {
    let mut frame = Frame::new(W, H, PixelFormat::Rgb8);
    frame.data.fill(60);
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

fn track(present: impl Fn(u64) -> bool, frames: u64) -> ActivityTracker {
    let mut tracker = ActivityTracker::new(TrackerSettings::default());
    for i in 0..frames {
        let mut frame = scene(i, present(i));
        tracker.process(&mut frame, i);
    }
    tracker
}

#[test]
fn motion_runs_become_intervals() {
    let tracker = track(|i| (3..7).contains(&i) || (10..12).contains(&i), 15);
    assert_eq!(
        tracker.intervals(),
        &[
            ActivityInterval {
                id: 1,
                start: 3,
                end: Some(7)
            },
            ActivityInterval {
                id: 2,
                start: 10,
                end: Some(12)
            },
        ]
    );
}

#[test]
fn trailing_motion_is_force_closed() {
    let mut tracker = track(|i| i >= 12, 15);
    assert_eq!(tracker.open_interval().map(|i| i.start), Some(12));
    tracker.finish(14);
    assert_eq!(
        tracker.into_intervals(),
        vec![ActivityInterval {
            id: 1,
            start: 12,
            end: Some(14)
        }]
    );
}

#[test]
fn trackers_keep_independent_intervals() {
    let mut left = ActivityTracker::default();
    let mut right = ActivityTracker::default();
    for i in 0..10u64 {
        left.process(&mut scene(i, (2..5).contains(&i)), i);
        right.process(&mut scene(i, false), i);
    }
    assert_eq!(left.intervals().len(), 1);
    assert!(right.intervals().is_empty());
}

#[test]
fn marker_detector_with_custom_decoder() {
    let mut det = MarkerDetector::new(|img: &findfish_core::GrayImageView<'_>| {
        (img.data.iter().any(|&v| v > 150)).then(|| "geo:10.5,20.25;id=cam".to_string())
    });
    for i in 0..5 {
        det.check_frame(&scene(i, i >= 3), i);
    }
    assert!(det.detected_marker());
    assert_eq!(det.state().start(), Some(3));
    assert_eq!(det.fields()["lat"], "10.5");
    assert_eq!(det.fields()["long"], "20.25");
}
