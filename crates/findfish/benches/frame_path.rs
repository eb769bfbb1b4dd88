use criterion::{black_box, criterion_group, criterion_main, Criterion};
use findfish::calib::StereoUndistorter;
use findfish::core::{camera_matrix, hconcat, Distortion, Frame, PinholeCamera, PixelFormat};
use findfish::track::{ActivityTracker, TrackerSettings};

const W: usize = 640;
const H: usize = 480;

fn make_frame(shift: usize) -> Frame {
    let mut frame = Frame::new(W, H, PixelFormat::Rgb8);
    for y in 0..H {
        for x in 0..W {
            let v = ((x * 7 + y * 3) % 97) as u8 + 40;
            frame.pixel_mut(x, y).copy_from_slice(&[v, v, v]);
        }
    }
    let x0 = 100 + shift % 300;
    for y in 200..260 {
        for x in x0..x0 + 80 {
            frame.pixel_mut(x, y).copy_from_slice(&[220, 200, 180]);
        }
    }
    frame
}

fn bench_tracker(c: &mut Criterion) {
    let frames: Vec<Frame> = (0..8).map(|i| make_frame(i * 9)).collect();
    c.bench_function("tracker_process_640x480", |b| {
        let mut tracker = ActivityTracker::new(TrackerSettings::default());
        let mut index = 0u64;
        b.iter(|| {
            let mut frame = frames[index as usize % frames.len()].clone();
            let interval = tracker.process(black_box(&mut frame), index);
            index += 1;
            black_box(interval)
        })
    });
}

fn bench_undistort(c: &mut Criterion) {
    let cam = PinholeCamera::new(
        camera_matrix(600.0, 600.0, 319.5, 239.5),
        Distortion {
            k1: -0.2,
            k2: 0.05,
            ..Distortion::default()
        },
    );
    let undistorter = StereoUndistorter::new(&cam, &cam, (W, H));
    let frame = make_frame(0);
    c.bench_function("undistort_pair_640x480", |b| {
        b.iter(|| {
            let l = undistorter.undistort(black_box(&frame), 0).unwrap();
            let r = undistorter.undistort(black_box(&frame), 1).unwrap();
            black_box(hconcat(&l, &r).unwrap())
        })
    });
}

criterion_group!(frame_path, bench_tracker, bench_undistort);
criterion_main!(frame_path);
