#![allow(dead_code)]

use std::path::Path;

use findfish_calib::{
    stereo_rectify, CalibError, DotGrid, Pose, Rectification, StereoArtifact, StereoGeometry,
};
use findfish_core::{camera_matrix, Distortion, Frame, GrayImage, PinholeCamera};
use nalgebra::Vector3;

pub const SIZE: (usize, usize) = (640, 480);

pub fn grid() -> DotGrid {
    DotGrid::new(11, 7, 20.0)
}

/// Two cameras 60 mm apart with mild barrel distortion.
pub fn rig() -> (PinholeCamera, PinholeCamera, Pose) {
    let left = PinholeCamera::new(
        camera_matrix(800.0, 800.0, 319.5, 239.5),
        Distortion {
            k1: -0.05,
            ..Distortion::default()
        },
    );
    let right = PinholeCamera::new(
        camera_matrix(800.0, 800.0, 319.5, 239.5),
        Distortion {
            k1: -0.04,
            ..Distortion::default()
        },
    );
    let rel = Pose::new(Vector3::new(0.0, -0.03, 0.0), Vector3::new(-60.0, 0.0, 0.0));
    (left, right, rel)
}

/// Board poses in the left camera, roughly centred between both cameras.
pub fn board_poses() -> Vec<Pose> {
    let rvecs = [
        Vector3::new(0.2, -0.1, 0.02),
        Vector3::new(-0.15, 0.2, -0.05),
        Vector3::new(0.1, 0.25, 0.08),
        Vector3::new(-0.25, -0.1, 0.0),
        Vector3::new(0.05, -0.2, -0.1),
        Vector3::new(0.18, 0.12, 0.04),
    ];
    rvecs
        .iter()
        .enumerate()
        .map(|(i, &r)| Pose::new(r, Vector3::new(-70.0 + 5.0 * i as f64, -60.0, 560.0 + 20.0 * i as f64)))
        .collect()
}

pub fn right_pose(rel: &Pose, left: &Pose) -> Pose {
    let r = rel.rotation();
    Pose::from_rt(&(r * left.rotation()), r * left.tvec + rel.tvec)
}

/// Dark discs at the projected dot centres.
pub fn render_view(camera: &PinholeCamera, pose: &Pose, grid: &DotGrid) -> Frame {
    let (w, h) = SIZE;
    let radius = 5.0;
    let mut img = GrayImage::filled(w, h, 230);
    for p in grid.object_points() {
        let c = camera.project(&pose.transform(&p));
        let x0 = (c.x - radius - 1.0).max(0.0) as usize;
        let y0 = (c.y - radius - 1.0).max(0.0) as usize;
        let x1 = ((c.x + radius + 2.0) as usize).min(w);
        let y1 = ((c.y + radius + 2.0) as usize).min(h);
        for y in y0..y1 {
            for x in x0..x1 {
                if (x as f64 - c.x).hypot(y as f64 - c.y) <= radius {
                    img.set(x, y, 20);
                }
            }
        }
    }
    Frame::from_gray(img)
}

/// Loader serving rendered views for paths named `<left|right>/<index>.png`.
pub fn rig_loader() -> impl Fn(&Path) -> Result<Frame, CalibError> + Sync {
    let (left, right, rel) = rig();
    let grid = grid();
    let poses = board_poses();
    move |path: &Path| {
        let index: usize = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| CalibError::Image {
                path: path.to_path_buf(),
                reason: "unknown synthetic image".into(),
            })?;
        let pose = poses.get(index).ok_or_else(|| CalibError::Image {
            path: path.to_path_buf(),
            reason: "no such view".into(),
        })?;
        let is_right = path.parent().is_some_and(|p| p.ends_with("right"));
        Ok(if is_right {
            render_view(&right, &right_pose(&rel, pose), &grid)
        } else {
            render_view(&left, pose, &grid)
        })
    }
}

/// Ground-truth rig geometry and its rectification.
pub fn rig_geometry() -> (PinholeCamera, PinholeCamera, StereoGeometry, Rectification) {
    let (left, right, rel) = rig();
    let geometry = StereoGeometry::from_relative_pose(&left, &right, rel.rotation(), rel.tvec);
    let rect = stereo_rectify(&left, &right, &geometry.r, &geometry.t, SIZE).expect("rectify");
    (left, right, geometry, rect)
}

pub fn write_rig_artifact(path: &Path) -> StereoArtifact {
    let (left, right, geometry, rect) = rig_geometry();
    let artifact = StereoArtifact::new(&left, &right, &geometry, &rect, &grid(), SIZE);
    artifact.write_json(path).expect("write artifact");
    artifact
}
