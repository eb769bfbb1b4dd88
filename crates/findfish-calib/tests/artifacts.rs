mod common;

use findfish_calib::{
    CalibError, CalibrationConfig, CalibrationPlan, CalibrationStage, CameraSpec, ErrorKind,
    GeometricCalibrator, PointFile, StereoArtifact, STEREO_ARTIFACT,
};
use findfish_core::PinholeCamera;
use nalgebra::{Point2, Point3};

use common::{grid, rig_geometry, write_rig_artifact, SIZE};

fn calibrator(dir: &std::path::Path) -> GeometricCalibrator {
    GeometricCalibrator::new(
        CalibrationPlan::stereo(
            CameraSpec::new("left", Vec::new()),
            CameraSpec::new("right", Vec::new()),
        ),
        CalibrationConfig {
            out_dir: dir.to_path_buf(),
            ..CalibrationConfig::default()
        },
    )
}

fn project_rectified(p: &nalgebra::Matrix3x4<f64>, x: &Point3<f64>) -> Point2<f32> {
    let h = p * x.to_homogeneous();
    Point2::new((h.x / h.z) as f32, (h.y / h.z) as f32)
}

#[test]
fn stereo_artifact_reloads_bit_exact() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(STEREO_ARTIFACT);
    let written = write_rig_artifact(&path);

    let reread = StereoArtifact::load_json(&path).unwrap();
    assert_eq!(reread, written);

    let mut calib = calibrator(dir.path());
    calib.load_calibration().unwrap();
    assert_eq!(calib.stage(), CalibrationStage::Rectified);

    let (left, right, geometry, rect) = rig_geometry();
    let cams: Vec<&PinholeCamera> = calib
        .result()
        .cameras
        .iter()
        .map(|c| &c.as_ref().unwrap().camera)
        .collect();
    assert_eq!(cams, [&left, &right]);
    let loaded = calib.result().stereo.as_ref().unwrap();
    assert_eq!((loaded.r, loaded.t, loaded.e, loaded.f), (geometry.r, geometry.t, geometry.e, geometry.f));
    let loaded_rect = calib.result().rectification.as_ref().unwrap();
    assert_eq!((loaded_rect.p1, loaded_rect.p2), (rect.p1, rect.p2));
    assert_eq!(calib.image_size(), SIZE);
    assert_eq!(calib.config().grid, grid());
}

#[test]
fn load_rejects_unequal_point_counts() {
    let dir = tempfile::tempdir().unwrap();
    write_rig_artifact(&dir.path().join(STEREO_ARTIFACT));

    let mut calib = calibrator(dir.path());
    calib
        .set_image_points(0, vec![vec![Point2::new(1.0, 1.0)]; 5])
        .unwrap();
    calib
        .set_image_points(1, vec![vec![Point2::new(1.0, 1.0)]; 6])
        .unwrap();
    let err = calib.load_calibration().unwrap_err();
    assert!(matches!(err, CalibError::PointCountMismatch { left: 5, right: 6 }));
    assert_eq!(err.kind(), ErrorKind::InputMismatch);
    assert_eq!(calib.stage(), CalibrationStage::Uninitialized);
}

#[test]
fn stereo_calibrate_rejects_unequal_point_counts() {
    let dir = tempfile::tempdir().unwrap();
    write_rig_artifact(&dir.path().join(STEREO_ARTIFACT));

    let mut calib = calibrator(dir.path());
    calib.load_calibration().unwrap();
    calib
        .set_image_points(0, vec![vec![Point2::new(1.0, 1.0)]; 5])
        .unwrap();
    calib
        .set_image_points(1, vec![vec![Point2::new(1.0, 1.0)]; 6])
        .unwrap();
    let err = calib.stereo_calibrate().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InputMismatch);
}

#[test]
fn triangulation_uses_raw_points_without_rectified_cache() {
    let dir = tempfile::tempdir().unwrap();
    write_rig_artifact(&dir.path().join(STEREO_ARTIFACT));
    let (_, _, _, rect) = rig_geometry();

    let world = [
        Point3::new(0.0, 0.0, 500.0),
        Point3::new(25.0, -10.0, 640.0),
        Point3::new(-40.0, 30.0, 720.0),
    ];
    let file = PointFile {
        keypoints_left: vec![world.iter().map(|x| project_rectified(&rect.p1, x)).collect()],
        keypoints_right: vec![world.iter().map(|x| project_rectified(&rect.p2, x)).collect()],
    };
    let points_path = dir.path().join("points.json");
    file.write_json(&points_path).unwrap();

    let mut calib = calibrator(dir.path());
    calib.load_calibration().unwrap();
    calib.load_point_file(&points_path).unwrap();
    let points = calib.triangulate_points().unwrap();
    assert_eq!(points.len(), 1);
    for (got, want) in points[0].iter().zip(&world) {
        assert!((got.coords - want.coords.cast::<f32>()).norm() < 0.5, "{got} vs {want}");
    }
    assert!(dir.path().join("object_points.json").exists());
}

#[test]
fn triangulation_rejects_uneven_point_sets() {
    let dir = tempfile::tempdir().unwrap();
    write_rig_artifact(&dir.path().join(STEREO_ARTIFACT));
    let file = PointFile {
        keypoints_left: vec![
            vec![Point2::new(300.0, 240.0), Point2::new(310.0, 240.0), Point2::new(320.0, 240.0)],
            vec![Point2::new(300.0, 250.0)],
        ],
        keypoints_right: vec![vec![Point2::new(280.0, 240.0)]],
    };
    let points_path = dir.path().join("points.json");
    file.write_json(&points_path).unwrap();

    let mut calib = calibrator(dir.path());
    calib.load_calibration().unwrap();
    calib.load_point_file(&points_path).unwrap();
    let err = calib.triangulate_points().unwrap_err();
    assert!(matches!(err, CalibError::PointCountMismatch { left: 2, right: 1 }));

    // Same number of sets, but the first one is short on the right.
    calib
        .set_image_points(1, vec![vec![Point2::new(280.0, 240.0)], vec![Point2::new(280.0, 250.0)]])
        .unwrap();
    let err = calib.triangulate_points().unwrap_err();
    assert!(matches!(
        err,
        CalibError::SetLengthMismatch {
            set: 0,
            left: 3,
            right: 1
        }
    ));
    assert_eq!(err.kind(), ErrorKind::InputMismatch);
    assert!(!dir.path().join("object_points.json").exists());
}

#[test]
fn triangulation_without_points_fails() {
    let dir = tempfile::tempdir().unwrap();
    write_rig_artifact(&dir.path().join(STEREO_ARTIFACT));
    let mut calib = calibrator(dir.path());
    calib.load_calibration().unwrap();
    let err = calib.triangulate_points().unwrap_err();
    assert!(matches!(err, CalibError::NoPoints));
}

#[test]
fn missing_artifact_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = calibrator(dir.path()).load_calibration().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
}
