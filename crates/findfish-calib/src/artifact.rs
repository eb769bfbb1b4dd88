//! JSON calibration artifacts.
//!
//! Matrices are stored as `{rows, cols, data}` records with row-major data,
//! sizes as `{width, height}`. Keys follow the established calibration file
//! layout so files stay readable by other tooling.

use std::fs;
use std::path::Path;

use findfish_core::{Distortion, PinholeCamera};
use nalgebra::{Matrix3, Matrix3x4, Point2, Point3, SMatrix, Vector3};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::CalibError;
use crate::grid::DotGrid;
use crate::rectify::Rectification;
use crate::single::CameraCalibration;
use crate::stereo::StereoGeometry;

/// Default stereo artifact file name.
pub const STEREO_ARTIFACT: &str = "stereo_calibration.json";
/// Default triangulation output file name.
pub const OBJECT_POINTS_FILE: &str = "object_points.json";

/// File name of the single-camera artifact for `name`.
pub fn camera_artifact_name(name: &str) -> String {
    format!("calib_camera_{name}.json")
}

pub(crate) fn read_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, CalibError> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

pub(crate) fn write_json<T: Serialize>(value: &T, path: impl AsRef<Path>) -> Result<(), CalibError> {
    let path = path.as_ref();
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatrixRecord {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f64>,
}

impl MatrixRecord {
    pub fn from_matrix<const R: usize, const C: usize>(m: &SMatrix<f64, R, C>) -> Self {
        let data = (0..R)
            .flat_map(|r| (0..C).map(move |c| m[(r, c)]))
            .collect();
        Self {
            rows: R,
            cols: C,
            data,
        }
    }

    pub fn to_matrix<const R: usize, const C: usize>(
        &self,
        key: &'static str,
    ) -> Result<SMatrix<f64, R, C>, CalibError> {
        if self.rows != R || self.cols != C || self.data.len() != R * C {
            return Err(CalibError::MalformedArtifact {
                key,
                reason: format!(
                    "expected {R}x{C}, got {}x{} with {} values",
                    self.rows,
                    self.cols,
                    self.data.len()
                ),
            });
        }
        Ok(SMatrix::from_row_slice(&self.data))
    }

    fn from_distortion(d: &Distortion) -> Self {
        Self {
            rows: 1,
            cols: 5,
            data: d.to_array().to_vec(),
        }
    }

    /// Distortion coefficients, accepting row or column layout and fewer
    /// than five terms.
    fn to_distortion(&self, key: &'static str) -> Result<Distortion, CalibError> {
        if self.data.is_empty() || self.data.len() > 8 || self.rows * self.cols != self.data.len() {
            return Err(CalibError::MalformedArtifact {
                key,
                reason: format!("{} distortion coefficients", self.data.len()),
            });
        }
        Ok(Distortion::from_slice(&self.data))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: usize,
    pub height: usize,
}

impl From<(usize, usize)> for Size {
    fn from((width, height): (usize, usize)) -> Self {
        Self { width, height }
    }
}

impl From<Size> for (usize, usize) {
    fn from(s: Size) -> Self {
        (s.width, s.height)
    }
}

fn grid_size(grid: &DotGrid) -> Size {
    Size {
        width: grid.cols,
        height: grid.rows,
    }
}

/// Per-camera artifact (`calib_camera_<name>.json`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraArtifact {
    #[serde(rename = "K")]
    pub k: MatrixRecord,
    #[serde(rename = "D")]
    pub d: MatrixRecord,
    pub grid_size: Size,
    pub grid_dot_size: f64,
    pub resolution: Size,
}

impl CameraArtifact {
    pub fn new(calib: &CameraCalibration, grid: &DotGrid) -> Self {
        Self {
            k: MatrixRecord::from_matrix(&calib.camera.k),
            d: MatrixRecord::from_distortion(&calib.camera.dist),
            grid_size: grid_size(grid),
            grid_dot_size: grid.spacing,
            resolution: calib.image_size.into(),
        }
    }

    pub fn camera(&self) -> Result<PinholeCamera, CalibError> {
        Ok(PinholeCamera::new(
            self.k.to_matrix("K")?,
            self.d.to_distortion("D")?,
        ))
    }

    pub fn to_calibration(&self) -> Result<CameraCalibration, CalibError> {
        Ok(CameraCalibration {
            camera: self.camera()?,
            poses: Vec::new(),
            rms: None,
            image_size: self.resolution.into(),
        })
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, CalibError> {
        read_json(path)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), CalibError> {
        write_json(self, path)
    }
}

/// Stereo artifact (`stereo_calibration.json`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StereoArtifact {
    #[serde(rename = "K1")]
    pub k1: MatrixRecord,
    #[serde(rename = "D1")]
    pub d1: MatrixRecord,
    #[serde(rename = "K2")]
    pub k2: MatrixRecord,
    #[serde(rename = "D2")]
    pub d2: MatrixRecord,
    #[serde(rename = "E")]
    pub e: MatrixRecord,
    #[serde(rename = "F")]
    pub f: MatrixRecord,
    #[serde(rename = "R")]
    pub r: MatrixRecord,
    #[serde(rename = "T")]
    pub t: MatrixRecord,
    #[serde(rename = "P1")]
    pub p1: MatrixRecord,
    #[serde(rename = "R1")]
    pub r1: MatrixRecord,
    #[serde(rename = "P2")]
    pub p2: MatrixRecord,
    #[serde(rename = "R2")]
    pub r2: MatrixRecord,
    pub grid_size: Size,
    pub grid_dot_size: f64,
    pub image_size: Size,
}

/// Everything a stereo artifact describes, decoded.
#[derive(Clone, Debug, PartialEq)]
pub struct StereoModel {
    pub left: PinholeCamera,
    pub right: PinholeCamera,
    pub geometry: StereoGeometry,
    pub rectification: Rectification,
    pub grid: DotGrid,
    pub image_size: (usize, usize),
}

impl StereoArtifact {
    pub fn new(
        left: &PinholeCamera,
        right: &PinholeCamera,
        geometry: &StereoGeometry,
        rect: &Rectification,
        grid: &DotGrid,
        image_size: (usize, usize),
    ) -> Self {
        Self {
            k1: MatrixRecord::from_matrix(&left.k),
            d1: MatrixRecord::from_distortion(&left.dist),
            k2: MatrixRecord::from_matrix(&right.k),
            d2: MatrixRecord::from_distortion(&right.dist),
            e: MatrixRecord::from_matrix(&geometry.e),
            f: MatrixRecord::from_matrix(&geometry.f),
            r: MatrixRecord::from_matrix(&geometry.r),
            t: MatrixRecord::from_matrix(&geometry.t),
            p1: MatrixRecord::from_matrix(&rect.p1),
            r1: MatrixRecord::from_matrix(&rect.r1),
            p2: MatrixRecord::from_matrix(&rect.p2),
            r2: MatrixRecord::from_matrix(&rect.r2),
            grid_size: grid_size(grid),
            grid_dot_size: grid.spacing,
            image_size: image_size.into(),
        }
    }

    /// Decode all fields. `pairs` is left at zero; the caller knows the
    /// number of cached point pairs.
    pub fn decode(&self) -> Result<StereoModel, CalibError> {
        let left = PinholeCamera::new(self.k1.to_matrix("K1")?, self.d1.to_distortion("D1")?);
        let right = PinholeCamera::new(self.k2.to_matrix("K2")?, self.d2.to_distortion("D2")?);
        let r: Matrix3<f64> = self.r.to_matrix("R")?;
        let t: Vector3<f64> = self.t.to_matrix("T")?;
        let geometry = StereoGeometry {
            r,
            t,
            e: self.e.to_matrix("E")?,
            f: self.f.to_matrix("F")?,
            rms: None,
            pairs: 0,
        };
        let p1: Matrix3x4<f64> = self.p1.to_matrix("P1")?;
        let p2: Matrix3x4<f64> = self.p2.to_matrix("P2")?;
        let rectification =
            Rectification::from_projections(self.r1.to_matrix("R1")?, self.r2.to_matrix("R2")?, p1, p2)?;
        Ok(StereoModel {
            left,
            right,
            geometry,
            rectification,
            grid: DotGrid::new(self.grid_size.width, self.grid_size.height, self.grid_dot_size),
            image_size: self.image_size.into(),
        })
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, CalibError> {
        read_json(path)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), CalibError> {
        write_json(self, path)
    }
}

/// Matched 2D keypoints for triangulation-only workflows.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PointFile {
    pub keypoints_left: Vec<Vec<Point2<f32>>>,
    pub keypoints_right: Vec<Vec<Point2<f32>>>,
}

impl PointFile {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, CalibError> {
        read_json(path)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), CalibError> {
        write_json(self, path)
    }
}

/// Triangulation output, one point set per image pair.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectPointsFile {
    pub object_points: Vec<Vec<Point3<f32>>>,
}

impl ObjectPointsFile {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, CalibError> {
        read_json(path)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), CalibError> {
        write_json(self, path)
    }
}
