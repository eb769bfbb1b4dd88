//! Core building blocks of the findfish stereo pipeline.
//!
//! Pixel buffers, a pinhole/Brown-Conrady camera model, remap tables and the
//! handful of filters the calibration and tracking crates need. This crate
//! does not decode or encode any file format.

mod camera;
mod contour;
mod filter;
mod homography;
mod image;
mod logger;
mod remap;

pub use camera::{camera_matrix, Distortion, PinholeCamera};
pub use contour::{
    find_external_contours, label_components, Blob, BoundingBox, Components, Connectivity,
    Contour,
};
pub use filter::{
    close, dilate, erode, gaussian_blur, gaussian_kernel, otsu_threshold, threshold_binary,
    StructuringElement,
};
pub use homography::{fit_homography, Homography};
pub use image::{hconcat, Frame, GrayImage, GrayImageView, ImageError, PixelFormat};
pub use remap::RemapTable;

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_level, level_from_verbosity};
