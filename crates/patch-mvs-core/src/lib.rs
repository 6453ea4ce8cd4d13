//! Core types for patch-based multi-view stereo.
//!
//! This crate is intentionally small and purely geometric: cameras with an
//! attached image pyramid, plane-induced homographies, and bilinear image
//! sampling. It knows nothing about patches or optimization.

mod camera;
mod homography;
mod image;
mod logger;
mod pyramid;

#[cfg(feature = "synthetic")]
pub mod synthetic;

pub use camera::{Camera, CameraError, PinholeCamera, ProjectionParts};
pub use homography::{homography_from_parts, plane_induced_homography, Homography, Plane};
pub use image::{sample_bilinear_checked, sample_bilinear_clamped, GrayImage, GrayImageView};
pub use pyramid::{level_scale, ImagePyramid, PyramidError};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_from_env, init_with_level, LOG_ENV};
