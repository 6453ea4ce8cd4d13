//! Procedurally rendered planar scenes for tests and benchmarks.

use crate::{
    Camera, CameraError, GrayImage, ImagePyramid, PinholeCamera, Plane, PyramidError,
};
use nalgebra::{Matrix3, Point3, Vector3};

#[derive(thiserror::Error, Debug)]
pub enum SyntheticError {
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Pyramid(#[from] PyramidError),
}

/// Where a synthetic camera sits and what it looks at.
#[derive(Clone, Copy, Debug)]
pub struct ViewSpec {
    pub center: Point3<f64>,
    pub target: Point3<f64>,
    pub up: Vector3<f64>,
}

impl ViewSpec {
    pub fn looking_at(center: Point3<f64>, target: Point3<f64>) -> Self {
        Self {
            center,
            target,
            up: Vector3::y(),
        }
    }
}

/// Image size, intrinsics and pyramid depth shared by rendered cameras.
#[derive(Clone, Copy, Debug)]
pub struct SensorSpec {
    pub width: usize,
    pub height: usize,
    pub focal: f64,
    pub levels: usize,
}

impl SensorSpec {
    pub fn k(&self) -> Matrix3<f64> {
        PinholeCamera::intrinsics(
            self.focal,
            self.focal,
            (self.width as f64 - 1.0) * 0.5,
            (self.height as f64 - 1.0) * 0.5,
        )
    }
}

/// Smooth multi-frequency intensity pattern in plane coordinates.
pub fn default_texture(x: f64, y: f64) -> f64 {
    128.0
        + 45.0 * (9.0 * x + 1.3 * y).sin()
        + 35.0 * (7.0 * y - 2.0 * x).cos()
        + 20.0 * (13.0 * (x + y)).sin()
}

fn empty_camera(sensor: &SensorSpec, view: &ViewSpec) -> Result<PinholeCamera, SyntheticError> {
    let placeholder = ImagePyramid::build(GrayImage::filled(1, 1, 0), 1)?;
    Ok(PinholeCamera::look_at(
        sensor.k(),
        view.center,
        view.target,
        view.up,
        placeholder,
    )?)
}

/// Render `plane` textured by `texture(x, y)` (world x/y of the hit point).
///
/// Pixels whose ray misses the plane get `background`.
pub fn render_plane_camera(
    sensor: &SensorSpec,
    view: &ViewSpec,
    plane: &Plane,
    background: u8,
    texture: impl Fn(f64, f64) -> f64,
) -> Result<PinholeCamera, SyntheticError> {
    let camera = empty_camera(sensor, view)?;
    let center = camera.center();
    let base = GrayImage::from_fn(sensor.width, sensor.height, |u, v| {
        let Some(dir) = camera.pixel_ray(u as f64, v as f64) else {
            return background;
        };
        let denom = plane.normal.dot(&dir);
        if denom.abs() < 1e-12 {
            return background;
        }
        let s = -plane.signed_distance(&center) / denom;
        if s <= 0.0 {
            return background;
        }
        let hit = center + dir * s;
        texture(hit.x, hit.y).round().clamp(0.0, 255.0) as u8
    });
    let pyramid = ImagePyramid::build(base, sensor.levels)?;
    Ok(camera.with_pyramid(pyramid))
}

/// Camera whose every pyramid level is a constant `value`.
pub fn flat_camera(
    sensor: &SensorSpec,
    view: &ViewSpec,
    value: u8,
) -> Result<PinholeCamera, SyntheticError> {
    let camera = empty_camera(sensor, view)?;
    let base = GrayImage::filled(sensor.width, sensor.height, value);
    let pyramid = ImagePyramid::build(base, sensor.levels)?;
    Ok(camera.with_pyramid(pyramid))
}
