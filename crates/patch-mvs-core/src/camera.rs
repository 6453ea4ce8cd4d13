//! Calibrated projective cameras.
//!
//! A camera maps a world point `X` to homogeneous image coordinates
//! `x = K (R X + t) = KR·X + KT`. Refinement code only relies on the
//! [`Camera`] trait; [`PinholeCamera`] is the concrete implementation used by
//! the loaders and the synthetic test scenes.

use crate::pyramid::{level_scale, ImagePyramid};
use nalgebra::{Matrix3, Point2, Point3, Rotation3, Unit, UnitVector3, Vector3};

/// Camera construction errors.
#[derive(thiserror::Error, Debug)]
pub enum CameraError {
    #[error("intrinsic matrix is not invertible")]
    SingularIntrinsics,
    #[error("look-at target coincides with the camera center")]
    DegenerateLookAt,
    #[error("rotation matrix is not orthonormal (det={det:.6})")]
    InvalidRotation { det: f64 },
}

/// The `(K·R, K·T)` factors of a projection matrix `P = [K·R | K·T]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProjectionParts {
    pub kr: Matrix3<f64>,
    pub kt: Vector3<f64>,
}

/// Capability consumed by patch refinement.
pub trait Camera: Sync {
    /// Optical center in world coordinates.
    fn center(&self) -> Point3<f64>;

    /// Unit viewing direction in world coordinates.
    fn optical_axis(&self) -> UnitVector3<f64>;

    fn projection(&self) -> ProjectionParts;

    fn pyramid(&self) -> &ImagePyramid;

    /// Project to level-0 pixel coordinates; `None` for points at or behind the camera.
    fn project_point(&self, point: &Point3<f64>) -> Option<Point2<f64>> {
        let p = self.projection();
        let h = p.kr * point.coords + p.kt;
        if h.z <= f64::EPSILON {
            return None;
        }
        Some(Point2::new(h.x / h.z, h.y / h.z))
    }

    /// Project to pixel coordinates of pyramid `level`.
    ///
    /// Returns `None` if the point is behind the camera, the level does not
    /// exist, or the projection falls outside that level's image.
    fn project(&self, point: &Point3<f64>, level: usize) -> Option<Point2<f64>> {
        let p0 = self.project_point(point)?;
        let s = level_scale(level);
        let p = Point2::new(p0.x * s, p0.y * s);
        let img = self.pyramid().level(level)?;
        let max_x = img.width.checked_sub(1)? as f64;
        let max_y = img.height.checked_sub(1)? as f64;
        let inside = p.x >= 0.0 && p.y >= 0.0 && p.x <= max_x && p.y <= max_y;
        inside.then_some(p)
    }

    /// Whether integer pixel `(x, y)` exists at pyramid `level`.
    fn in_image(&self, x: i64, y: i64, level: usize) -> bool {
        self.pyramid()
            .level(level)
            .is_some_and(|img| img.contains(x, y))
    }
}

/// Pinhole camera `x = K (R X + t)` with an attached image pyramid.
#[derive(Clone, Debug)]
pub struct PinholeCamera {
    k: Matrix3<f64>,
    rotation: Rotation3<f64>,
    translation: Vector3<f64>,
    pyramid: ImagePyramid,
    parts: ProjectionParts,
}

impl PinholeCamera {
    pub fn new(
        k: Matrix3<f64>,
        rotation: Matrix3<f64>,
        translation: Vector3<f64>,
        pyramid: ImagePyramid,
    ) -> Result<Self, CameraError> {
        if k.try_inverse().is_none() {
            return Err(CameraError::SingularIntrinsics);
        }
        let det = rotation.determinant();
        let ortho = (rotation.transpose() * rotation - Matrix3::identity()).norm();
        if (det - 1.0).abs() > 1e-6 || ortho > 1e-6 {
            return Err(CameraError::InvalidRotation { det });
        }
        let rotation = Rotation3::from_matrix_unchecked(rotation);
        let parts = ProjectionParts {
            kr: k * rotation.matrix(),
            kt: k * translation,
        };
        Ok(Self {
            k,
            rotation,
            translation,
            pyramid,
            parts,
        })
    }

    /// Camera at `center` looking at `target`; image y points along `-up` as usual.
    pub fn look_at(
        k: Matrix3<f64>,
        center: Point3<f64>,
        target: Point3<f64>,
        up: Vector3<f64>,
        pyramid: ImagePyramid,
    ) -> Result<Self, CameraError> {
        let forward = target - center;
        if forward.norm() < 1e-12 {
            return Err(CameraError::DegenerateLookAt);
        }
        let z = forward.normalize();
        // Image rows grow downwards, so the camera y axis is the negated up hint.
        let mut x = (-up).cross(&z);
        if x.norm() < 1e-9 {
            x = Vector3::x().cross(&z);
            if x.norm() < 1e-9 {
                x = Vector3::y().cross(&z);
            }
        }
        let x = x.normalize();
        let y = z.cross(&x);
        let rotation = Matrix3::from_rows(&[x.transpose(), y.transpose(), z.transpose()]);
        let translation = -(rotation * center.coords);
        Self::new(k, rotation, translation, pyramid)
    }

    /// Intrinsics `[fx 0 cx; 0 fy cy; 0 0 1]`.
    pub fn intrinsics(fx: f64, fy: f64, cx: f64, cy: f64) -> Matrix3<f64> {
        Matrix3::new(fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0)
    }

    /// Replace the attached image pyramid, keeping the geometry.
    pub fn with_pyramid(mut self, pyramid: ImagePyramid) -> Self {
        self.pyramid = pyramid;
        self
    }

    /// World-space direction of the viewing ray through level-0 pixel `(u, v)`.
    pub fn pixel_ray(&self, u: f64, v: f64) -> Option<Vector3<f64>> {
        let k_inv = self.k.try_inverse()?;
        let d_cam = k_inv * Vector3::new(u, v, 1.0);
        Some(self.rotation.inverse() * d_cam)
    }

    pub fn k(&self) -> &Matrix3<f64> {
        &self.k
    }

    pub fn rotation(&self) -> &Rotation3<f64> {
        &self.rotation
    }

    pub fn translation(&self) -> &Vector3<f64> {
        &self.translation
    }
}

impl Camera for PinholeCamera {
    fn center(&self) -> Point3<f64> {
        Point3::from(-(self.rotation.inverse() * self.translation))
    }

    fn optical_axis(&self) -> UnitVector3<f64> {
        let row = self.rotation.matrix().row(2).transpose();
        Unit::new_normalize(row)
    }

    fn projection(&self) -> ProjectionParts {
        self.parts
    }

    fn pyramid(&self) -> &ImagePyramid {
        &self.pyramid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GrayImage;
    use approx::assert_relative_eq;

    fn camera_at(center: Point3<f64>) -> PinholeCamera {
        let pyramid = ImagePyramid::build(GrayImage::filled(64, 48, 100), 3).expect("pyramid");
        PinholeCamera::look_at(
            PinholeCamera::intrinsics(100.0, 100.0, 32.0, 24.0),
            center,
            Point3::origin(),
            Vector3::y(),
            pyramid,
        )
        .expect("camera")
    }

    #[test]
    fn look_at_recovers_center_and_axis() {
        let cam = camera_at(Point3::new(1.0, -2.0, 5.0));
        let c = cam.center();
        assert_relative_eq!(c, Point3::new(1.0, -2.0, 5.0), epsilon = 1e-9);
        let expected = -Vector3::new(1.0, -2.0, 5.0).normalize();
        assert_relative_eq!(cam.optical_axis().into_inner(), expected, epsilon = 1e-9);
    }

    #[test]
    fn target_projects_to_principal_point() {
        let cam = camera_at(Point3::new(0.0, 0.0, 4.0));
        let p = cam.project(&Point3::origin(), 0).expect("visible");
        assert_relative_eq!(p, Point2::new(32.0, 24.0), epsilon = 1e-9);
        let p2 = cam.project(&Point3::origin(), 2).expect("visible at level 2");
        assert_relative_eq!(p2, Point2::new(8.0, 6.0), epsilon = 1e-9);
    }

    #[test]
    fn points_behind_or_outside_are_rejected() {
        let cam = camera_at(Point3::new(0.0, 0.0, 4.0));
        assert!(cam.project_point(&Point3::new(0.0, 0.0, 8.0)).is_none());
        assert!(cam.project(&Point3::new(50.0, 0.0, 0.0), 0).is_none());
        assert!(cam.project(&Point3::origin(), 7).is_none());
    }

    #[test]
    fn in_image_respects_level_size() {
        let cam = camera_at(Point3::new(0.0, 0.0, 4.0));
        assert!(cam.in_image(63, 47, 0));
        assert!(!cam.in_image(63, 47, 1));
        assert!(cam.in_image(31, 23, 1));
        assert!(!cam.in_image(-1, 0, 0));
    }

    #[test]
    fn empty_level_projects_to_nothing() {
        let mut cam = camera_at(Point3::new(0.0, 0.0, 4.0));
        assert!(cam.project(&Point3::origin(), 0).is_some());
        cam.pyramid = ImagePyramid {
            levels: vec![GrayImage::filled(0, 0, 0)],
        };
        assert!(cam.project(&Point3::origin(), 0).is_none());
        assert!(!cam.in_image(0, 0, 0));
    }

    #[test]
    fn rejects_non_rotation() {
        let pyramid = ImagePyramid::build(GrayImage::filled(8, 8, 0), 1).expect("pyramid");
        let err = PinholeCamera::new(
            Matrix3::identity(),
            Matrix3::identity() * 2.0,
            Vector3::zeros(),
            pyramid,
        )
        .unwrap_err();
        assert!(matches!(err, CameraError::InvalidRotation { .. }));
    }
}
