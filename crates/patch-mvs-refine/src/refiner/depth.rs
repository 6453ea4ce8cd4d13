use super::{Degeneracy, RefineError, RefineParams};
use crate::DepthRange;
use nalgebra::{Point3, Unit, UnitVector3};
use patch_mvs_core::Camera;
use std::collections::BTreeSet;

/// Patch center expressed along the reference camera's viewing ray.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayDepth {
    pub origin: Point3<f64>,
    pub ray: UnitVector3<f64>,
    pub depth: f64,
}

impl RayDepth {
    pub fn between(origin: Point3<f64>, center: &Point3<f64>) -> Option<Self> {
        let offset = center - origin;
        let depth = offset.norm();
        let ray = Unit::try_new(offset, 1e-12)?;
        Some(Self { origin, ray, depth })
    }

    /// Point at `depth` along the ray.
    #[inline]
    pub fn point_at(&self, depth: f64) -> Point3<f64> {
        self.origin + self.ray.into_inner() * depth
    }
}

/// Search interval for the depth along the reference ray.
///
/// Each non-reference camera measures how far (in pixels) one unit of depth
/// moves the projection; the tolerance `max(cell_size, min_px) / distance`
/// is the depth change that moves it by about one grid cell. The half-width
/// is the largest tolerance over all cameras.
pub fn depth_range<C: Camera>(
    cameras: &[C],
    visibility: &BTreeSet<usize>,
    reference: usize,
    rd: &RayDepth,
    params: &RefineParams,
) -> Result<DepthRange, RefineError> {
    let center = rd.point_at(rd.depth);
    let shifted = rd.point_at(rd.depth + 1.0);
    let pixels = params.cell_size.max(params.min_depth_tolerance_px);

    let mut half_width: Option<f64> = None;
    for &c in visibility.iter().filter(|&&c| c != reference) {
        let cam = cameras
            .get(c)
            .ok_or(RefineError::UnknownCamera {
                camera: c,
                count: cameras.len(),
            })?;
        let (Some(p1), Some(p2)) = (cam.project_point(&center), cam.project_point(&shifted)) else {
            continue;
        };
        let image_dist = (p1 - p2).norm();
        if !image_dist.is_finite() || image_dist < 1e-9 {
            continue;
        }
        let tolerance = pixels / image_dist;
        half_width = Some(half_width.map_or(tolerance, |hw| hw.max(tolerance)));
    }

    let hw = half_width.ok_or(Degeneracy::DepthRange)?;
    Ok(DepthRange {
        min: (rd.depth - hw).max(0.0),
        max: rd.depth + hw,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use patch_mvs_core::{GrayImage, ImagePyramid, PinholeCamera};

    fn camera(center: Point3<f64>) -> PinholeCamera {
        let pyramid = ImagePyramid::build(GrayImage::filled(64, 64, 0), 1).expect("pyramid");
        PinholeCamera::look_at(
            PinholeCamera::intrinsics(100.0, 100.0, 32.0, 32.0),
            center,
            Point3::origin(),
            Vector3::y(),
            pyramid,
        )
        .expect("camera")
    }

    #[test]
    fn ray_depth_reconstructs_center() {
        let rd = RayDepth::between(Point3::new(0.0, 0.0, 5.0), &Point3::new(1.0, 0.0, 1.0))
            .expect("ray");
        assert_relative_eq!(rd.depth, 17f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(rd.point_at(rd.depth), Point3::new(1.0, 0.0, 1.0), epsilon = 1e-12);
        assert!(RayDepth::between(Point3::origin(), &Point3::origin()).is_none());
    }

    #[test]
    fn range_is_centered_on_depth() {
        let cams = vec![camera(Point3::new(0.0, 0.0, 5.0)), camera(Point3::new(2.0, 0.0, 5.0))];
        let visible: BTreeSet<usize> = [0, 1].into();
        let rd = RayDepth::between(cams[0].center(), &Point3::origin()).expect("ray");
        let range = depth_range(&cams, &visible, 0, &rd, &RefineParams::default()).expect("range");
        assert!(range.contains(rd.depth));
        assert_relative_eq!(range.max - rd.depth, rd.depth - range.min, epsilon = 1e-12);
        // Camera 1 sees the reference ray at an angle, so one depth unit spans many pixels.
        assert!(range.half_width() > 0.0 && range.half_width() < 1.0);
    }

    #[test]
    fn lower_bound_is_clamped_at_zero() {
        let cams = vec![camera(Point3::new(0.0, 0.0, 5.0)), camera(Point3::new(0.05, 0.0, 5.0))];
        let visible: BTreeSet<usize> = [0, 1].into();
        let rd = RayDepth::between(cams[0].center(), &Point3::origin()).expect("ray");
        let params = RefineParams {
            cell_size: 50.0,
            ..RefineParams::default()
        };
        let range = depth_range(&cams, &visible, 0, &rd, &params).expect("range");
        assert_eq!(range.min, 0.0);
    }

    #[test]
    fn reference_only_is_degenerate() {
        let cams = vec![camera(Point3::new(0.0, 0.0, 5.0)), camera(Point3::new(2.0, 0.0, 5.0))];
        let visible: BTreeSet<usize> = [0].into();
        let rd = RayDepth::between(cams[0].center(), &Point3::origin()).expect("ray");
        let err = depth_range(&cams, &visible, 0, &rd, &RefineParams::default()).unwrap_err();
        assert_eq!(err, RefineError::GeometricDegeneracy(Degeneracy::DepthRange));
    }
}
