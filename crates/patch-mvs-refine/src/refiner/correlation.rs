//! Homography-warped multi-view correlation.
//!
//! For a hypothesis `(center, normal)` a `w × w` window around the patch
//! projection in the reference image is mapped into every visible camera
//! through the plane-induced homography. Samples are taken at the patch LOD:
//! window offsets are one level-`L` pixel apart (`2^L` level-0 pixels) and the
//! mapped level-0 coordinates are divided by `2^L` before bilinear lookup
//! (or by the scale of the camera's coarsest level, if it has fewer levels).
//! Each camera's sample column is L2-normalized without mean removal, so the
//! correlation of two cameras is the dot product of their columns.

use super::{BoundaryPolicy, Degeneracy, RefineError, RefineParams};
use nalgebra::{Point2, Point3, UnitVector3};
use patch_mvs_core::{
    homography_from_parts, level_scale, sample_bilinear_checked, sample_bilinear_clamped, Camera,
    Homography, Plane,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[cfg(feature = "rayon")]
use rayon::prelude::*;
#[cfg(feature = "tracing")]
use tracing::instrument;

/// Columns with a smaller L2 norm carry no usable signal.
const MIN_COLUMN_NORM: f64 = 1e-9;

/// A candidate patch plane.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hypothesis {
    pub center: Point3<f64>,
    pub normal: UnitVector3<f64>,
}

/// Symmetric camera × camera correlation matrix with zero diagonal.
///
/// Rows are ordered like the patch's visibility set. A camera whose window
/// could not be sampled is marked invalid; all its correlations are zero.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrelationTable {
    cameras: Vec<usize>,
    valid: Vec<bool>,
    values: Vec<f64>,
}

impl CorrelationTable {
    /// Build the table from per-camera normalized columns.
    pub fn from_columns(cameras: Vec<usize>, columns: &[Option<Vec<f64>>]) -> Self {
        let n = cameras.len();
        debug_assert_eq!(n, columns.len());
        let mut values = vec![0.0; n * n];
        for i in 0..n {
            let Some(a) = &columns[i] else { continue };
            for j in (i + 1)..n {
                let Some(b) = &columns[j] else { continue };
                let c: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                values[i * n + j] = c;
                values[j * n + i] = c;
            }
        }
        Self {
            cameras,
            valid: columns.iter().map(Option::is_some).collect(),
            values,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }

    /// Camera index of each row.
    pub fn cameras(&self) -> &[usize] {
        &self.cameras
    }

    /// Row of `camera`, if it is part of the table.
    pub fn index_of(&self, camera: usize) -> Option<usize> {
        self.cameras.iter().position(|&c| c == camera)
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.len() + j]
    }

    pub fn row(&self, i: usize) -> &[f64] {
        let n = self.len();
        &self.values[i * n..(i + 1) * n]
    }

    pub fn row_sum(&self, i: usize) -> f64 {
        self.row(i).iter().sum()
    }

    pub fn is_valid(&self, i: usize) -> bool {
        self.valid[i]
    }

    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|v| **v).count()
    }

    /// Sub-table of the rows whose camera is in `keep`, in the same order.
    pub fn restricted(&self, keep: &BTreeSet<usize>) -> Self {
        let rows: Vec<usize> = (0..self.len())
            .filter(|&i| keep.contains(&self.cameras[i]))
            .collect();
        let mut values = Vec::with_capacity(rows.len() * rows.len());
        for &i in &rows {
            values.extend(rows.iter().map(|&j| self.get(i, j)));
        }
        Self {
            cameras: rows.iter().map(|&i| self.cameras[i]).collect(),
            valid: rows.iter().map(|&i| self.valid[i]).collect(),
            values,
        }
    }

    /// Mean over all unordered camera pairs; invalid cameras count as zero.
    pub fn mean_pairwise(&self) -> f64 {
        let n = self.len();
        if n < 2 {
            return 0.0;
        }
        let mut sum = 0.0;
        for i in 0..n {
            for j in (i + 1)..n {
                sum += self.get(i, j);
            }
        }
        sum / (n * (n - 1) / 2) as f64
    }
}

fn normalize(mut samples: Vec<f64>) -> Option<Vec<f64>> {
    let norm = samples.iter().map(|v| v * v).sum::<f64>().sqrt();
    if !norm.is_finite() || norm < MIN_COLUMN_NORM {
        return None;
    }
    samples.iter_mut().for_each(|v| *v /= norm);
    Some(samples)
}

/// Sample one camera's window through `h` and L2-normalize it.
fn sample_column<C: Camera + ?Sized>(
    camera: &C,
    h: &Homography,
    anchor: Point2<f64>,
    lod: usize,
    radius: usize,
    policy: BoundaryPolicy,
) -> Option<Vec<f64>> {
    // Cameras with a shallower pyramid sample their coarsest level instead.
    let level = lod.min(camera.pyramid().num_levels().saturating_sub(1));
    let view = camera.pyramid().level(level)?;
    let scale = level_scale(level);
    // Window offsets are one LOD pixel apart (2^lod level-0 pixels, not one
    // level-0 pixel) whatever level is read, so every camera covers the same
    // footprint on the plane.
    let step = 1.0 / level_scale(lod);
    let r = radius as i64;
    let mut samples = Vec::with_capacity((2 * radius + 1) * (2 * radius + 1));
    for dy in -r..=r {
        for dx in -r..=r {
            let q = Point2::new(anchor.x + dx as f64 * step, anchor.y + dy as f64 * step);
            let m = h.apply(q)?;
            let (x, y) = (m.x * scale, m.y * scale);
            let v = match policy {
                BoundaryPolicy::Reject => sample_bilinear_checked(&view, x, y)?,
                BoundaryPolicy::Clamp => sample_bilinear_clamped(&view, x, y)?,
            };
            samples.push(v);
        }
    }
    normalize(samples)
}

/// Normalized sample columns for every camera in `visibility`.
///
/// `None` marks a camera whose window is unusable (behind the plane horizon,
/// outside the image under [`BoundaryPolicy::Reject`], or textureless black).
/// A camera whose pyramid stops above `lod` is read at its coarsest level.
pub fn sample_columns<C: Camera>(
    cameras: &[C],
    visibility: &[usize],
    reference: usize,
    hypothesis: &Hypothesis,
    lod: usize,
    params: &RefineParams,
) -> Result<Vec<Option<Vec<f64>>>, RefineError> {
    let count = cameras.len();
    if let Some(&camera) = visibility.iter().chain([&reference]).find(|&&c| c >= count) {
        return Err(RefineError::UnknownCamera { camera, count });
    }
    let ref_cam = &cameras[reference];
    let plane = Plane::from_point_normal(&hypothesis.center, &hypothesis.normal.into_inner())
        .ok_or(Degeneracy::SingularReferenceFactor)?;
    let ref_parts = ref_cam.projection();
    homography_from_parts(&ref_parts, &ref_parts, &plane)
        .ok_or(Degeneracy::SingularReferenceFactor)?;
    let anchor = ref_cam
        .project_point(&hypothesis.center)
        .ok_or(Degeneracy::ReferenceProjection { camera: reference })?;

    let radius = params.patch_radius;
    let policy = params.boundary;
    let column = |&c: &usize| -> Option<Vec<f64>> {
        let cam = &cameras[c];
        // Cameras that see the center from behind cannot observe the patch.
        cam.project_point(&hypothesis.center)?;
        let h = homography_from_parts(&ref_parts, &cam.projection(), &plane)?;
        sample_column(cam, &h, anchor, lod, radius, policy)
    };

    #[cfg(feature = "rayon")]
    let columns = visibility.par_iter().map(column).collect();
    #[cfg(not(feature = "rayon"))]
    let columns = visibility.iter().map(column).collect();

    Ok(columns)
}

/// Full correlation table for `hypothesis` at pyramid level `lod`.
///
/// Fails with [`Degeneracy::TooFewValidColumns`] when fewer than two cameras
/// produce a usable column.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "trace", skip(cameras, params), fields(views = visibility.len()))
)]
pub fn correlation_table<C: Camera>(
    cameras: &[C],
    visibility: &[usize],
    reference: usize,
    hypothesis: &Hypothesis,
    lod: usize,
    params: &RefineParams,
) -> Result<CorrelationTable, RefineError> {
    let columns = sample_columns(cameras, visibility, reference, hypothesis, lod, params)?;
    let valid = columns.iter().filter(|c| c.is_some()).count();
    if valid < 2 {
        return Err(Degeneracy::TooFewValidColumns { valid }.into());
    }
    Ok(CorrelationTable::from_columns(visibility.to_vec(), &columns))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Unit, Vector3};
    use patch_mvs_core::{GrayImage, ImagePyramid, PinholeCamera};

    fn textured() -> GrayImage {
        GrayImage::from_fn(64, 64, |x, y| ((x * 37 + y * 11) % 200 + 20) as u8)
    }

    fn camera(center: Point3<f64>, image: GrayImage) -> PinholeCamera {
        let pyramid = ImagePyramid::build(image, 2).expect("pyramid");
        PinholeCamera::look_at(
            PinholeCamera::intrinsics(80.0, 80.0, 31.5, 31.5),
            center,
            Point3::origin(),
            Vector3::y(),
            pyramid,
        )
        .expect("camera")
    }

    fn facing_z() -> Hypothesis {
        Hypothesis {
            center: Point3::origin(),
            normal: Unit::new_normalize(Vector3::z()),
        }
    }

    #[test]
    fn identical_views_correlate_perfectly() {
        let cams = vec![
            camera(Point3::new(0.0, 0.0, 4.0), textured()),
            camera(Point3::new(0.0, 0.0, 4.0), textured()),
            camera(Point3::new(0.0, 0.0, 4.0), textured()),
        ];
        let params = RefineParams::default();
        let table = correlation_table(&cams, &[0, 1, 2], 0, &facing_z(), 0, &params).expect("table");
        assert_eq!(table.len(), 3);
        for i in 0..3 {
            assert_eq!(table.get(i, i), 0.0);
            for j in 0..3 {
                assert_eq!(table.get(i, j), table.get(j, i));
                if i != j {
                    assert_relative_eq!(table.get(i, j), 1.0, epsilon = 1e-9);
                }
            }
        }
        assert_relative_eq!(table.mean_pairwise(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(table.row_sum(1), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn black_camera_is_an_invalid_column() {
        let cams = vec![
            camera(Point3::new(0.0, 0.0, 4.0), textured()),
            camera(Point3::new(0.0, 0.0, 4.0), textured()),
            camera(Point3::new(0.0, 0.0, 4.0), GrayImage::filled(64, 64, 0)),
        ];
        let params = RefineParams::default();
        let table = correlation_table(&cams, &[0, 1, 2], 0, &facing_z(), 1, &params).expect("table");
        assert!(table.is_valid(0) && table.is_valid(1));
        assert!(!table.is_valid(2));
        assert_eq!(table.valid_count(), 2);
        assert_eq!(table.get(0, 2), 0.0);
        assert_relative_eq!(table.mean_pairwise(), 1.0 / 3.0, epsilon = 1e-9);
    }

    #[test]
    fn single_valid_column_is_degenerate() {
        let cams = vec![
            camera(Point3::new(0.0, 0.0, 4.0), textured()),
            camera(Point3::new(0.0, 0.0, 4.0), GrayImage::filled(64, 64, 0)),
        ];
        let err = correlation_table(&cams, &[0, 1], 0, &facing_z(), 0, &RefineParams::default())
            .unwrap_err();
        assert_eq!(
            err,
            RefineError::GeometricDegeneracy(Degeneracy::TooFewValidColumns { valid: 1 })
        );
    }

    #[test]
    fn plane_through_reference_center_is_degenerate() {
        let cams = vec![
            camera(Point3::new(0.0, 0.0, 4.0), textured()),
            camera(Point3::new(1.0, 0.0, 4.0), textured()),
        ];
        // The plane x = 0 contains the reference center (0, 0, 4).
        let edge_on = Hypothesis {
            center: Point3::origin(),
            normal: Unit::new_normalize(Vector3::x()),
        };
        let err = correlation_table(&cams, &[0, 1], 0, &edge_on, 0, &RefineParams::default())
            .unwrap_err();
        assert_eq!(
            err,
            RefineError::GeometricDegeneracy(Degeneracy::SingularReferenceFactor)
        );
    }

    #[test]
    fn clamp_policy_keeps_border_windows() {
        let cams = vec![
            camera(Point3::new(0.0, 0.0, 4.0), textured()),
            camera(Point3::new(0.0, 0.0, 4.0), textured()),
        ];
        // Projects to about 1.5 px from the left border: the 7x7 window leaves the image.
        let near_edge = Hypothesis {
            center: Point3::new(-1.5, 0.0, 0.0),
            normal: Unit::new_normalize(Vector3::z()),
        };
        let reject = RefineParams::default();
        assert!(correlation_table(&cams, &[0, 1], 0, &near_edge, 0, &reject).is_err());
        let clamp = RefineParams {
            boundary: BoundaryPolicy::Clamp,
            ..RefineParams::default()
        };
        let table = correlation_table(&cams, &[0, 1], 0, &near_edge, 0, &clamp).expect("clamped");
        assert_eq!(table.valid_count(), 2);
    }

    #[test]
    fn shallow_pyramid_falls_back_to_its_coarsest_level() {
        let ramp = || GrayImage::from_fn(64, 64, |x, y| (20 + 2 * x + y) as u8);
        let shallow = ImagePyramid::build(ramp(), 1).expect("pyramid");
        let cams = vec![
            camera(Point3::new(0.0, 0.0, 4.0), ramp()),
            camera(Point3::new(0.0, 0.0, 4.0), ramp()).with_pyramid(shallow),
        ];
        assert_eq!(cams[1].pyramid().num_levels(), 1);
        let table = correlation_table(&cams, &[0, 1], 0, &facing_z(), 1, &RefineParams::default())
            .expect("table");
        assert_eq!(table.valid_count(), 2);
        assert!(table.get(0, 1) > 0.99, "ncc {}", table.get(0, 1));
    }

    #[test]
    fn restricted_table_drops_rows_and_columns() {
        let columns = vec![
            Some(vec![1.0, 0.0]),
            Some(vec![0.6, 0.8]),
            None,
            Some(vec![0.0, 1.0]),
        ];
        let table = CorrelationTable::from_columns(vec![2, 4, 5, 7], &columns);
        let sub = table.restricted(&BTreeSet::from([2, 5, 7]));
        assert_eq!(sub.cameras(), &[2, 5, 7]);
        assert_eq!(sub.index_of(4), None);
        assert!(sub.is_valid(0) && !sub.is_valid(1) && sub.is_valid(2));
        assert_eq!(sub.get(0, 2), table.get(0, 3));
        assert_eq!(sub.get(2, 0), 0.0);
        assert_eq!(sub.get(0, 1), 0.0);
        assert_relative_eq!(table.get(0, 1), 0.6, epsilon = 1e-12);
        assert_relative_eq!(table.get(1, 3), 0.8, epsilon = 1e-12);
        assert!(table.restricted(&BTreeSet::new()).is_empty());
    }

    #[test]
    fn unknown_camera_is_reported() {
        let cams = vec![camera(Point3::new(0.0, 0.0, 4.0), textured())];
        let err = correlation_table(&cams, &[0, 3], 0, &facing_z(), 0, &RefineParams::default())
            .unwrap_err();
        assert_eq!(err, RefineError::UnknownCamera { camera: 3, count: 1 });
    }
}
