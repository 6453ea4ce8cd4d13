//! Oriented surface patches and their refinement state.

use crate::{CorrelationTable, DiscardReason};
use nalgebra::{Point2, Point3, Unit, UnitVector3, Vector3};
use patch_mvs_core::Camera;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::f64::consts::PI;

/// Patch construction errors.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PatchError {
    #[error("a patch needs at least 2 cameras, got {got}")]
    TooFewCameras { got: usize },
    #[error("camera {camera} observed twice")]
    DuplicateCamera { camera: usize },
    #[error("camera index {camera} out of range ({count} cameras)")]
    UnknownCamera { camera: usize, count: usize },
    #[error("viewing directions cancel out; normal is undefined")]
    DegenerateNormal,
    #[error("patch id {id} already in use")]
    DuplicateId { id: u32 },
    #[error("no patch with id {id}")]
    UnknownPatch { id: u32 },
}

/// One camera's observation of a seed point.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub camera: usize,
    /// Level-0 pixel coordinates.
    pub point: [f64; 2],
}

/// Unit normal as polar angle `theta` from +z and azimuth `phi` from +x.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SphericalNormal {
    pub theta: f64,
    pub phi: f64,
}

impl SphericalNormal {
    pub fn new(theta: f64, phi: f64) -> Self {
        Self { theta, phi }
    }

    pub fn from_unit(n: &UnitVector3<f64>) -> Self {
        let theta = n.z.clamp(-1.0, 1.0).acos();
        let phi = n.y.atan2(n.x);
        Self { theta, phi }
    }

    pub fn to_unit(self) -> UnitVector3<f64> {
        let (st, ct) = self.theta.sin_cos();
        let (sp, cp) = self.phi.sin_cos();
        Unit::new_normalize(Vector3::new(st * cp, st * sp, ct))
    }

    /// Optimizer box for `(theta, phi)` around this orientation.
    pub fn search_box(self) -> ([f64; 2], [f64; 2]) {
        ([0.0, self.phi - PI / 2.0], [PI, self.phi + PI / 2.0])
    }
}

/// Closed depth interval along the reference ray.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DepthRange {
    pub min: f64,
    pub max: f64,
}

impl DepthRange {
    /// Degenerate range holding a single depth.
    pub fn point(depth: f64) -> Self {
        Self {
            min: depth,
            max: depth,
        }
    }

    #[inline]
    pub fn contains(&self, depth: f64) -> bool {
        depth >= self.min && depth <= self.max
    }

    #[inline]
    pub fn half_width(&self) -> f64 {
        0.5 * (self.max - self.min)
    }
}

/// Lifecycle state of a patch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum PatchStatus {
    #[default]
    Unrefined,
    Refined,
    Discarded(DiscardReason),
}

/// Oriented surface element seen by a set of cameras.
#[derive(Clone, Debug)]
pub struct Patch {
    pub(crate) id: u32,
    pub(crate) center: Point3<f64>,
    pub(crate) normal: UnitVector3<f64>,
    pub(crate) angles: SphericalNormal,
    pub(crate) ray: UnitVector3<f64>,
    pub(crate) depth: f64,
    pub(crate) depth_range: DepthRange,
    pub(crate) color: [u8; 3],
    pub(crate) visibility: BTreeSet<usize>,
    pub(crate) image_points: BTreeMap<usize, Point2<f64>>,
    pub(crate) reference: usize,
    pub(crate) lod: usize,
    pub(crate) correlation: CorrelationTable,
    pub(crate) fitness: f64,
    pub(crate) priority: f64,
    pub(crate) status: PatchStatus,
}

fn check_cameras(cameras: &BTreeSet<usize>, count: usize) -> Result<(), PatchError> {
    if cameras.len() < 2 {
        return Err(PatchError::TooFewCameras { got: cameras.len() });
    }
    match cameras.iter().find(|&&c| c >= count) {
        Some(&camera) => Err(PatchError::UnknownCamera { camera, count }),
        None => Ok(()),
    }
}

/// Normalized sum of unit vectors from `center` towards each camera.
fn estimated_normal<C: Camera>(
    center: &Point3<f64>,
    visibility: &BTreeSet<usize>,
    cameras: &[C],
) -> Result<UnitVector3<f64>, PatchError> {
    let mut sum = Vector3::zeros();
    for &c in visibility {
        let dir = cameras[c].center() - center;
        let norm = dir.norm();
        if norm < 1e-12 {
            return Err(PatchError::DegenerateNormal);
        }
        sum += dir / norm;
    }
    Unit::try_new(sum, 1e-9).ok_or(PatchError::DegenerateNormal)
}

impl Patch {
    /// Seed patch from raw multi-camera observations.
    ///
    /// The normal points towards the mean viewing direction of the observing
    /// cameras; the initial reference is the lowest observing camera index.
    pub fn from_observations<C: Camera>(
        id: u32,
        center: Point3<f64>,
        color: [u8; 3],
        observations: &[Observation],
        cameras: &[C],
    ) -> Result<Self, PatchError> {
        let mut visibility = BTreeSet::new();
        let mut image_points = BTreeMap::new();
        for obs in observations {
            if !visibility.insert(obs.camera) {
                return Err(PatchError::DuplicateCamera { camera: obs.camera });
            }
            image_points.insert(obs.camera, Point2::new(obs.point[0], obs.point[1]));
        }
        check_cameras(&visibility, cameras.len())?;
        let normal = estimated_normal(&center, &visibility, cameras)?;
        Ok(Self::with_state(id, center, normal, color, visibility, image_points, cameras))
    }

    /// Expansion patch at `center`, inheriting the parent's visibility and normal.
    pub fn expand_from<C: Camera>(
        parent: &Patch,
        center: Point3<f64>,
        id: u32,
        cameras: &[C],
    ) -> Result<Self, PatchError> {
        check_cameras(&parent.visibility, cameras.len())?;
        let image_points = parent
            .visibility
            .iter()
            .filter_map(|&c| cameras[c].project_point(&center).map(|p| (c, p)))
            .collect();
        Ok(Self::with_state(
            id,
            center,
            parent.normal,
            parent.color,
            parent.visibility.clone(),
            image_points,
            cameras,
        ))
    }

    fn with_state<C: Camera>(
        id: u32,
        center: Point3<f64>,
        normal: UnitVector3<f64>,
        color: [u8; 3],
        visibility: BTreeSet<usize>,
        image_points: BTreeMap<usize, Point2<f64>>,
        cameras: &[C],
    ) -> Self {
        // Callers guarantee a non-empty, in-range visibility set.
        let reference = visibility.first().copied().unwrap_or_default();
        let offset = center - cameras[reference].center();
        let depth = offset.norm();
        let ray = Unit::try_new(offset, 1e-12).unwrap_or_else(|| cameras[reference].optical_axis());
        Self {
            id,
            center,
            angles: SphericalNormal::from_unit(&normal),
            normal,
            ray,
            depth,
            depth_range: DepthRange::point(depth),
            color,
            visibility,
            image_points,
            reference,
            lod: 0,
            correlation: CorrelationTable::default(),
            fitness: 0.0,
            priority: f64::INFINITY,
            status: PatchStatus::Unrefined,
        }
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn center(&self) -> Point3<f64> {
        self.center
    }

    pub fn normal(&self) -> UnitVector3<f64> {
        self.normal
    }

    pub fn spherical_normal(&self) -> SphericalNormal {
        self.angles
    }

    /// Unit ray from the reference camera center towards the patch.
    pub fn ray(&self) -> UnitVector3<f64> {
        self.ray
    }

    pub fn depth(&self) -> f64 {
        self.depth
    }

    pub fn depth_range(&self) -> DepthRange {
        self.depth_range
    }

    pub fn color(&self) -> [u8; 3] {
        self.color
    }

    /// Visible cameras in ascending index order.
    pub fn visibility(&self) -> &BTreeSet<usize> {
        &self.visibility
    }

    pub fn camera_count(&self) -> usize {
        self.visibility.len()
    }

    /// Level-0 image point per visible camera.
    pub fn image_points(&self) -> &BTreeMap<usize, Point2<f64>> {
        &self.image_points
    }

    pub fn reference_camera(&self) -> usize {
        self.reference
    }

    pub fn lod(&self) -> usize {
        self.lod
    }

    pub fn correlation(&self) -> &CorrelationTable {
        &self.correlation
    }

    /// Best optimizer score (negated mean pairwise correlation).
    pub fn fitness(&self) -> f64 {
        self.fitness
    }

    /// Lower is better; `+inf` until the patch has been refined.
    pub fn priority(&self) -> f64 {
        self.priority
    }

    pub fn status(&self) -> PatchStatus {
        self.status
    }

    pub fn is_discarded(&self) -> bool {
        matches!(self.status, PatchStatus::Discarded(_))
    }

    pub(crate) fn set_normal(&mut self, angles: SphericalNormal) {
        self.angles = angles;
        self.normal = angles.to_unit();
    }

    pub(crate) fn retain_cameras(&mut self, keep: &BTreeSet<usize>) {
        self.visibility.retain(|c| keep.contains(c));
        self.image_points.retain(|c, _| keep.contains(c));
        self.correlation = self.correlation.restricted(keep);
    }
}
