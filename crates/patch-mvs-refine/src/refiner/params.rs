use super::RefineError;
use particle_swarm::SwarmParams;
use serde::{Deserialize, Serialize};

/// How samples that map outside a camera's image are treated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryPolicy {
    /// The camera's column is invalid and all its correlations are zero.
    #[default]
    Reject,
    /// Mapped coordinates are clamped to the image border.
    Clamp,
}

/// Configuration for patch refinement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineParams {
    /// Half-size of the square sampling window; the window is `2r + 1` pixels wide.
    pub patch_radius: usize,
    /// Grid cell size in pixels, used to derive the depth search range.
    pub cell_size: f64,
    /// Lower bound on the image-space tolerance used for the depth range.
    pub min_depth_tolerance_px: f64,
    /// Minimum intensity variance (in squared gray levels) of the reference window.
    pub texture_variation: f64,
    /// Cameras correlating with the consensus view below this are pruned.
    pub min_correlation: f64,
    /// A patch seen by fewer cameras is discarded.
    pub min_cameras: usize,
    pub boundary: BoundaryPolicy,
    /// Optimizer budget (`max_iterations`, `population`) and coefficients.
    ///
    /// In batch refinement `swarm.seed` is the base seed; each patch derives
    /// its own seed from it and the patch id.
    pub swarm: SwarmParams,
}

impl Default for RefineParams {
    fn default() -> Self {
        Self {
            patch_radius: 3,
            cell_size: 2.0,
            min_depth_tolerance_px: 5.0,
            texture_variation: 36.0,
            min_correlation: 0.7,
            min_cameras: 3,
            boundary: BoundaryPolicy::Reject,
            swarm: SwarmParams {
                max_iterations: 40,
                population: 16,
                stall_iterations: Some(10),
                ..SwarmParams::default()
            },
        }
    }
}

impl RefineParams {
    /// Side length of the sampling window.
    #[inline]
    pub fn window_size(&self) -> usize {
        2 * self.patch_radius + 1
    }

    /// Number of samples per camera column.
    #[inline]
    pub fn samples_per_window(&self) -> usize {
        self.window_size() * self.window_size()
    }

    pub fn validate(&self) -> Result<(), RefineError> {
        if self.min_cameras < 2 {
            return Err(RefineError::InvalidParams("min_cameras must be at least 2"));
        }
        if !self.cell_size.is_finite() || self.cell_size < 0.0 {
            return Err(RefineError::InvalidParams(
                "cell_size must be finite and non-negative",
            ));
        }
        if !self.min_depth_tolerance_px.is_finite() || self.min_depth_tolerance_px <= 0.0 {
            return Err(RefineError::InvalidParams(
                "min_depth_tolerance_px must be positive",
            ));
        }
        if !self.texture_variation.is_finite() || self.texture_variation < 0.0 {
            return Err(RefineError::InvalidParams(
                "texture_variation must be finite and non-negative",
            ));
        }
        if !(-1.0..=1.0).contains(&self.min_correlation) {
            return Err(RefineError::InvalidParams(
                "min_correlation must lie in [-1, 1]",
            ));
        }
        self.swarm.validate()?;
        Ok(())
    }
}
