use particle_swarm::SwarmError;
use serde::{Deserialize, Serialize};

/// Why a hypothesis (or a whole patch) has no well-defined correlation.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Degeneracy {
    #[error("plane passes through the reference camera center")]
    SingularReferenceFactor,
    #[error("patch center projects behind or outside reference camera {camera}")]
    ReferenceProjection { camera: usize },
    #[error("only {valid} valid sample columns")]
    TooFewValidColumns { valid: usize },
    #[error("no camera gives a usable depth tolerance")]
    DepthRange,
    #[error("patch center coincides with reference camera {camera}")]
    CenterAtReference { camera: usize },
}

/// Errors returned by [`crate::PatchRefiner::refine`].
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RefineError {
    #[error("geometric degeneracy: {0}")]
    GeometricDegeneracy(Degeneracy),
    #[error("no pyramid level reaches texture variance {threshold} (best {best:.3})")]
    InsufficientTexture { threshold: f64, best: f64 },
    #[error("visibility dropped to {remaining} cameras (minimum {minimum})")]
    InsufficientVisibility { remaining: usize, minimum: usize },
    #[error("camera index {camera} out of range ({count} cameras)")]
    UnknownCamera { camera: usize, count: usize },
    #[error("invalid refine parameters: {0}")]
    InvalidParams(&'static str),
    #[error(transparent)]
    Swarm(#[from] SwarmError),
}

impl From<Degeneracy> for RefineError {
    fn from(value: Degeneracy) -> Self {
        Self::GeometricDegeneracy(value)
    }
}

/// Data-dependent reason a patch was discarded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    GeometricDegeneracy,
    InsufficientTexture,
    InsufficientVisibility,
}

impl RefineError {
    /// The discard reason for data-dependent failures; `None` for configuration errors.
    pub fn discard_reason(&self) -> Option<DiscardReason> {
        match self {
            Self::GeometricDegeneracy(_) => Some(DiscardReason::GeometricDegeneracy),
            Self::InsufficientTexture { .. } => Some(DiscardReason::InsufficientTexture),
            Self::InsufficientVisibility { .. } => Some(DiscardReason::InsufficientVisibility),
            Self::UnknownCamera { .. } | Self::InvalidParams(_) | Self::Swarm(_) => None,
        }
    }
}
