//! Patch refinement for patch-based multi-view stereo.
//!
//! A [`Patch`] is a small oriented plane seen by several calibrated cameras.
//! [`PatchRefiner`] estimates its depth and normal by maximizing the mean
//! pairwise correlation of homography-warped image windows, then prunes
//! cameras that disagree with the consensus view and repeats while the
//! visibility set shrinks.
//!
//! [`Scene`] refines a whole [`PatchSet`], in parallel with the `rayon`
//! feature, and produces a serializable [`RefineReport`].

mod io;
mod patch;
mod patch_set;
mod refiner;
mod scene;

pub use io::{
    CameraConfig, PatchMvsIoError, PatchOutcome, PatchRecord, PatchReport, RefineReport,
    SceneConfig, SceneConfigError, SeedPoint,
};
pub use patch::{DepthRange, Observation, Patch, PatchError, PatchStatus, SphericalNormal};
pub use patch_set::PatchSet;
pub use refiner::{
    correlation_table, depth_range, patch_priority, prune_visibility, sample_columns,
    select_lod, select_reference, window_variance, BoundaryPolicy, CorrelationTable,
    Degeneracy, DiscardReason, Hypothesis, LodSelection, PatchRefiner, PruneDecision, RayDepth,
    RefineError, RefineParams, RefineSummary,
};
pub use scene::Scene;
