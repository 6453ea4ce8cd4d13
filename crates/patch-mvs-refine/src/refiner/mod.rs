//! Patch refinement pipeline.
//!
//! This module wires together reference-view selection, depth-range
//! derivation, level-of-detail selection, swarm optimization of the patch
//! plane, homography correlation and visibility pruning.

mod correlation;
mod depth;
mod error;
mod lod;
mod params;
mod pipeline;
mod pruning;
mod reference;
mod result;

pub use correlation::{correlation_table, sample_columns, CorrelationTable, Hypothesis};
pub use depth::{depth_range, RayDepth};
pub use error::{Degeneracy, DiscardReason, RefineError};
pub use lod::{select_lod, window_variance, LodSelection};
pub use params::{BoundaryPolicy, RefineParams};
pub use pipeline::{patch_priority, PatchRefiner};
pub use pruning::{prune_visibility, PruneDecision};
pub use reference::select_reference;
pub use result::RefineSummary;
