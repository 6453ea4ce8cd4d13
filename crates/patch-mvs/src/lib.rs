//! High-level facade crate for the `patch-mvs` workspace.
//!
//! This crate provides:
//! - stable, convenient re-exports of the underlying crates
//! - end-to-end helpers that turn a JSON [`SceneConfig`] plus one grayscale
//!   image per camera into a written [`RefineReport`].
//!
//! ## Quickstart
//!
//! ```no_run
//! use patch_mvs::pipeline;
//! use patch_mvs::SceneConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SceneConfig::load_json("scene.json")?;
//! # let frames: Vec<(usize, usize, Vec<u8>)> = Vec::new();
//! let pyramids = frames
//!     .iter()
//!     .map(|(w, h, pixels)| pipeline::pyramid_from_gray_u8(*w, *h, pixels, 4))
//!     .collect::<Result<Vec<_>, _>>()?;
//! let report = pipeline::refine_scene_to_file(&config, pyramids)?;
//! println!("refined {} of {}", report.refined_count(), report.patches.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `patch_mvs::core`: cameras, image pyramids, plane homographies, logging.
//! - `patch_mvs::swarm`: the bounded particle swarm minimizer.
//! - `patch_mvs::refine`: patches, correlation, LOD selection, pruning, batches.
//! - `patch_mvs::pipeline`: config + images to report.

pub use patch_mvs_core as core;
pub use patch_mvs_refine as refine;
pub use particle_swarm as swarm;

pub use patch_mvs_core::{Camera, ImagePyramid, PinholeCamera};
pub use patch_mvs_refine::{
    Patch, PatchRefiner, PatchSet, RefineParams, RefineReport, SceneConfig, Scene,
};

pub mod pipeline;
