use crate::io::{PatchOutcome, PatchRecord, PatchReport, RefineReport, SeedPoint};
use crate::{
    Patch, PatchError, PatchRefiner, PatchSet, PatchStatus, RefineError, RefineParams,
    RefineSummary,
};
use log::{info, warn};
use nalgebra::Point3;
use patch_mvs_core::Camera;

#[cfg(feature = "rayon")]
use rayon::prelude::*;
#[cfg(feature = "tracing")]
use tracing::instrument;

/// Calibrated cameras plus validated refinement parameters.
///
/// Cameras and parameters are read-only during refinement, so independent
/// patches can be refined concurrently.
#[derive(Debug)]
pub struct Scene<C> {
    cameras: Vec<C>,
    params: RefineParams,
}

impl<C: Camera> Scene<C> {
    pub fn new(cameras: Vec<C>, params: RefineParams) -> Result<Self, RefineError> {
        params.validate()?;
        Ok(Self { cameras, params })
    }

    pub fn cameras(&self) -> &[C] {
        &self.cameras
    }

    pub fn params(&self) -> &RefineParams {
        &self.params
    }

    pub fn refiner(&self) -> PatchRefiner<'_, C> {
        PatchRefiner::from_validated(&self.cameras, self.params.clone())
    }

    /// Optimizer seed for patch `id`, derived from the base seed.
    pub fn patch_seed(&self, id: u32) -> Option<u64> {
        self.params
            .swarm
            .seed
            .map(|base| base.wrapping_add(u64::from(id)))
    }

    /// Build seed patches from observations, allocating ids in order.
    pub fn seed_patches(&self, seeds: &[SeedPoint]) -> Result<PatchSet, PatchError> {
        let mut set = PatchSet::new();
        for seed in seeds {
            let [x, y, z] = seed.center;
            set.add_seed(Point3::new(x, y, z), seed.color, &seed.observations, &self.cameras)?;
        }
        Ok(set)
    }

    pub fn refine_patch(&self, patch: &mut Patch) -> Result<RefineSummary, RefineError> {
        self.refiner().refine_seeded(patch, self.patch_seed(patch.id()))
    }

    /// Refine every patch that has not been discarded yet.
    ///
    /// A failing patch never aborts the batch; its outcome is recorded in the
    /// report and the patch is marked discarded when the failure is
    /// data-dependent.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(patches = patches.len()))
    )]
    pub fn refine_all(&self, patches: &mut PatchSet) -> RefineReport {
        let refiner = self.refiner();
        let work = |(&id, patch): (&u32, &mut Patch)| -> PatchReport {
            let outcome = match patch.status() {
                PatchStatus::Discarded(reason) => PatchOutcome::Skipped { reason },
                _ => match refiner.refine_seeded(patch, self.patch_seed(id)) {
                    Ok(summary) => PatchOutcome::Refined { summary },
                    Err(err) => match err.discard_reason() {
                        Some(reason) => PatchOutcome::Discarded {
                            reason,
                            message: err.to_string(),
                        },
                        None => {
                            warn!("patch {id} failed: {err}");
                            PatchOutcome::Failed {
                                message: err.to_string(),
                            }
                        }
                    },
                },
            };
            PatchReport {
                id,
                outcome,
                patch: PatchRecord::from(&*patch),
            }
        };

        #[cfg(feature = "rayon")]
        let mut entries: Vec<PatchReport> =
            patches.patches_mut().par_iter_mut().map(work).collect();
        #[cfg(not(feature = "rayon"))]
        let mut entries: Vec<PatchReport> = patches.patches_mut().iter_mut().map(work).collect();
        entries.sort_by_key(|e| e.id);

        let report = RefineReport {
            params: self.params.clone(),
            patches: entries,
        };
        info!(
            "refined {} patches: {} kept, {} discarded, {} failed",
            report.patches.len(),
            report.refined_count(),
            report.discarded_count(),
            report.failed_count()
        );
        report
    }
}
