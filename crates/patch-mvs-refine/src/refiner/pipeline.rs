use super::correlation::{correlation_table, CorrelationTable, Hypothesis};
use super::depth::{depth_range, RayDepth};
use super::lod::select_lod;
use super::pruning::prune_visibility;
use super::reference::select_reference;
use super::{Degeneracy, RefineError, RefineParams, RefineSummary};
use crate::{DepthRange, Patch, PatchStatus, SphericalNormal};
use log::{debug, info, warn};
use particle_swarm::{Bounds, ParticleSwarm, SwarmParams};
use patch_mvs_core::Camera;
use std::collections::BTreeSet;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// `(1 − c̄) · (1 + fitness)` with both factors clamped to `[0, 2]`; lower is better.
pub fn patch_priority(mean_correlation: f64, fitness: f64) -> f64 {
    let disagreement = (1.0 - mean_correlation).clamp(0.0, 2.0);
    let residual = (1.0 + fitness).clamp(0.0, 2.0);
    disagreement * residual
}

/// Everything one optimize round decides, applied to the patch afterwards.
#[derive(Debug)]
struct Round {
    reference: usize,
    ray_depth: RayDepth,
    range: DepthRange,
    lod: usize,
    angles: SphericalNormal,
    fitness: f64,
    table: CorrelationTable,
    iterations: usize,
    evaluations: usize,
}

impl Round {
    fn apply(self, patch: &mut Patch) {
        patch.reference = self.reference;
        patch.ray = self.ray_depth.ray;
        patch.depth = self.ray_depth.depth;
        patch.center = self.ray_depth.point_at(self.ray_depth.depth);
        patch.depth_range = self.range;
        patch.lod = self.lod;
        patch.set_normal(self.angles);
        patch.fitness = self.fitness;
        patch.correlation = self.table;
    }
}

/// Refines single patches against a fixed camera set.
///
/// Each round selects the reference view, derives the depth range and LOD,
/// searches `(theta, phi, depth)` with a particle swarm maximizing mean
/// pairwise correlation, then prunes inconsistent cameras. Rounds repeat
/// while pruning shrinks the visibility set without dropping it below
/// `min_cameras`, so at most `initial − min_cameras + 1` rounds run.
pub struct PatchRefiner<'a, C> {
    cameras: &'a [C],
    params: RefineParams,
}

impl<'a, C: Camera> PatchRefiner<'a, C> {
    pub fn new(cameras: &'a [C], params: RefineParams) -> Result<Self, RefineError> {
        params.validate()?;
        Ok(Self { cameras, params })
    }

    pub(crate) fn from_validated(cameras: &'a [C], params: RefineParams) -> Self {
        Self { cameras, params }
    }

    #[inline]
    pub fn params(&self) -> &RefineParams {
        &self.params
    }

    #[inline]
    pub fn cameras(&self) -> &'a [C] {
        self.cameras
    }

    /// Refine `patch` in place using the optimizer seed from the parameters.
    pub fn refine(&self, patch: &mut Patch) -> Result<RefineSummary, RefineError> {
        self.refine_seeded(patch, self.params.swarm.seed)
    }

    /// Refine `patch` in place with an explicit optimizer seed.
    ///
    /// On a data-dependent failure the patch is marked discarded and keeps
    /// the state of its last adopted hypothesis.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, patch), fields(id = patch.id()))
    )]
    pub fn refine_seeded(
        &self,
        patch: &mut Patch,
        seed: Option<u64>,
    ) -> Result<RefineSummary, RefineError> {
        match self.run(patch, seed) {
            Ok(summary) => {
                info!(
                    "patch {}: LOD {}, {} iterations, fitness {:.3}, priority {:.3}, {} cameras",
                    patch.id,
                    summary.lod,
                    summary.iterations,
                    summary.fitness,
                    summary.priority,
                    patch.visibility.len()
                );
                Ok(summary)
            }
            Err(err) => {
                if let Some(reason) = err.discard_reason() {
                    patch.status = PatchStatus::Discarded(reason);
                    warn!("patch {} discarded: {}", patch.id, err);
                }
                Err(err)
            }
        }
    }

    fn run(&self, patch: &mut Patch, seed: Option<u64>) -> Result<RefineSummary, RefineError> {
        let count = self.cameras.len();
        if let Some(&camera) = patch.visibility.iter().find(|&&c| c >= count) {
            return Err(RefineError::UnknownCamera { camera, count });
        }
        let minimum = self.params.min_cameras;
        let initial = patch.visibility.len();
        if initial < minimum {
            return Err(RefineError::InsufficientVisibility {
                remaining: initial,
                minimum,
            });
        }
        let max_rounds = initial - minimum + 1;

        let mut rounds = 0;
        let mut evaluations = 0;
        let mut removed_cameras = Vec::new();
        loop {
            rounds += 1;
            debug_assert!(rounds <= max_rounds);

            let round = self.optimize_round(patch, seed)?;
            let iterations = round.iterations;
            evaluations += round.evaluations;
            round.apply(patch);

            let removed = prune_visibility(&patch.correlation, self.params.min_correlation)
                .map(|d| d.removed)
                .unwrap_or_default();
            if removed.is_empty() {
                let mean = patch.correlation.mean_pairwise();
                patch.priority = patch_priority(mean, patch.fitness);
                patch.status = PatchStatus::Refined;
                self.refresh_image_points(patch);
                return Ok(RefineSummary {
                    rounds,
                    lod: patch.lod,
                    reference_camera: patch.reference,
                    iterations,
                    evaluations,
                    fitness: patch.fitness,
                    priority: patch.priority,
                    removed_cameras,
                });
            }

            let remaining = patch.visibility.len() - removed.len();
            debug!(
                "patch {} round {}: pruning {:?}, {} cameras remain",
                patch.id, rounds, removed, remaining
            );
            if remaining < minimum {
                return Err(RefineError::InsufficientVisibility { remaining, minimum });
            }
            let keep: BTreeSet<usize> = patch
                .visibility
                .iter()
                .copied()
                .filter(|c| !removed.contains(c))
                .collect();
            patch.retain_cameras(&keep);
            removed_cameras.extend(removed);
        }
    }

    fn optimize_round(&self, patch: &Patch, seed: Option<u64>) -> Result<Round, RefineError> {
        let params = &self.params;
        let cameras = self.cameras;

        let reference = select_reference(cameras, &patch.visibility, &patch.normal).ok_or(
            RefineError::InsufficientVisibility {
                remaining: patch.visibility.len(),
                minimum: params.min_cameras,
            },
        )?;
        let ref_cam = &cameras[reference];
        let start = RayDepth::between(ref_cam.center(), &patch.center)
            .ok_or(Degeneracy::CenterAtReference { camera: reference })?;
        let range = depth_range(cameras, &patch.visibility, reference, &start, params)?;
        let lod = select_lod(ref_cam, reference, &patch.center, params)?;
        debug!(
            "patch {}: reference {}, depth {:.4} in [{:.4}, {:.4}], LOD {}",
            patch.id, reference, start.depth, range.min, range.max, lod.level
        );

        let visibility: Vec<usize> = patch.visibility.iter().copied().collect();
        let objective = |x: &[f64]| -> f64 {
            let hypothesis = Hypothesis {
                center: start.point_at(x[2]),
                normal: SphericalNormal::new(x[0], x[1]).to_unit(),
            };
            match correlation_table(cameras, &visibility, reference, &hypothesis, lod.level, params)
            {
                Ok(table) => -table.mean_pairwise(),
                Err(_) => f64::INFINITY,
            }
        };

        let (lower, upper) = patch.angles.search_box();
        let bounds = Bounds::new(
            vec![lower[0], lower[1], range.min],
            vec![upper[0], upper[1], range.max],
        )?;
        let swarm_params = SwarmParams {
            seed,
            ..params.swarm.clone()
        };
        let mut swarm = ParticleSwarm::new(bounds, objective, swarm_params)?;
        swarm.seed(&[patch.angles.theta, patch.angles.phi, start.depth])?;
        let result = swarm.run(false);

        let angles = SphericalNormal::new(result.best[0], result.best[1]);
        let ray_depth = RayDepth {
            depth: result.best[2],
            ..start
        };
        let hypothesis = Hypothesis {
            center: ray_depth.point_at(ray_depth.depth),
            normal: angles.to_unit(),
        };
        let (table, lod_level) = self.adopted_table(&visibility, reference, &hypothesis, lod.level)?;
        // Only infinite when every hypothesis failed at the selected LOD.
        let fitness = if result.score.is_finite() {
            result.score
        } else {
            -table.mean_pairwise()
        };

        Ok(Round {
            reference,
            ray_depth,
            range,
            lod: lod_level,
            angles,
            fitness,
            table,
            iterations: result.iterations,
            evaluations: result.evaluations,
        })
    }

    /// Correlation table at the adopted hypothesis, falling back to coarser levels.
    fn adopted_table(
        &self,
        visibility: &[usize],
        reference: usize,
        hypothesis: &Hypothesis,
        lod: usize,
    ) -> Result<(CorrelationTable, usize), RefineError> {
        let levels = self.cameras[reference].pyramid().num_levels();
        let mut last = RefineError::GeometricDegeneracy(Degeneracy::TooFewValidColumns { valid: 0 });
        for level in lod..levels.max(lod + 1) {
            match correlation_table(self.cameras, visibility, reference, hypothesis, level, &self.params)
            {
                Ok(table) => return Ok((table, level)),
                Err(err @ RefineError::GeometricDegeneracy(_)) => {
                    debug!("correlation table at LOD {level} failed: {err}");
                    last = err;
                }
                Err(err) => return Err(err),
            }
        }
        Err(last)
    }

    fn refresh_image_points(&self, patch: &mut Patch) {
        let center = patch.center;
        let points = patch
            .visibility
            .iter()
            .filter_map(|&c| self.cameras[c].project_point(&center).map(|p| (c, p)))
            .collect();
        patch.image_points = points;
    }
}
