use serde::{Deserialize, Serialize};

/// Statistics of a successful refinement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RefineSummary {
    /// Optimize-and-prune rounds run.
    pub rounds: usize,
    pub lod: usize,
    pub reference_camera: usize,
    /// Optimizer iterations of the last round.
    pub iterations: usize,
    /// Objective evaluations over all rounds.
    pub evaluations: usize,
    pub fitness: f64,
    pub priority: f64,
    /// Cameras pruned during this refinement, in removal order.
    pub removed_cameras: Vec<usize>,
}
