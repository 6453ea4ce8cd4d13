use crate::CorrelationTable;

/// Outcome of one pruning pass.
#[derive(Clone, Debug, PartialEq)]
pub struct PruneDecision {
    /// Camera with the largest correlation row sum.
    pub consensus: usize,
    /// Cameras to drop, in table order.
    pub removed: Vec<usize>,
}

impl PruneDecision {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty()
    }
}

/// Drop every camera whose correlation with the consensus view is below `min_correlation`.
///
/// All removals are decided against the same table; the consensus camera is
/// never removed. Returns `None` for an empty table.
pub fn prune_visibility(table: &CorrelationTable, min_correlation: f64) -> Option<PruneDecision> {
    let n = table.len();
    let mut consensus = None;
    let mut max_sum = f64::NEG_INFINITY;
    for i in 0..n {
        let sum = table.row_sum(i);
        if sum > max_sum {
            max_sum = sum;
            consensus = Some(i);
        }
    }
    let k = consensus?;
    let removed = (0..n)
        .filter(|&i| i != k && table.get(k, i) < min_correlation)
        .map(|i| table.cameras()[i])
        .collect();
    Some(PruneDecision {
        consensus: table.cameras()[k],
        removed,
    })
}
