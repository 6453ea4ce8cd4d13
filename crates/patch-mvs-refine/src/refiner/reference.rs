use nalgebra::UnitVector3;
use patch_mvs_core::Camera;
use std::collections::BTreeSet;

/// Visible camera looking most directly at the patch.
///
/// Maximizes `normal · (−optical_axis)`; ties keep the lowest camera index.
pub fn select_reference<C: Camera>(
    cameras: &[C],
    visibility: &BTreeSet<usize>,
    normal: &UnitVector3<f64>,
) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for &c in visibility {
        let cam = cameras.get(c)?;
        let score = normal.dot(&-cam.optical_axis().into_inner());
        if best.is_none_or(|(_, s)| score > s) {
            best = Some((c, score));
        }
    }
    best.map(|(c, _)| c)
}
