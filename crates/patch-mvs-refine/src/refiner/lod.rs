use super::{Degeneracy, RefineError, RefineParams};
use nalgebra::{Point2, Point3};
use patch_mvs_core::{Camera, GrayImageView};

/// Pyramid level chosen for sampling a patch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LodSelection {
    pub level: usize,
    /// Window variance at `level`; `None` when the window could not be sampled there.
    pub variance: Option<f64>,
}

/// Population variance of the `(2r+1)²` integer pixels around the rounded `center`.
///
/// `None` if any pixel of the window lies outside the image.
pub fn window_variance(view: &GrayImageView<'_>, center: Point2<f64>, radius: usize) -> Option<f64> {
    let cx = center.x.round() as i64;
    let cy = center.y.round() as i64;
    let r = radius as i64;
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    let mut count = 0usize;
    for y in (cy - r)..=(cy + r) {
        for x in (cx - r)..=(cx + r) {
            let v = view.get(x, y)? as f64;
            sum += v;
            sum_sq += v * v;
            count += 1;
        }
    }
    let n = count as f64;
    let mean = sum / n;
    Some((sum_sq / n - mean * mean).max(0.0))
}

/// Finest pyramid level whose reference window has enough texture.
///
/// Walks from level 0 towards coarser levels. When the projection or the
/// window leaves the reference image at some level, the previous level is
/// kept. Reaching the coarsest level without enough variance is an
/// [`RefineError::InsufficientTexture`] failure.
pub fn select_lod<C: Camera + ?Sized>(
    camera: &C,
    camera_index: usize,
    center: &Point3<f64>,
    params: &RefineParams,
) -> Result<LodSelection, RefineError> {
    let levels = camera.pyramid().num_levels();
    let mut previous: Option<f64> = None;
    let mut best = 0.0f64;
    for level in 0..levels {
        let step_back = LodSelection {
            level: level.saturating_sub(1),
            variance: previous,
        };
        let Some(pt) = camera.project(center, level) else {
            if level == 0 {
                return Err(Degeneracy::ReferenceProjection {
                    camera: camera_index,
                }
                .into());
            }
            return Ok(step_back);
        };
        let Some(view) = camera.pyramid().level(level) else {
            return Ok(step_back);
        };
        let Some(variance) = window_variance(&view, pt, params.patch_radius) else {
            return Ok(step_back);
        };
        if variance >= params.texture_variation {
            return Ok(LodSelection {
                level,
                variance: Some(variance),
            });
        }
        best = best.max(variance);
        previous = Some(variance);
    }
    Err(RefineError::InsufficientTexture {
        threshold: params.texture_variation,
        best,
    })
}
