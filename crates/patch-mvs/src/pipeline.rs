use crate::core::{GrayImage, ImagePyramid, PyramidError};
use crate::refine::{PatchMvsIoError, PatchSet, RefineReport, SceneConfig, SceneConfigError};
use log::{debug, info};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Errors produced by the end-to-end helpers.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("image {index}: {source}")]
    Image {
        index: usize,
        #[source]
        source: PyramidError,
    },

    #[error(transparent)]
    Pyramid(#[from] PyramidError),

    #[error(transparent)]
    Scene(#[from] SceneConfigError),

    #[error(transparent)]
    Io(#[from] PatchMvsIoError),
}

/// Build an image pyramid from a raw row-major grayscale buffer.
pub fn pyramid_from_gray_u8(
    width: usize,
    height: usize,
    pixels: &[u8],
    levels: usize,
) -> Result<ImagePyramid, PyramidError> {
    let base = GrayImage {
        width,
        height,
        data: pixels.to_vec(),
    };
    ImagePyramid::build(base, levels)
}

/// Build one pyramid per `(width, height, pixels)` frame, in camera order.
pub fn pyramids_from_gray_u8<'a, I>(
    frames: I,
    levels: usize,
) -> Result<Vec<ImagePyramid>, PipelineError>
where
    I: IntoIterator<Item = (usize, usize, &'a [u8])>,
{
    frames
        .into_iter()
        .enumerate()
        .map(|(index, (w, h, pixels))| {
            pyramid_from_gray_u8(w, h, pixels, levels)
                .map_err(|source| PipelineError::Image { index, source })
        })
        .collect()
}

/// Refine every seed of `config` against the supplied pyramids.
///
/// Returns the batch report and the patch set in its post-refinement state.
#[cfg_attr(
    feature = "tracing",
    instrument(
        level = "info",
        skip(config, pyramids),
        fields(cameras = config.cameras.len(), seeds = config.seeds.len())
    )
)]
pub fn refine_scene(
    config: &SceneConfig,
    pyramids: Vec<ImagePyramid>,
) -> Result<(RefineReport, PatchSet), PipelineError> {
    let (scene, mut patches) = config.build_scene(pyramids)?;
    debug!(
        "scene with {} cameras and {} seed patches",
        scene.cameras().len(),
        patches.len()
    );
    let report = scene.refine_all(&mut patches);
    Ok((report, patches))
}

/// [`refine_scene`], then write the report to [`SceneConfig::output_path`].
pub fn refine_scene_to_file(
    config: &SceneConfig,
    pyramids: Vec<ImagePyramid>,
) -> Result<RefineReport, PipelineError> {
    let (report, _) = refine_scene(config, pyramids)?;
    let path = config.output_path();
    report.write_json(&path)?;
    info!("report written to {}", path.display());
    Ok(report)
}
