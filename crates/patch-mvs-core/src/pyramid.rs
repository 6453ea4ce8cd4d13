//! Gaussian-style image pyramid.
//!
//! Level `l + 1` is produced from level `l` by a separable `[1 2 1] / 4`
//! blur followed by keeping even pixels, so pixel `(i, j)` at level `l + 1`
//! sits exactly on pixel `(2i, 2j)` at level `l`. A level-0 coordinate `p`
//! therefore maps to `p / 2^l` at level `l`.

use crate::{GrayImage, GrayImageView};

/// Errors produced while building a pyramid.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum PyramidError {
    #[error("empty base image ({width}x{height})")]
    EmptyImage { width: usize, height: usize },
    #[error("invalid buffer length (expected {expected} bytes, got {got})")]
    InvalidBuffer { expected: usize, got: usize },
    #[error("pyramid needs at least one level")]
    NoLevels,
    #[error("level {level} is {got:?}, expected {expected:?}")]
    LevelSize {
        level: usize,
        expected: (usize, usize),
        got: (usize, usize),
    },
}

#[derive(Clone, Debug)]
pub struct ImagePyramid {
    pub(crate) levels: Vec<GrayImage>,
}

impl ImagePyramid {
    /// Build up to `num_levels` levels; stops early once a level would be smaller than 2x2.
    pub fn build(base: GrayImage, num_levels: usize) -> Result<Self, PyramidError> {
        if num_levels == 0 {
            return Err(PyramidError::NoLevels);
        }
        if base.width == 0 || base.height == 0 {
            return Err(PyramidError::EmptyImage {
                width: base.width,
                height: base.height,
            });
        }
        if base.data.len() != base.width * base.height {
            return Err(PyramidError::InvalidBuffer {
                expected: base.width * base.height,
                got: base.data.len(),
            });
        }

        let mut levels = Vec::with_capacity(num_levels);
        levels.push(base);
        while levels.len() < num_levels {
            let Some(last) = levels.last() else {
                break;
            };
            if last.width < 4 || last.height < 4 {
                break;
            }
            let next = downsample(&last.view());
            levels.push(next);
        }
        Ok(Self { levels })
    }

    /// Wrap already-built levels; level `l + 1` must be `ceil(size / 2)` of level `l`.
    pub fn from_levels(levels: Vec<GrayImage>) -> Result<Self, PyramidError> {
        let Some(base) = levels.first() else {
            return Err(PyramidError::NoLevels);
        };
        if base.width == 0 || base.height == 0 {
            return Err(PyramidError::EmptyImage {
                width: base.width,
                height: base.height,
            });
        }
        for (level, img) in levels.iter().enumerate() {
            if level > 0 {
                let prev = &levels[level - 1];
                let expected = (prev.width.div_ceil(2), prev.height.div_ceil(2));
                if (img.width, img.height) != expected {
                    return Err(PyramidError::LevelSize {
                        level,
                        expected,
                        got: (img.width, img.height),
                    });
                }
            }
            if img.data.len() != img.width * img.height {
                return Err(PyramidError::InvalidBuffer {
                    expected: img.width * img.height,
                    got: img.data.len(),
                });
            }
        }
        Ok(Self { levels })
    }

    #[inline]
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    #[inline]
    pub fn level(&self, level: usize) -> Option<GrayImageView<'_>> {
        self.levels.get(level).map(GrayImage::view)
    }

    pub fn levels(&self) -> &[GrayImage] {
        &self.levels
    }
}

/// Scale factor from level-0 pixel units to `level` pixel units.
#[inline]
pub fn level_scale(level: usize) -> f64 {
    1.0 / (1u64 << level.min(62)) as f64
}

fn downsample(src: &GrayImageView<'_>) -> GrayImage {
    let w = src.width;
    let h = src.height;
    let ow = w.div_ceil(2);
    let oh = h.div_ceil(2);

    let at = |x: isize, y: isize| -> u32 {
        let xc = x.clamp(0, w as isize - 1) as usize;
        let yc = y.clamp(0, h as isize - 1) as usize;
        src.data[yc * w + xc] as u32
    };

    GrayImage::from_fn(ow, oh, |ox, oy| {
        let cx = (2 * ox) as isize;
        let cy = (2 * oy) as isize;
        let mut acc = 0u32;
        for (dy, wy) in [(-1isize, 1u32), (0, 2), (1, 1)] {
            for (dx, wx) in [(-1isize, 1u32), (0, 2), (1, 1)] {
                acc += wx * wy * at(cx + dx, cy + dy);
            }
        }
        ((acc + 8) / 16) as u8
    })
}
