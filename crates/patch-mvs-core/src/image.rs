/// Borrowed row-major 8-bit grayscale image.
#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8], // row-major, len = w*h
}

#[derive(Clone, Debug, PartialEq)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl GrayImage {
    /// Image filled with a single intensity.
    pub fn filled(width: usize, height: usize, value: u8) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    /// Build an image by evaluating `f(x, y)` at every pixel.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> u8) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    #[inline]
    pub fn view(&self) -> GrayImageView<'_> {
        GrayImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }
}

impl GrayImageView<'_> {
    #[inline]
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    /// Pixel value, `None` outside the image.
    #[inline]
    pub fn get(&self, x: i64, y: i64) -> Option<u8> {
        if !self.contains(x, y) {
            return None;
        }
        Some(self.data[y as usize * self.width + x as usize])
    }

    #[inline]
    fn get_clamped(&self, x: i64, y: i64) -> u8 {
        let xc = x.clamp(0, self.width as i64 - 1) as usize;
        let yc = y.clamp(0, self.height as i64 - 1) as usize;
        self.data[yc * self.width + xc]
    }
}

#[inline]
fn lerp4(p00: f64, p10: f64, p01: f64, p11: f64, fx: f64, fy: f64) -> f64 {
    let a = p00 + fx * (p10 - p00);
    let b = p01 + fx * (p11 - p01);
    a + fy * (b - a)
}

/// Bilinear interpolation that requires all four neighbours to lie inside the image.
#[inline]
pub fn sample_bilinear_checked(src: &GrayImageView<'_>, x: f64, y: f64) -> Option<f64> {
    if !x.is_finite() || !y.is_finite() {
        return None;
    }
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    // A sample sitting exactly on the last row/column only needs the left/top neighbour.
    let x1 = if fx == 0.0 { x0 } else { x0 + 1 };
    let y1 = if fy == 0.0 { y0 } else { y0 + 1 };

    let p00 = src.get(x0, y0)? as f64;
    let p10 = src.get(x1, y0)? as f64;
    let p01 = src.get(x0, y1)? as f64;
    let p11 = src.get(x1, y1)? as f64;

    Some(lerp4(p00, p10, p01, p11, fx, fy))
}

/// Bilinear interpolation with the coordinates clamped to the image (edge replication).
///
/// Returns `None` only for an empty image or non-finite coordinates.
#[inline]
pub fn sample_bilinear_clamped(src: &GrayImageView<'_>, x: f64, y: f64) -> Option<f64> {
    if src.width == 0 || src.height == 0 || !x.is_finite() || !y.is_finite() {
        return None;
    }
    let x = x.clamp(0.0, (src.width - 1) as f64);
    let y = y.clamp(0.0, (src.height - 1) as f64);
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let p00 = src.get_clamped(x0, y0) as f64;
    let p10 = src.get_clamped(x0 + 1, y0) as f64;
    let p01 = src.get_clamped(x0, y0 + 1) as f64;
    let p11 = src.get_clamped(x0 + 1, y0 + 1) as f64;

    Some(lerp4(p00, p10, p01, p11, fx, fy))
}
