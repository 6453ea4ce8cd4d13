use crate::SwarmError;

/// Axis-aligned feasible box `lower[i] <= x[i] <= upper[i]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Bounds {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl Bounds {
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Result<Self, SwarmError> {
        if lower.len() != upper.len() {
            return Err(SwarmError::DimensionMismatch {
                expected: lower.len(),
                got: upper.len(),
            });
        }
        if lower.is_empty() {
            return Err(SwarmError::EmptyBounds);
        }
        for (axis, (&lo, &hi)) in lower.iter().zip(&upper).enumerate() {
            if !lo.is_finite() || !hi.is_finite() || lo > hi {
                return Err(SwarmError::InvalidBounds {
                    axis,
                    lower: lo,
                    upper: hi,
                });
            }
        }
        Ok(Self { lower, upper })
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.lower.len()
    }

    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    #[inline]
    pub fn width(&self, axis: usize) -> f64 {
        self.upper[axis] - self.lower[axis]
    }

    pub fn midpoint(&self) -> Vec<f64> {
        self.lower
            .iter()
            .zip(&self.upper)
            .map(|(lo, hi)| 0.5 * (lo + hi))
            .collect()
    }

    pub fn contains(&self, x: &[f64]) -> bool {
        x.len() == self.dim()
            && x
                .iter()
                .zip(self.lower.iter().zip(&self.upper))
                .all(|(v, (lo, hi))| *v >= *lo && *v <= *hi)
    }

    /// Clamp `x` into the box in place. Returns true if any coordinate moved.
    pub fn clamp(&self, x: &mut [f64]) -> bool {
        let mut moved = false;
        for (v, (lo, hi)) in x.iter_mut().zip(self.lower.iter().zip(&self.upper)) {
            let c = if v.is_nan() { 0.5 * (lo + hi) } else { v.clamp(*lo, *hi) };
            if c != *v {
                *v = c;
                moved = true;
            }
        }
        moved
    }
}
