use crate::camera::{Camera, ProjectionParts};
use nalgebra::{Matrix3, Point2, Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Projective 2D mapping `p' ~ H p`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity())
    }

    pub fn from_array(rows: [[f64; 3]; 3]) -> Self {
        Self::new(Matrix3::from_row_slice(&[
            rows[0][0], rows[0][1], rows[0][2], rows[1][0], rows[1][1], rows[1][2], rows[2][0],
            rows[2][1], rows[2][2],
        ]))
    }

    pub fn to_array(&self) -> [[f64; 3]; 3] {
        [
            [self.h[(0, 0)], self.h[(0, 1)], self.h[(0, 2)]],
            [self.h[(1, 0)], self.h[(1, 1)], self.h[(1, 2)]],
            [self.h[(2, 0)], self.h[(2, 1)], self.h[(2, 2)]],
        ]
    }

    /// Map a point; `None` when it lands on the line at infinity.
    #[inline]
    pub fn apply(&self, p: Point2<f64>) -> Option<Point2<f64>> {
        let v = self.h * Vector3::new(p.x, p.y, 1.0);
        let w = v[2];
        if w.abs() < 1e-12 || !w.is_finite() {
            return None;
        }
        Some(Point2::new(v[0] / w, v[1] / w))
    }

    pub fn inverse(&self) -> Option<Self> {
        self.h.try_inverse().map(Self::new)
    }
}

/// Plane `n·X + d = 0` with unit normal `n`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub normal: Vector3<f64>,
    pub d: f64,
}

impl Plane {
    /// Plane through `point` with (normalized) `normal`.
    pub fn from_point_normal(point: &Point3<f64>, normal: &Vector3<f64>) -> Option<Self> {
        let norm = normal.norm();
        if norm < 1e-12 || !norm.is_finite() {
            return None;
        }
        let normal = normal / norm;
        Some(Self {
            d: -normal.dot(&point.coords),
            normal,
        })
    }

    #[inline]
    pub fn signed_distance(&self, point: &Point3<f64>) -> f64 {
        self.normal.dot(&point.coords) + self.d
    }
}

/// Planes closer than this to the `from` camera center are treated as degenerate.
const MIN_PLANE_DISTANCE: f64 = 1e-9;

#[inline]
fn plane_factor(parts: &ProjectionParts, plane: &Plane) -> Matrix3<f64> {
    // For X on the plane, (d·KR - KT·nᵀ) X = d (KR X + KT).
    parts.kr * plane.d - parts.kt * plane.normal.transpose()
}

/// Homography induced by `plane` from `from`'s level-0 image to `to`'s level-0 image.
///
/// Returns `None` if the plane passes through the `from` camera center.
pub fn plane_induced_homography<F, T>(from: &F, to: &T, plane: &Plane) -> Option<Homography>
where
    F: Camera + ?Sized,
    T: Camera + ?Sized,
{
    homography_from_parts(&from.projection(), &to.projection(), plane)
}

/// `H = (d·KR_to − KT_to·nᵀ)(d·KR_from − KT_from·nᵀ)⁻¹` from projection factors.
///
/// The product is evaluated in a frame centred on the `from` camera, where
/// `KT_from` vanishes and `d` is that camera's signed distance to the plane.
/// In world coordinates the reference factor is also singular for planes
/// through the world origin; the shifted frame keeps only the genuine
/// degeneracy of a plane through the `from` center.
pub fn homography_from_parts(
    from: &ProjectionParts,
    to: &ProjectionParts,
    plane: &Plane,
) -> Option<Homography> {
    let center = -(from.kr.try_inverse()? * from.kt);
    let local = Plane {
        normal: plane.normal,
        d: plane.signed_distance(&Point3::from(center)),
    };
    if !local.d.is_finite() || local.d.abs() < MIN_PLANE_DISTANCE {
        return None;
    }
    let shifted = |p: &ProjectionParts| ProjectionParts {
        kr: p.kr,
        kt: p.kt + p.kr * center,
    };
    let m_from = plane_factor(&shifted(from), &local);
    let m_to = plane_factor(&shifted(to), &local);
    let inv = m_from.try_inverse()?;
    let h = m_to * inv;
    if h.iter().all(|v| v.is_finite()) {
        Some(Homography::new(h))
    } else {
        None
    }
}
