use nalgebra::{Isometry3, Point3, Vector3};

use strider_core::math::EPSILON;

/// Plane `n . p + d = 0` with unit normal `n`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    normal: Vector3<f32>,
    d: f32,
}

impl Default for Plane {
    fn default() -> Self {
        Self {
            normal: Vector3::y(),
            d: 0.0,
        }
    }
}

impl Plane {
    /// Plane through `point` with the given (unit) normal.
    #[must_use]
    pub fn from_point_normal(point: &Point3<f32>, normal: &Vector3<f32>) -> Self {
        Self {
            normal: *normal,
            d: -normal.dot(&point.coords),
        }
    }

    #[must_use]
    pub const fn normal(&self) -> &Vector3<f32> {
        &self.normal
    }

    #[must_use]
    pub const fn d(&self) -> f32 {
        self.d
    }

    /// Positive on the side the normal points to.
    #[must_use]
    pub fn signed_distance(&self, p: &Point3<f32>) -> f32 {
        self.normal.dot(&p.coords) + self.d
    }

    /// Ray parameter `t` where `origin + t * dir` meets the plane.
    ///
    /// `None` when the ray runs parallel to the plane.
    #[must_use]
    pub fn intersect_ray(&self, origin: &Point3<f32>, dir: &Vector3<f32>) -> Option<f32> {
        let denom = self.normal.dot(dir);
        if denom.abs() < EPSILON {
            return None;
        }
        Some(-self.signed_distance(origin) / denom)
    }

    #[must_use]
    pub fn project(&self, p: &Point3<f32>) -> Point3<f32> {
        p - self.normal * self.signed_distance(p)
    }

    /// Same plane expressed in the frame `iso` maps into.
    #[must_use]
    pub fn transformed(&self, iso: &Isometry3<f32>) -> Self {
        let point = Point3::from(-self.normal * self.d);
        Self::from_point_normal(&(iso * point), &(iso * self.normal))
    }
}

/// Closest point to `p` on segment `a`-`b`.
#[must_use]
pub fn closest_point_on_segment(
    a: &Point3<f32>,
    b: &Point3<f32>,
    p: &Point3<f32>,
) -> Point3<f32> {
    let ab = b - a;
    let len_sq = ab.norm_squared();
    if len_sq < EPSILON * EPSILON {
        return *a;
    }
    let t = ((p - a).dot(&ab) / len_sq).clamp(0.0, 1.0);
    a + ab * t
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
