//! Small vector helpers shared by the ground model and the IK solve.

use nalgebra::{UnitQuaternion, Vector3};

/// Threshold for zero-length edges, cross products and normalization.
pub const EPSILON: f32 = 1e-4;

/// Move `value` toward `target` by at most `max_delta`.
#[must_use]
pub fn seek(value: f32, target: f32, max_delta: f32) -> f32 {
    let delta = target - value;
    if delta.abs() <= max_delta {
        target
    } else {
        value + max_delta.copysign(delta)
    }
}

#[must_use]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    (b - a).mul_add(t, a)
}

/// World up (+Y).
#[must_use]
pub fn up() -> Vector3<f32> {
    Vector3::y()
}

/// Drop the vertical component.
#[must_use]
pub fn flatten(v: &Vector3<f32>) -> Vector3<f32> {
    Vector3::new(v.x, 0.0, v.z)
}

/// Normalize, or `None` when shorter than [`EPSILON`].
#[must_use]
pub fn try_normalize(v: &Vector3<f32>) -> Option<Vector3<f32>> {
    v.try_normalize(EPSILON)
}

/// Replace normals that lean further than `min_up` allows with world up.
#[must_use]
pub fn sanitize_ground_normal(n: &Vector3<f32>, min_up: f32) -> Vector3<f32> {
    match try_normalize(n) {
        Some(n) if n.y >= min_up => n,
        _ => up(),
    }
}

/// Rotate `n` toward up so it lies within `max_angle` radians of it.
#[must_use]
pub fn limit_angle_from_up(n: &Vector3<f32>, max_angle: f32) -> Vector3<f32> {
    let Some(n) = try_normalize(n) else {
        return up();
    };
    let angle = n.y.clamp(-1.0, 1.0).acos();
    if angle <= max_angle {
        return n;
    }
    let Some(axis) = nalgebra::Unit::try_new(up().cross(&n), EPSILON) else {
        return up();
    };
    UnitQuaternion::from_axis_angle(&axis, max_angle) * up()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
