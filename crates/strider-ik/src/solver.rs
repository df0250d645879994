//! Closed-form two-bone leg solve.
//!
//! The knee is bent until the hip-ankle distance matches the (clamped)
//! hip-target distance, then the whole leg is swung about the hip onto the
//! target direction.
//!
//! ```text
//!        hip
//!         \  L1
//!          \
//!          knee  <- interior angle from the law of cosines
//!          /
//!         /  L2
//!      ankle ───► target
//! ```

use std::f32::consts::PI;

use nalgebra::{Point3, Unit, UnitQuaternion};

use strider_core::error::GroundFault;
use strider_core::math::{EPSILON, try_normalize};

use crate::chain::LegIkChain;
use crate::pose::JointPose;

/// Distances within this of the reach window are not reported as clamped.
const REACH_TOLERANCE: f32 = 1e-5;

/// Result of one leg solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TwoBoneOutcome {
    /// Solved interior knee angle (`PI` is a straight leg).
    pub knee_angle: f32,
    /// Hip-to-ankle distance the solve aimed for.
    pub reach: f32,
    /// The target lay outside `[|L1 - L2|, L1 + L2]`.
    pub clamped: bool,
    /// Geometry was degenerate and the pose was left untouched.
    pub skipped: bool,
}

impl TwoBoneOutcome {
    const fn skipped() -> Self {
        Self {
            knee_angle: 0.0,
            reach: 0.0,
            clamped: false,
            skipped: true,
        }
    }

    #[must_use]
    pub const fn fault(&self) -> Option<GroundFault> {
        if self.skipped {
            Some(GroundFault::DegenerateGeometry)
        } else if self.clamped {
            Some(GroundFault::OutOfReachTarget)
        } else {
            None
        }
    }
}

/// Interior knee angle that puts the ankle `reach` away from the hip.
#[must_use]
pub fn knee_angle_for_reach(thigh: f32, shin: f32, reach: f32) -> f32 {
    let cos = (thigh.mul_add(thigh, shin * shin) - reach * reach) / (2.0 * thigh * shin);
    cos.clamp(-1.0, 1.0).acos()
}

/// Place the ankle of `chain` at `target`, writing into `pose`.
///
/// The pole is perpendicular to the hip forward axis and hip→ankle, or to
/// the thigh and shin when those are parallel. With no usable pole the leg
/// is left as is.
pub fn solve_two_bone<P: JointPose + ?Sized>(
    pose: &mut P,
    chain: &LegIkChain,
    target: &Point3<f32>,
) -> TwoBoneOutcome {
    let hip = chain.hip(pose);
    let knee = chain.knee(pose);
    let ankle = chain.ankle(pose);
    let thigh = knee - hip;
    let shin = ankle - knee;

    let Some(pole) = try_normalize(&chain.hip_forward(pose).cross(&(ankle - hip)))
        .or_else(|| try_normalize(&thigh.cross(&shin)))
    else {
        return TwoBoneOutcome::skipped();
    };
    let (Some(thigh_dir), Some(shin_dir)) = (try_normalize(&thigh), try_normalize(&shin)) else {
        return TwoBoneOutcome::skipped();
    };

    let (l1, l2) = (chain.thigh_length(), chain.shin_length());
    let to_target = target - hip;
    let distance = to_target.norm();
    let (min_reach, max_reach) = ((l1 - l2).abs(), l1 + l2);
    let reach = distance.clamp(min_reach, max_reach);
    let clamped = distance > max_reach + REACH_TOLERANCE || distance < min_reach - REACH_TOLERANCE;

    let current = (-thigh_dir).dot(&shin_dir).clamp(-1.0, 1.0).acos();
    let solved = knee_angle_for_reach(l1, l2, reach);

    // Positive rotation about thigh x shin closes the knee.
    let bend_axis = try_normalize(&thigh_dir.cross(&shin_dir)).unwrap_or(pole);
    let bend_axis = Unit::new_unchecked(bend_axis);
    let delta = current - solved;
    if delta.abs() > f32::EPSILON {
        chain.rotate_knee(pose, &UnitQuaternion::from_axis_angle(&bend_axis, delta));
    }

    if distance > EPSILON {
        let ankle_dir = chain.ankle(pose) - hip;
        let swing = UnitQuaternion::rotation_between(&ankle_dir, &to_target)
            .unwrap_or_else(|| UnitQuaternion::from_axis_angle(&bend_axis, PI));
        chain.rotate_hip(pose, &swing);
    }

    TwoBoneOutcome {
        knee_angle: solved,
        reach,
        clamped,
        skipped: false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
