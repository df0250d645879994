//! Skeleton fixtures matching the stock joint-name presets.
//!
//! Both rigs stand on y = 0 with their align at the origin, facing +Z, with
//! slightly bent knees so the leg plane is defined.

use nalgebra::Point3;
use strider_core::config::LegIkConfig;
use strider_ik::chain::LegJointNames;
use strider_ik::controller::LegIkController;
use strider_ik::pose::SkeletonPose;

/// Ankle height above the align in both fixtures.
pub const ANKLE_HEIGHT: f32 = 0.1;

/// Human biped: hips at 0.9, thigh and shin of about 0.4.
pub fn biped_skeleton() -> SkeletonPose {
    let mut pose = SkeletonPose::new();
    let root = pose.add_joint_at("root", None, Point3::new(0.0, 1.0, 0.0));
    pose.add_joint_at("spine", Some(root), Point3::new(0.0, 1.3, 0.0));
    for (side, x) in [("l", 0.1), ("r", -0.1)] {
        let hip = pose.add_joint_at(format!("{side}_upper_leg"), Some(root), Point3::new(x, 0.9, 0.0));
        let knee = pose.add_joint_at(format!("{side}_knee"), Some(hip), Point3::new(x, 0.52, 0.04));
        let ankle = pose.add_joint_at(
            format!("{side}_ankle"),
            Some(knee),
            Point3::new(x, ANKLE_HEIGHT, 0.0),
        );
        pose.add_joint_at(format!("{side}_heel"), Some(ankle), Point3::new(x, 0.02, -0.05));
        pose.add_joint_at(format!("{side}_ball"), Some(ankle), Point3::new(x, 0.02, 0.12));
    }
    pose
}

/// Horse-named quadruped: hind legs at z = -0.6, forelegs at z = 0.6.
pub fn quadruped_skeleton() -> SkeletonPose {
    let mut pose = SkeletonPose::new();
    let root = pose.add_joint_at("root", None, Point3::new(0.0, 1.3, 0.0));
    let legs = [
        ("hip", "knee", "ankle", "toeEnd", -0.6),
        ("shoulder", "elbow", "hand", "fingerEnd", 0.6),
    ];
    for (upper, middle, lower, end, z) in legs {
        for (side, x) in [("l", 0.2), ("r", -0.2)] {
            let hip = pose.add_joint_at(format!("{side}_{upper}"), Some(root), Point3::new(x, 1.2, z));
            let knee = pose.add_joint_at(format!("{side}_{middle}"), Some(hip), Point3::new(x, 0.66, z + 0.05));
            let ankle = pose.add_joint_at(
                format!("{side}_{lower}"),
                Some(knee),
                Point3::new(x, ANKLE_HEIGHT, z),
            );
            pose.add_joint_at(format!("{side}_{end}"), Some(ankle), Point3::new(x, 0.0, z + 0.08));
        }
    }
    pose
}

/// Controller bound to [`biped_skeleton`].
///
/// # Panics
///
/// Panics if `config` is invalid.
pub fn biped_controller(config: LegIkConfig) -> LegIkController {
    LegIkController::from_skeleton(config, &LegJointNames::human(), &biped_skeleton())
        .expect("biped fixture binds")
}

/// Controller bound to [`quadruped_skeleton`].
///
/// # Panics
///
/// Panics if `config` is invalid.
pub fn quadruped_controller(config: LegIkConfig) -> LegIkController {
    LegIkController::from_skeleton(config, &LegJointNames::horse(), &quadruped_skeleton())
        .expect("quadruped fixture binds")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
