//! Multi-frame controller scenarios over synthetic terrain.

use approx::assert_relative_eq;
use nalgebra::{Isometry3, Point3, Vector3};

use strider_core::config::LegIkConfig;
use strider_core::error::GroundFault;
use strider_core::types::{FrameNumber, IkMode, LegIndex};
use strider_ground::probe::ProbeService;
use strider_ground::terrain::{FlatGround, LatentProbeService};
use strider_ik::pose::JointPose;
use strider_ik::{FrameInput, LegIkController, SkeletonPose};
use strider_test_utils::{
    StepGround, biped_controller, biped_skeleton, quadruped_controller, quadruped_skeleton,
};

const DT: f32 = 1.0 / 60.0;

/// Drive `ctrl` for `frames` frames from `*frame`, re-posing from `skeleton`
/// each frame like an animation would.
fn drive(
    ctrl: &mut LegIkController,
    service: &mut dyn ProbeService,
    skeleton: &SkeletonPose,
    frame: &mut u64,
    frames: u64,
    input: impl Fn(FrameNumber) -> FrameInput,
) -> SkeletonPose {
    let mut pose = skeleton.clone();
    for _ in 0..frames {
        *frame += 1;
        pose.clone_from(skeleton);
        ctrl.update(&mut pose, service, &input(FrameNumber(*frame)));
    }
    pose
}

fn still(frame: FrameNumber) -> FrameInput {
    FrameInput::new(frame, DT, Isometry3::identity())
}

fn ankle_y(ctrl: &LegIkController, pose: &SkeletonPose, leg: LegIndex) -> f32 {
    ctrl.topology().chain(leg).ankle(pose).y
}

// ---------------------------------------------------------------------------
// Ground following
// ---------------------------------------------------------------------------

#[test]
fn step_ahead_is_bridged_by_hull() {
    let skeleton = biped_skeleton();
    let mut ctrl = biped_controller(LegIkConfig::default());
    let mut service = LatentProbeService::new(
        StepGround {
            low: 0.0,
            high: 0.15,
            edge_z: 0.3,
        },
        1,
    );
    ctrl.set_mode_with_blend(IkMode::MovingNonPredictive, 0.0);
    let mut frame = 0;
    let pose = drive(&mut ctrl, &mut service, &skeleton, &mut frame, 240, still);

    // The line starts under the feet, so they stay on the low side while
    // the hull ramps up to the step between the second and third sample.
    for leg in [LegIndex::BackLeft, LegIndex::BackRight] {
        assert_relative_eq!(ankle_y(&ctrl, &pose, leg), 0.1, epsilon = 2e-3);
        assert!(ctrl.on_ground(leg));
    }
    let ramp = ctrl
        .ground()
        .project_point_to_ground(&Point3::new(0.0, 1.0, 0.25))
        .unwrap();
    assert_relative_eq!(ramp.y, 0.075, epsilon = 1e-3);
    assert_relative_eq!(ctrl.root_delta(), 0.0, epsilon = 2e-3);
}

#[test]
fn drop_behind_hind_feet_keeps_forelegs_planted() {
    let skeleton = quadruped_skeleton();
    let mut ctrl = quadruped_controller(LegIkConfig::default());
    let mut service = LatentProbeService::new(
        StepGround {
            low: -0.45,
            high: 0.0,
            edge_z: -0.3,
        },
        1,
    );
    ctrl.set_mode_with_blend(IkMode::MovingNonPredictive, 0.0);
    let mut frame = 0;
    let pose = drive(&mut ctrl, &mut service, &skeleton, &mut frame, 240, still);

    // The drop under the hind feet is too deep to accept; the ground ahead
    // of it still holds.
    assert!(ctrl.ground().is_valid());
    assert!(!ctrl.ground().faults().contains(GroundFault::SlopeRejected));
    for leg in [LegIndex::FrontLeft, LegIndex::FrontRight] {
        assert!(ctrl.on_ground(leg));
        assert_relative_eq!(ankle_y(&ctrl, &pose, leg), 0.1, epsilon = 2e-3);
    }
    for leg in [LegIndex::BackLeft, LegIndex::BackRight] {
        assert!(!ctrl.on_ground(leg));
    }
}

#[test]
fn feet_land_on_raised_step() {
    let skeleton = biped_skeleton();
    let mut ctrl = biped_controller(LegIkConfig::default());
    let mut service = LatentProbeService::new(
        StepGround {
            low: 0.0,
            high: 0.15,
            edge_z: -0.5,
        },
        1,
    );
    ctrl.set_mode_with_blend(IkMode::MovingNonPredictive, 0.0);
    let mut frame = 0;
    let pose = drive(&mut ctrl, &mut service, &skeleton, &mut frame, 240, still);

    for leg in [LegIndex::BackLeft, LegIndex::BackRight] {
        assert_relative_eq!(ankle_y(&ctrl, &pose, leg), 0.25, epsilon = 2e-3);
        assert_relative_eq!(ctrl.ground_normal(leg), Vector3::y(), epsilon = 1e-4);
    }
    let limits = ctrl.root_limits();
    assert!(limits.contains(ctrl.root_delta()));
    assert_relative_eq!(ctrl.root_delta(), 0.15, epsilon = 2e-3);
}

#[test]
fn predictive_line_leads_the_character() {
    let skeleton = biped_skeleton();
    let mut ctrl = biped_controller(LegIkConfig::default());
    let mut service = LatentProbeService::new(FlatGround::default(), 0);
    ctrl.set_mode_with_blend(IkMode::Moving, 0.0);
    let mut frame = 0;
    drive(&mut ctrl, &mut service, &skeleton, &mut frame, 4, |f| {
        still(f).with_velocity(Vector3::new(0.0, 0.0, 2.0))
    });

    // Look-ahead 0.25 s at 2 m/s pushes the line end from 0.75 to 1.25; the
    // start stays under the feet.
    let start = ctrl.ground().hull_to_world().translation.vector;
    assert_relative_eq!(start.z, 0.0, epsilon = 1e-4);
    let (lo, hi) = ctrl.ground().valid_x_range();
    assert_relative_eq!(lo, 0.0, epsilon = 1e-4);
    assert_relative_eq!(hi, 1.25, epsilon = 1e-4);

    ctrl.set_mode_with_blend(IkMode::MovingNonPredictive, 0.0);
    drive(&mut ctrl, &mut service, &skeleton, &mut frame, 4, |f| {
        still(f).with_velocity(Vector3::new(0.0, 0.0, 2.0))
    });
    let (_, hi) = ctrl.ground().valid_x_range();
    assert_relative_eq!(hi, 0.75, epsilon = 1e-4);
}

#[test]
fn fast_predictive_walk_keeps_feet_on_ground() {
    let skeleton = biped_skeleton();
    let mut ctrl = biped_controller(LegIkConfig::default());
    let mut service = LatentProbeService::new(FlatGround { height: 0.1 }, 1);
    ctrl.set_mode_with_blend(IkMode::Moving, 0.0);
    let mut frame = 0;
    let pose = drive(&mut ctrl, &mut service, &skeleton, &mut frame, 240, |f| {
        still(f).with_velocity(Vector3::new(0.0, 0.0, 6.0))
    });

    for leg in [LegIndex::BackLeft, LegIndex::BackRight] {
        assert!(ctrl.on_ground(leg));
        assert_relative_eq!(ankle_y(&ctrl, &pose, leg), 0.2, epsilon = 2e-3);
    }
    let (lo, hi) = ctrl.ground().valid_x_range();
    assert_relative_eq!(lo, 0.0, epsilon = 1e-4);
    assert_relative_eq!(hi, 2.25, epsilon = 1e-4);
}

#[test]
fn walking_backwards_does_not_stretch_the_line() {
    let skeleton = biped_skeleton();
    let mut ctrl = biped_controller(LegIkConfig::default());
    let mut service = LatentProbeService::new(FlatGround::default(), 0);
    ctrl.set_mode_with_blend(IkMode::Moving, 0.0);
    let mut frame = 0;
    drive(&mut ctrl, &mut service, &skeleton, &mut frame, 4, |f| {
        still(f).with_velocity(Vector3::new(0.0, 0.0, -3.0))
    });
    let (lo, hi) = ctrl.ground().valid_x_range();
    assert_relative_eq!(lo, 0.0, epsilon = 1e-4);
    assert_relative_eq!(hi, 0.75, epsilon = 1e-4);
}

#[test]
fn quadruped_plants_all_feet() {
    let skeleton = quadruped_skeleton();
    let mut ctrl = quadruped_controller(LegIkConfig::default());
    let mut service = LatentProbeService::new(FlatGround { height: 0.1 }, 1);
    ctrl.set_mode_with_blend(IkMode::MovingNonPredictive, 0.0);
    let mut frame = 0;
    let pose = drive(&mut ctrl, &mut service, &skeleton, &mut frame, 240, still);

    for leg in LegIndex::ALL {
        assert_relative_eq!(ankle_y(&ctrl, &pose, leg), 0.2, epsilon = 2e-3);
    }
    let root = pose.find_joint("root").unwrap();
    assert_relative_eq!(pose.position(root).y, 1.3 + ctrl.root_delta(), epsilon = 1e-5);
    assert_relative_eq!(ctrl.root_delta(), 0.1, epsilon = 2e-3);
}

// ---------------------------------------------------------------------------
// Freeze
// ---------------------------------------------------------------------------

#[test]
fn stopped_feet_ignore_new_ground() {
    let skeleton = biped_skeleton();
    let mut ctrl = biped_controller(LegIkConfig::default());
    let mut service = LatentProbeService::new(FlatGround { height: 0.1 }, 1);
    ctrl.set_mode_with_blend(IkMode::Stopped, 0.0);
    let mut frame = 0;
    drive(&mut ctrl, &mut service, &skeleton, &mut frame, 60, still);
    assert!(ctrl.freeze().is_frozen());

    service.set_sampler(FlatGround { height: 0.25 });
    let pose = drive(&mut ctrl, &mut service, &skeleton, &mut frame, 120, still);
    assert_relative_eq!(ctrl.leg(LegIndex::BackLeft).ground_height(), 0.25, epsilon = 1e-3);
    assert_relative_eq!(
        ctrl.leg(LegIndex::BackLeft).ankle_target().unwrap().y,
        0.2,
        epsilon = 1e-4
    );
    assert_relative_eq!(ankle_y(&ctrl, &pose, LegIndex::BackLeft), 0.2, epsilon = 2e-3);

    // One frame with the ground-adapted target, then held again.
    ctrl.single_frame_unfreeze();
    drive(&mut ctrl, &mut service, &skeleton, &mut frame, 1, still);
    assert_relative_eq!(
        ctrl.leg(LegIndex::BackRight).ankle_target().unwrap().y,
        0.35,
        epsilon = 1e-3
    );
    drive(&mut ctrl, &mut service, &skeleton, &mut frame, 1, still);
    assert_relative_eq!(
        ctrl.leg(LegIndex::BackRight).ankle_target().unwrap().y,
        0.2,
        epsilon = 1e-4
    );

    ctrl.release_freeze();
    let pose = drive(&mut ctrl, &mut service, &skeleton, &mut frame, 240, still);
    assert!(!ctrl.freeze().is_frozen());
    assert_relative_eq!(ankle_y(&ctrl, &pose, LegIndex::BackLeft), 0.35, epsilon = 2e-3);
}

#[test]
fn freeze_follows_the_align() {
    let skeleton = biped_skeleton();
    let mut ctrl = biped_controller(LegIkConfig::default());
    let mut service = LatentProbeService::new(FlatGround::default(), 0);
    ctrl.set_mode_with_blend(IkMode::Stopped, 0.0);
    let mut frame = 0;
    drive(&mut ctrl, &mut service, &skeleton, &mut frame, 10, still);

    let offset = ctrl.freeze().offset(LegIndex::BackLeft).unwrap();
    assert_relative_eq!(offset, Vector3::new(0.1, 0.1, 0.0), epsilon = 1e-4);

    let moved = Isometry3::translation(0.0, 0.0, 0.05);
    drive(&mut ctrl, &mut service, &skeleton, &mut frame, 1, |f| {
        FrameInput::new(f, DT, moved)
    });
    let target = ctrl.leg(LegIndex::BackLeft).ankle_target().unwrap();
    assert_relative_eq!(target, Point3::new(0.1, 0.1, 0.05), epsilon = 1e-4);
}

// ---------------------------------------------------------------------------
// Scripted and melee
// ---------------------------------------------------------------------------

#[test]
fn scripted_target_overrides_one_leg() {
    let skeleton = biped_skeleton();
    let mut ctrl = biped_controller(LegIkConfig::default());
    let mut service = LatentProbeService::new(FlatGround::default(), 1);
    let lifted = Point3::new(0.1, 0.3, 0.1);
    ctrl.set_scripted_target(LegIndex::BackLeft, Some(lifted));
    ctrl.set_mode_with_blend(IkMode::Scripted, 0.0);
    let mut frame = 0;
    let pose = drive(&mut ctrl, &mut service, &skeleton, &mut frame, 60, still);

    let left = ctrl.topology().chain(LegIndex::BackLeft);
    assert_relative_eq!(left.ankle(&pose), lifted, epsilon = 1e-3);
    // The most compressed leg keeps the root down.
    assert_relative_eq!(ctrl.root_delta(), 0.0, epsilon = 1e-4);
    assert_relative_eq!(ankle_y(&ctrl, &pose, LegIndex::BackRight), 0.1, epsilon = 1e-3);

    ctrl.clear_scripted_targets();
    let pose = drive(&mut ctrl, &mut service, &skeleton, &mut frame, 1, still);
    assert_relative_eq!(ankle_y(&ctrl, &pose, LegIndex::BackLeft), 0.1, epsilon = 1e-3);
}

#[test]
fn melee_offsets_lift_one_foot() {
    let skeleton = biped_skeleton();
    let mut ctrl = biped_controller(LegIkConfig::default());
    let mut service = LatentProbeService::new(FlatGround::default(), 1);
    ctrl.set_melee_foot_delta(LegIndex::BackLeft, 0.05);
    ctrl.set_mode_with_blend(IkMode::Melee, 0.0);
    let mut frame = 0;
    drive(&mut ctrl, &mut service, &skeleton, &mut frame, 60, still);

    let left = ctrl.leg(LegIndex::BackLeft).ankle_target().unwrap();
    let right = ctrl.leg(LegIndex::BackRight).ankle_target().unwrap();
    assert_relative_eq!(left.y - right.y, 0.05, epsilon = 1e-4);

    // Outside melee the foot delta is ignored.
    ctrl.set_mode_with_blend(IkMode::MovingNonPredictive, 0.0);
    drive(&mut ctrl, &mut service, &skeleton, &mut frame, 1, still);
    let left = ctrl.leg(LegIndex::BackLeft).ankle_target().unwrap();
    let right = ctrl.leg(LegIndex::BackRight).ankle_target().unwrap();
    assert_relative_eq!(left.y, right.y, epsilon = 1e-4);
}

// ---------------------------------------------------------------------------
// Blending
// ---------------------------------------------------------------------------

#[test]
fn blend_in_eases_targets() {
    let skeleton = biped_skeleton();
    let mut ctrl = biped_controller(LegIkConfig::default());
    let mut service = LatentProbeService::new(FlatGround { height: 0.1 }, 0);
    ctrl.set_mode_with_blend(IkMode::MovingNonPredictive, 0.5);
    let mut frame = 0;

    // Warmup uses two frames of the blend; check halfway through.
    drive(&mut ctrl, &mut service, &skeleton, &mut frame, 15, still);
    assert_relative_eq!(ctrl.blend_weight(), 0.5, epsilon = 1e-4);
    let target = ctrl.leg(LegIndex::BackLeft).ankle_target().unwrap();
    assert_relative_eq!(target.y, 0.15, epsilon = 1e-3);

    drive(&mut ctrl, &mut service, &skeleton, &mut frame, 30, still);
    let target = ctrl.leg(LegIndex::BackLeft).ankle_target().unwrap();
    assert_relative_eq!(target.y, 0.2, epsilon = 1e-4);
}

#[test]
fn root_spring_override_speeds_up_settling() {
    let skeleton = biped_skeleton();
    let mut stiff = biped_controller(LegIkConfig::default());
    let mut soft = biped_controller(LegIkConfig::default());
    stiff.set_root_spring_override(Some(400.0));

    let mut results = Vec::new();
    for ctrl in [&mut stiff, &mut soft] {
        let mut service = LatentProbeService::new(FlatGround { height: 0.1 }, 1);
        ctrl.set_mode_with_blend(IkMode::MovingNonPredictive, 0.0);
        let mut frame = 0;
        drive(ctrl, &mut service, &skeleton, &mut frame, 60, still);
        service.set_sampler(FlatGround { height: 0.2 });
        drive(ctrl, &mut service, &skeleton, &mut frame, 15, still);
        results.push(ctrl.root_delta());
    }
    assert!(results[0] > results[1] + 0.03, "{results:?}");
    assert!(results[0] <= 0.2 + 1e-4);
}
