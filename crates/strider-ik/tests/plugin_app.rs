//! Leg IK driven through the Bevy plugin.

use approx::assert_relative_eq;
use bevy::prelude::*;
use nalgebra::{Isometry3, Vector3};

use strider_core::config::LegIkConfig;
use strider_core::types::{IkMode, LegIndex};
use strider_ground::terrain::{FlatGround, LatentProbeService};
use strider_ik::prelude::*;
use strider_test_utils::{leg_ik_test_app, quadruped_controller, quadruped_skeleton};

fn spawn_quadruped(app: &mut App) -> Entity {
    let mut controller = quadruped_controller(LegIkConfig::default());
    controller.set_mode_with_blend(IkMode::MovingNonPredictive, 0.0);
    app.world_mut()
        .spawn(LegIkRigBundle::new(
            controller,
            quadruped_skeleton(),
            CharacterMotion::default(),
        ))
        .id()
}

#[test]
fn quadruped_outputs_are_published() {
    let mut app = leg_ik_test_app(LatentProbeService::new(FlatGround { height: 0.1 }, 2));
    let entity = spawn_quadruped(&mut app);
    for _ in 0..240 {
        app.update();
    }

    let world = app.world();
    let outputs = world.get::<LegIkOutputs>(entity).unwrap();
    for leg in LegIndex::ALL {
        assert!(outputs.on_ground(leg));
        assert_relative_eq!(outputs.ground_normal(leg), Vector3::y(), epsilon = 1e-4);
    }
    assert_relative_eq!(outputs.root_delta, 0.1, epsilon = 2e-3);
    assert!(outputs.faults.is_empty());

    let rig = world.get::<LegIkRig>(entity).unwrap();
    let pose = world.get::<SkeletonPose>(entity).unwrap();
    let ankle = rig.controller.topology().chain(LegIndex::FrontRight).ankle(pose);
    assert_relative_eq!(ankle.y, 0.2, epsilon = 2e-3);
}

#[test]
fn mode_change_blends_out_through_plugin() {
    let mut app = leg_ik_test_app(LatentProbeService::new(FlatGround { height: 0.1 }, 1));
    let entity = spawn_quadruped(&mut app);
    for _ in 0..60 {
        app.update();
    }

    app.world_mut()
        .get_mut::<LegIkRig>(entity)
        .unwrap()
        .controller
        .set_mode_with_blend(IkMode::Disabled, 0.1);
    for _ in 0..20 {
        app.update();
    }

    let world = app.world();
    let outputs = world.get::<LegIkOutputs>(entity).unwrap();
    assert_eq!(outputs.mode, IkMode::Disabled);
    assert_relative_eq!(outputs.blend_weight, 0.0);
    assert_relative_eq!(outputs.root_delta, 0.0);
    assert_eq!(*world.get::<SkeletonPose>(entity).unwrap(), quadruped_skeleton());
}

#[test]
fn moving_align_is_committed_each_frame() {
    let mut app = leg_ik_test_app(LatentProbeService::new(FlatGround::default(), 1));
    let entity = spawn_quadruped(&mut app);
    app.update();

    let next = Isometry3::translation(0.0, 0.0, 0.02);
    app.world_mut().get_mut::<CharacterMotion>(entity).unwrap().align = next;
    app.update();

    let motion = app.world().get::<CharacterMotion>(entity).unwrap();
    assert_eq!(motion.prev_align, next);
    assert!(!motion.discontinuity);
}
