//! Bevy ECS integration for leg IK.
//!
//! Provides [`StriderIkPlugin`], which runs every rigged character's
//! [`LegIkController`] once per frame and publishes its results.
//!
//! # Usage
//!
//! 1. Add `StriderCorePlugin` and [`StriderIkPlugin`] to your app.
//! 2. Insert a [`ProbeServiceResource`] wrapping your ray-probe backend.
//! 3. Spawn characters with a [`LegIkRigBundle`]; write the animated pose
//!    into [`AnimatedPose`] and the align into [`CharacterMotion`] each frame.
//! 4. Read the adjusted [`SkeletonPose`] and [`LegIkOutputs`] afterwards.
//!
//! The solve system runs in [`StriderSet::Solve`] and only when a probe
//! service is present; outputs are copied in [`StriderSet::Publish`].

use bevy::prelude::*;
use nalgebra::{Isometry3, Vector3};

use strider_core::StriderSet;
use strider_core::error::FaultLog;
use strider_core::time::FrameClock;
use strider_core::types::{FrameNumber, IkMode, LegIndex, MAX_LEGS};
use strider_ground::probe::ProbeService;

use crate::controller::{FrameInput, LegIkController};
use crate::pose::SkeletonPose;

/// Bevy plugin that adds the leg IK solve and publish systems.
pub struct StriderIkPlugin;

impl Plugin for StriderIkPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            Update,
            leg_ik_solve_system
                .in_set(StriderSet::Solve)
                .run_if(resource_exists::<ProbeServiceResource>),
        )
        .add_systems(Update, leg_ik_publish_system.in_set(StriderSet::Publish));
    }
}

// ---------------------------------------------------------------------------
// Resources and components
// ---------------------------------------------------------------------------

/// The shared ray-probe backend.
#[derive(Resource)]
pub struct ProbeServiceResource(pub Box<dyn ProbeService + Send + Sync>);

impl ProbeServiceResource {
    pub fn new(service: impl ProbeService + Send + Sync + 'static) -> Self {
        Self(Box::new(service))
    }
}

/// A character's leg IK controller.
#[derive(Component, Debug, Clone)]
pub struct LegIkRig {
    pub controller: LegIkController,
}

/// Pose from animation, before leg IK. Copied into [`SkeletonPose`] every
/// solve.
#[derive(Component, Debug, Clone, Default, PartialEq)]
pub struct AnimatedPose(pub SkeletonPose);

/// Character align and velocity for the current frame.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct CharacterMotion {
    pub align: Isometry3<f32>,
    pub prev_align: Isometry3<f32>,
    pub velocity: Vector3<f32>,
    /// Set for a frame on stairs or teleports; cleared after the solve.
    pub discontinuity: bool,
}

impl Default for CharacterMotion {
    fn default() -> Self {
        Self::at(Isometry3::identity())
    }
}

impl CharacterMotion {
    #[must_use]
    pub fn at(align: Isometry3<f32>) -> Self {
        Self {
            align,
            prev_align: align,
            velocity: Vector3::zeros(),
            discontinuity: false,
        }
    }

    #[must_use]
    pub fn frame_input(&self, frame: FrameNumber, dt: f32) -> FrameInput {
        FrameInput::new(frame, dt, self.align)
            .with_previous(self.prev_align)
            .with_velocity(self.velocity)
            .with_discontinuity(self.discontinuity)
    }

    /// Roll the current align into the previous one.
    pub fn commit(&mut self) {
        self.prev_align = self.align;
        self.discontinuity = false;
    }
}

/// Per-frame results for gameplay and later pose modifiers.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct LegIkOutputs {
    pub root_delta: f32,
    pub on_ground: [bool; MAX_LEGS],
    pub ground_normals: [Vector3<f32>; MAX_LEGS],
    pub mode: IkMode,
    pub blend_weight: f32,
    pub faults: FaultLog,
}

impl Default for LegIkOutputs {
    fn default() -> Self {
        Self {
            root_delta: 0.0,
            on_ground: [true; MAX_LEGS],
            ground_normals: [Vector3::y(); MAX_LEGS],
            mode: IkMode::Disabled,
            blend_weight: 0.0,
            faults: FaultLog::default(),
        }
    }
}

impl LegIkOutputs {
    #[must_use]
    pub const fn on_ground(&self, leg: LegIndex) -> bool {
        self.on_ground[leg.index()]
    }

    #[must_use]
    pub const fn ground_normal(&self, leg: LegIndex) -> Vector3<f32> {
        self.ground_normals[leg.index()]
    }
}

/// Everything a rigged character needs.
#[derive(Bundle)]
pub struct LegIkRigBundle {
    pub rig: LegIkRig,
    pub animated: AnimatedPose,
    pub pose: SkeletonPose,
    pub motion: CharacterMotion,
    pub outputs: LegIkOutputs,
}

impl LegIkRigBundle {
    /// Rig over `skeleton`, which is also the initial animated pose.
    #[must_use]
    pub fn new(controller: LegIkController, skeleton: SkeletonPose, motion: CharacterMotion) -> Self {
        Self {
            rig: LegIkRig { controller },
            animated: AnimatedPose(skeleton.clone()),
            pose: skeleton,
            motion,
            outputs: LegIkOutputs::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Systems
// ---------------------------------------------------------------------------

/// Run each character's controller on its animated pose.
#[allow(clippy::needless_pass_by_value)]
pub fn leg_ik_solve_system(
    clock: Res<FrameClock>,
    mut service: ResMut<ProbeServiceResource>,
    mut rigs: Query<(&mut LegIkRig, &AnimatedPose, &mut SkeletonPose, &mut CharacterMotion)>,
) {
    for (mut rig, animated, mut pose, mut motion) in &mut rigs {
        pose.clone_from(&animated.0);
        let input = motion.frame_input(clock.frame(), clock.dt());
        rig.controller.update(&mut *pose, &mut *service.0, &input);
        motion.commit();
    }
}

/// Copy controller results into [`LegIkOutputs`].
pub fn leg_ik_publish_system(mut rigs: Query<(&LegIkRig, &mut LegIkOutputs)>) {
    for (rig, mut outputs) in &mut rigs {
        let ctrl = &rig.controller;
        let mut next = LegIkOutputs {
            root_delta: ctrl.root_delta(),
            mode: ctrl.mode(),
            blend_weight: ctrl.blend_weight(),
            faults: *ctrl.faults(),
            ..LegIkOutputs::default()
        };
        for leg in LegIndex::ALL.into_iter().take(ctrl.leg_count().get()) {
            next.on_ground[leg.index()] = ctrl.on_ground(leg);
            next.ground_normals[leg.index()] = ctrl.ground_normal(leg);
        }
        outputs.set_if_neq(next);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point3;
    use strider_core::StriderCorePlugin;
    use strider_core::config::LegIkConfig;
    use strider_ground::terrain::{FlatGround, LatentProbeService};

    use crate::chain::LegJointNames;
    use crate::pose::JointPose;

    fn biped() -> SkeletonPose {
        let mut pose = SkeletonPose::new();
        let root = pose.add_joint_at("root", None, Point3::new(0.0, 1.0, 0.0));
        for (side, x) in [("l", 0.1), ("r", -0.1)] {
            let hip = pose.add_joint_at(format!("{side}_upper_leg"), Some(root), Point3::new(x, 0.9, 0.0));
            let knee = pose.add_joint_at(format!("{side}_knee"), Some(hip), Point3::new(x, 0.52, 0.04));
            let ankle = pose.add_joint_at(format!("{side}_ankle"), Some(knee), Point3::new(x, 0.1, 0.0));
            pose.add_joint_at(format!("{side}_heel"), Some(ankle), Point3::new(x, 0.02, -0.05));
            pose.add_joint_at(format!("{side}_ball"), Some(ankle), Point3::new(x, 0.02, 0.12));
        }
        pose
    }

    fn app() -> App {
        let mut app = App::new();
        app.add_plugins(StriderCorePlugin);
        app.add_plugins(StriderIkPlugin);
        app.finish();
        app.cleanup();
        app
    }

    fn spawn_biped(app: &mut App, mode: IkMode) -> Entity {
        let skeleton = biped();
        let mut controller =
            LegIkController::from_skeleton(LegIkConfig::default(), &LegJointNames::human(), &skeleton)
                .unwrap();
        controller.set_mode_with_blend(mode, 0.0);
        app.world_mut()
            .spawn(LegIkRigBundle::new(controller, skeleton, CharacterMotion::default()))
            .id()
    }

    #[test]
    fn plugin_builds() {
        let mut app = app();
        app.update();
        assert!(app.world().get_resource::<FrameClock>().is_some());
    }

    #[test]
    fn solve_waits_for_probe_service() {
        let mut app = app();
        let entity = spawn_biped(&mut app, IkMode::Moving);
        for _ in 0..10 {
            app.update();
        }
        let pose = app.world().get::<SkeletonPose>(entity).unwrap();
        assert_eq!(*pose, biped());
    }

    #[test]
    fn solve_system_writes_adjusted_pose() {
        let mut app = app();
        app.insert_resource(ProbeServiceResource::new(LatentProbeService::new(
            FlatGround { height: 0.1 },
            1,
        )));
        let entity = spawn_biped(&mut app, IkMode::MovingNonPredictive);
        for _ in 0..240 {
            app.update();
        }

        let world = app.world();
        let rig = world.get::<LegIkRig>(entity).unwrap();
        let pose = world.get::<SkeletonPose>(entity).unwrap();
        let ankle = rig.controller.topology().chain(LegIndex::BackLeft).ankle(pose);
        assert_relative_eq!(ankle.y, 0.2, epsilon = 2e-3);

        let root = pose.find_joint("root").unwrap();
        let outputs = world.get::<LegIkOutputs>(entity).unwrap();
        assert_relative_eq!(pose.position(root).y, 1.0 + outputs.root_delta, epsilon = 1e-5);
        assert!(outputs.root_delta > 0.05);
        assert!(outputs.on_ground(LegIndex::BackRight));
        assert_eq!(outputs.mode, IkMode::MovingNonPredictive);
        assert_relative_eq!(outputs.blend_weight, 1.0);

        // The animated input is never modified.
        assert_eq!(world.get::<AnimatedPose>(entity).unwrap().0, biped());
    }

    #[test]
    fn motion_commits_previous_align() {
        let mut motion = CharacterMotion::default();
        motion.align = Isometry3::translation(0.0, 0.2, 0.1);
        motion.discontinuity = true;
        let input = motion.frame_input(FrameNumber(3), 0.1);
        assert!(input.discontinuity);
        assert_relative_eq!(input.prev_align.translation.vector.y, 0.0);

        motion.commit();
        assert_eq!(motion.prev_align, motion.align);
        assert!(!motion.discontinuity);
    }
}
