//! Leg IK ground adaptation for strider characters.
//!
//! Binds a leg rig to a skeleton, adapts the animated ankles to a
//! probe-built ground model, shares one smoothed root height offset between
//! the legs and solves each leg with a closed-form two-bone solve.
//!
//! # Architecture
//!
//! ```text
//! SkeletonPose + LegJointNames ──► LegTopology ──► LegIkController
//!                                                      │
//!              GroundSurfaceModel ◄── ProbeService     │ per frame
//!                                                      ▼
//!             ModeBlend / LegIkBehavior ──► RootAdjustState ──► solve_two_bone
//! ```
//!
//! The controller is usable on its own; [`StriderIkPlugin`] runs it for
//! every rigged entity in a Bevy app.

pub mod chain;
pub mod controller;
pub mod freeze;
pub mod mode;
pub mod plugin;
pub mod pose;
pub mod root;
pub mod solver;

pub use chain::{LegIkChain, LegJointNames, LegTopology};
pub use controller::{FrameInput, LegIkController};
pub use plugin::StriderIkPlugin;
pub use pose::{JointPose, SkeletonPose};

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        chain::{LegIkChain, LegJoint, LegJointNames, LegJoints, LegNames, LegTopology},
        controller::{FrameInput, LegIkController, LegState},
        freeze::FreezeState,
        mode::{LegIkBehavior, ModeBlend},
        plugin::{
            AnimatedPose, CharacterMotion, LegIkOutputs, LegIkRig, LegIkRigBundle,
            ProbeServiceResource, StriderIkPlugin,
        },
        pose::{JointPose, SkeletonPose},
        root::{RootAdjustState, RootDeltaLimits},
        solver::{TwoBoneOutcome, solve_two_bone},
    };
}
