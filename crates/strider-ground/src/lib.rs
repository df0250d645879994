//! strider-ground: ground models built from asynchronous ray probes.
//!
//! A [`model::GroundSurfaceModel`] issues a line of downward probes through
//! a [`probe::ProbeService`] each frame, consumes the newest completed batch
//! and turns it into a [`hull::ConvexHull2D`] that answers height and normal
//! queries. [`terrain`] provides analytic samplers and a latent probe service
//! for driving the model without a physics engine.

pub mod hull;
pub mod model;
pub mod plane;
pub mod probe;
pub mod terrain;

pub mod prelude {
    pub use crate::{
        hull::ConvexHull2D,
        model::{GroundHit, GroundModelState, GroundSurfaceModel},
        plane::Plane,
        probe::{
            PendingProbePool, ProbeBatch, ProbeHandle, ProbePoll, ProbeRequest, ProbeResult,
            ProbeService,
        },
        terrain::{FlatGround, GroundSample, GroundSampler, HeightField, LatentProbeService},
    };
}
