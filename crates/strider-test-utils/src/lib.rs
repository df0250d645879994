//! Shared test fixtures and utilities for strider crates.
//!
//! Provides Bevy test app builders, biped and quadruped skeletons bound to
//! the stock joint-name presets, scripted probe services and deterministic
//! RNG setup.

pub mod app;
pub mod probes;
pub mod rng;
pub mod skeletons;

// ---------------------------------------------------------------------------
// Re-exports for convenience
// ---------------------------------------------------------------------------

pub use app::{leg_ik_test_app, minimal_test_app};
pub use probes::{ScriptedProbeService, StepGround};
pub use rng::seeded_rng;
pub use skeletons::{biped_controller, biped_skeleton, quadruped_controller, quadruped_skeleton};
