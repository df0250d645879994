//! strider-core: types, config, springs, time and errors for strider leg IK.
//!
//! Everything here is shared by the ground model (`strider-ground`) and the
//! leg solver (`strider-ik`). The [`StriderCorePlugin`] registers the
//! configuration and frame clock resources and orders the [`StriderSet`]
//! system sets.

pub mod config;
pub mod error;
pub mod math;
pub mod spring;
pub mod time;
pub mod types;

use bevy::prelude::*;

use crate::config::LegIkConfig;
use crate::time::FrameClock;

// ---------------------------------------------------------------------------
// StriderSet
// ---------------------------------------------------------------------------

/// Per-frame ordering of leg-IK work.
///
/// `Prepare` advances the clock and takes animation input, `Solve` runs the
/// controllers, `Publish` hands results to later pose modifiers.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StriderSet {
    Prepare,
    Solve,
    Publish,
}

// ---------------------------------------------------------------------------
// StriderCorePlugin
// ---------------------------------------------------------------------------

pub struct StriderCorePlugin;

impl Plugin for StriderCorePlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<LegIkConfig>()
            .init_resource::<FrameClock>()
            .configure_sets(
                Update,
                (StriderSet::Prepare, StriderSet::Solve, StriderSet::Publish).chain(),
            )
            .add_systems(
                Update,
                time::frame_clock_system.in_set(StriderSet::Prepare),
            );
    }
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        StriderCorePlugin, StriderSet,
        config::{LegIkConfig, RootAggregation},
        error::{ConfigError, FaultLog, GroundFault, SetupError, StriderError},
        spring::SpringTracker,
        time::FrameClock,
        types::{FrameNumber, IkMode, JointIndex, LegCount, LegIndex, LegSet, Locator},
    };
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plugin_registers_resources() {
        let mut app = App::new();
        app.add_plugins(StriderCorePlugin);
        app.finish();
        app.cleanup();
        app.update();

        assert!(app.world().get_resource::<LegIkConfig>().is_some());
        let clock = app.world().resource::<FrameClock>();
        assert_eq!(clock.frame(), types::FrameNumber(1));
    }

    #[test]
    fn plugin_keeps_inserted_config() {
        let mut config = LegIkConfig::default();
        config.controller.fixed_dt = 0.01;

        let mut app = App::new();
        app.insert_resource(config);
        app.add_plugins(StriderCorePlugin);
        app.update();
        app.update();

        let clock = app.world().resource::<FrameClock>();
        assert_eq!(clock.frame(), types::FrameNumber(2));
        assert!((clock.dt() - 0.01).abs() < f32::EPSILON);
    }
}
