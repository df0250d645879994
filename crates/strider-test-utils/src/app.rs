//! Bevy test app builders with various plugin combinations.

use bevy::prelude::*;
use strider_ground::probe::ProbeService;
use strider_ik::plugin::ProbeServiceResource;

/// Create a minimal test app with only the core plugin.
///
/// Provides `StriderSet` ordering, the config and the frame clock but no
/// leg IK systems.
pub fn minimal_test_app() -> App {
    let mut app = App::new();
    app.add_plugins(strider_core::StriderCorePlugin);
    app.finish();
    app.cleanup();
    app
}

/// Create an app with the core and leg IK plugins and `service` installed as
/// the probe backend.
pub fn leg_ik_test_app(service: impl ProbeService + Send + Sync + 'static) -> App {
    let mut app = App::new();
    app.add_plugins(strider_core::StriderCorePlugin);
    app.add_plugins(strider_ik::StriderIkPlugin);
    app.insert_resource(ProbeServiceResource::new(service));
    app.finish();
    app.cleanup();
    app
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use strider_core::time::FrameClock;
    use strider_ground::terrain::{FlatGround, LatentProbeService};

    #[test]
    fn minimal_app_builds() {
        let mut app = minimal_test_app();
        app.update();
        assert!(app.world().get_resource::<FrameClock>().is_some());
    }

    #[test]
    fn leg_ik_app_has_service() {
        let mut app = leg_ik_test_app(LatentProbeService::new(FlatGround::default(), 1));
        app.update();
        assert!(app.world().get_resource::<ProbeServiceResource>().is_some());
    }
}
