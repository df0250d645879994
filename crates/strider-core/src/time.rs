use bevy::prelude::{Res, ResMut, Resource};

use crate::config::LegIkConfig;
use crate::types::FrameNumber;

// ---------------------------------------------------------------------------
// FrameClock
// ---------------------------------------------------------------------------

/// Frame counter and step size for the current update.
///
/// Advanced once per app update by [`frame_clock_system`]; characters read
/// it to tag probe batches and to integrate springs.
#[derive(Debug, Clone, Copy, PartialEq, Resource)]
pub struct FrameClock {
    frame: FrameNumber,
    dt: f32,
    elapsed: f64,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            frame: FrameNumber(0),
            dt: 0.0,
            elapsed: 0.0,
        }
    }

    #[must_use]
    pub const fn frame(&self) -> FrameNumber {
        self.frame
    }

    /// Step size of the most recent advance, in seconds.
    #[must_use]
    pub const fn dt(&self) -> f32 {
        self.dt
    }

    #[must_use]
    pub const fn elapsed_secs(&self) -> f64 {
        self.elapsed
    }

    /// Move to the next frame.
    pub fn advance(&mut self, dt: f32) {
        self.frame = self.frame.next();
        self.dt = dt.max(0.0);
        self.elapsed += f64::from(self.dt);
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Advance [`FrameClock`] by the configured fixed step.
#[allow(clippy::needless_pass_by_value)]
pub fn frame_clock_system(mut clock: ResMut<FrameClock>, config: Res<LegIkConfig>) {
    clock.advance(config.controller.fixed_dt);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
