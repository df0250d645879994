//! Shared root height adjustment.
//!
//! Every active leg proposes a raw root delta (how far its ankle target sits
//! above or below the animated ankle). The proposals are aggregated, smoothed
//! in absolute height by a critically-damped spring, clamped to what every
//! leg can reach, and applied once to the root.

use nalgebra::Point3;

use strider_core::config::{RootAdjustConfig, RootAggregation};
use strider_core::spring::SpringTracker;

/// Combine per-leg raw deltas. `None` when no leg contributed.
pub fn aggregate_raw_deltas(
    deltas: impl IntoIterator<Item = f32>,
    aggregation: RootAggregation,
) -> Option<f32> {
    let combine = match aggregation {
        RootAggregation::MostCompressed => f32::min,
        RootAggregation::MoveRootUp => f32::max,
    };
    deltas.into_iter().reduce(combine)
}

// ---------------------------------------------------------------------------
// RootDeltaLimits
// ---------------------------------------------------------------------------

/// Admissible root delta window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RootDeltaLimits {
    pub min: f32,
    pub max: f32,
}

impl RootDeltaLimits {
    pub const UNBOUNDED: Self = Self {
        min: f32::NEG_INFINITY,
        max: f32::INFINITY,
    };

    /// Window that keeps the hip-to-target distance of one leg within
    /// `[min_extension, max_extension] * reach` when the hip moves vertically.
    #[must_use]
    pub fn for_leg(
        hip: &Point3<f32>,
        target: &Point3<f32>,
        reach: f32,
        config: &RootAdjustConfig,
    ) -> Self {
        let dx = target.x - hip.x;
        let dz = target.z - hip.z;
        let horizontal_sq = dx.mul_add(dx, dz * dz);
        let rise = target.y - hip.y;
        let vertical = |extension: f32| {
            let r = extension * reach;
            (r.mul_add(r, -horizontal_sq)).max(0.0).sqrt()
        };
        Self {
            min: rise + vertical(config.min_extension),
            max: rise + vertical(config.max_extension),
        }
    }

    /// Window both limits allow. On conflict the over-extension bound wins.
    #[must_use]
    pub fn intersect(self, other: Self) -> Self {
        let max = self.max.min(other.max);
        let min = self.min.max(other.min).min(max);
        Self { min, max }
    }

    /// Limit both ends to `[-offset, offset]`.
    #[must_use]
    pub fn capped(self, offset: f32) -> Self {
        let max = self.max.clamp(-offset, offset);
        let min = self.min.clamp(-offset, offset).min(max);
        Self { min, max }
    }

    #[must_use]
    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }

    #[must_use]
    pub fn contains(&self, value: f32) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

// ---------------------------------------------------------------------------
// RootAdjustState
// ---------------------------------------------------------------------------

/// Per-character root smoothing state.
///
/// The spring runs on the absolute base height `align_y + raw_delta`, so the
/// character's own vertical travel is followed through a speed estimate
/// instead of being filtered as a delta change.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RootAdjustState {
    initialized: bool,
    smoothed_base_y: f32,
    base_speed: f32,
    last_align_y: f32,
    last_raw_delta: f32,
    root_delta: f32,
    speed_spring: SpringTracker<f32>,
    height_spring: SpringTracker<f32>,
}

impl RootAdjustState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Smoothed delta from the last update (before clamping and blending).
    #[must_use]
    pub const fn smoothed_delta(&self) -> f32 {
        self.root_delta
    }

    #[must_use]
    pub const fn last_raw_delta(&self) -> f32 {
        self.last_raw_delta
    }

    #[must_use]
    pub const fn vertical_speed(&self) -> f32 {
        self.base_speed
    }

    /// Track `raw_delta` for this frame and return the smoothed delta.
    ///
    /// `discontinuity` marks a step in `align_y` (stairs, teleport) that is
    /// carried over into the base height instead of being filtered.
    pub fn update(
        &mut self,
        align_y: f32,
        raw_delta: f32,
        dt: f32,
        discontinuity: bool,
        k_root: f32,
        k_speed: f32,
    ) -> f32 {
        let desired = align_y + raw_delta;
        if !self.initialized || dt <= 0.0 {
            self.initialized = true;
            self.smoothed_base_y = desired;
            self.base_speed = 0.0;
            self.speed_spring.reset();
            self.height_spring.reset();
        } else {
            let step = align_y - self.last_align_y;
            let measured = if discontinuity {
                self.smoothed_base_y += step;
                self.base_speed
            } else {
                step / dt
            };
            self.base_speed = self.speed_spring.track(self.base_speed, measured, dt, k_speed);
            if !discontinuity {
                self.smoothed_base_y += self.base_speed * dt;
            }
            self.smoothed_base_y =
                self.height_spring
                    .track(self.smoothed_base_y, desired, dt, k_root);
        }
        self.last_align_y = align_y;
        self.last_raw_delta = raw_delta;
        self.root_delta = self.smoothed_base_y - align_y;
        self.root_delta
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
