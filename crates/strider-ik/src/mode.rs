//! IK modes: blend bookkeeping and per-mode behaviors.
//!
//! ```text
//!  set_mode(m) ──► ModeBlend (weight seeks 0 or 1) ──► LegIkBehavior::for_mode(m)
//!                                                      │
//!        Freeze | Move | Melee | Scripted | ScriptedMove
//!                                                      ▼
//!                                        per-leg ankle target
//! ```
//!
//! Blending is independent of the behavior: switching modes keeps the
//! current weight and only changes the rate and the behavior that produces
//! ankle targets.

use nalgebra::{Point3, Vector3};

use strider_core::math::seek;
use strider_core::types::IkMode;

use crate::freeze::FreezeState;

/// Rate used for a zero blend time (1/s).
pub const INSTANT_BLEND_RATE: f32 = 100.0;

/// Blend rate for a blend time in seconds.
#[must_use]
pub fn blend_rate(blend_time: f32) -> f32 {
    if blend_time <= 0.0 {
        INSTANT_BLEND_RATE
    } else {
        blend_time.recip()
    }
}

// ---------------------------------------------------------------------------
// ModeBlend
// ---------------------------------------------------------------------------

/// Active mode and its output weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeBlend {
    mode: IkMode,
    weight: f32,
    rate: f32,
}

impl Default for ModeBlend {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeBlend {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            mode: IkMode::Disabled,
            weight: 0.0,
            rate: INSTANT_BLEND_RATE,
        }
    }

    #[must_use]
    pub const fn mode(&self) -> IkMode {
        self.mode
    }

    #[must_use]
    pub const fn weight(&self) -> f32 {
        self.weight
    }

    #[must_use]
    pub const fn rate(&self) -> f32 {
        self.rate
    }

    /// Switch to `mode`, keeping the current weight. Returns false if already
    /// active.
    pub fn set_mode(&mut self, mode: IkMode, blend_time: f32) -> bool {
        if mode == self.mode {
            return false;
        }
        self.mode = mode;
        self.rate = blend_rate(blend_time);
        true
    }

    /// Seek the weight toward 1 (enabled) or 0 (disabled).
    pub fn advance(&mut self, dt: f32) -> f32 {
        let target = if self.mode.is_enabled() { 1.0 } else { 0.0 };
        self.weight = seek(self.weight, target, self.rate * dt.max(0.0));
        self.weight
    }

    /// Disabled and fully blended out.
    #[must_use]
    pub fn is_fully_out(&self) -> bool {
        !self.mode.is_enabled() && self.weight <= 0.0
    }

    /// Drop straight to disabled with zero weight.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

// ---------------------------------------------------------------------------
// LegIkBehavior
// ---------------------------------------------------------------------------

/// Inputs for choosing one leg's ankle target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetContext {
    /// Animated ankle position.
    pub animated: Point3<f32>,
    /// Ankle position adapted to the ground model.
    pub grounded: Point3<f32>,
    /// Caller-supplied target, if any.
    pub scripted: Option<Point3<f32>>,
    /// Held target from a captured freeze, if any.
    pub frozen: Option<Point3<f32>>,
    /// Extra vertical offset for this foot.
    pub foot_delta: f32,
}

/// Per-mode strategy for ankle targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegIkBehavior {
    /// Adapt to the ground until captured, then hold.
    Freeze,
    /// Adapt to the ground along the sampling line.
    Move { predictive: bool },
    /// Move plus injected root and foot offsets.
    Melee,
    /// Caller targets; unscripted legs keep the animation.
    Scripted,
    /// Caller targets; unscripted legs adapt to the ground.
    ScriptedMove,
}

impl LegIkBehavior {
    #[must_use]
    pub const fn for_mode(mode: IkMode) -> Option<Self> {
        match mode {
            IkMode::Disabled => None,
            IkMode::Stopped => Some(Self::Freeze),
            IkMode::Moving => Some(Self::Move { predictive: true }),
            IkMode::MovingNonPredictive => Some(Self::Move { predictive: false }),
            IkMode::Melee => Some(Self::Melee),
            IkMode::Scripted => Some(Self::Scripted),
            IkMode::ScriptedMove => Some(Self::ScriptedMove),
        }
    }

    /// Called when the behavior becomes active.
    pub fn start(self, freeze: &mut FreezeState) {
        if self == Self::Freeze {
            freeze.request_capture();
        }
    }

    /// Whether the sampling line is shifted ahead by the character velocity.
    #[must_use]
    pub const fn is_predictive(self) -> bool {
        matches!(self, Self::Move { predictive: true } | Self::Melee)
    }

    #[must_use]
    pub const fn uses_melee_offsets(self) -> bool {
        matches!(self, Self::Melee)
    }

    /// Ankle target for one leg.
    #[must_use]
    pub fn ankle_target(self, ctx: &TargetContext) -> Point3<f32> {
        match self {
            Self::Freeze => ctx.frozen.unwrap_or(ctx.grounded),
            Self::Move { .. } => ctx.grounded,
            Self::Melee => ctx.grounded + Vector3::y() * ctx.foot_delta,
            Self::Scripted => ctx.scripted.unwrap_or(ctx.animated),
            Self::ScriptedMove => ctx.scripted.unwrap_or(ctx.grounded),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
