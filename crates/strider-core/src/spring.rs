//! Critically-damped spring tracking.
//!
//! A [`SpringTracker`] pulls a value toward a target without overshoot.
//! The update uses the closed-form solution of
//! `x'' = -k (x - target) - 2 sqrt(k) x'`, so the result does not depend on
//! how a time span is split into frames.

use std::ops::{Add, Mul, Sub};

use nalgebra::Vector3;

/// Values a spring can track.
pub trait SpringValue: Copy + Add<Output = Self> + Sub<Output = Self> + Mul<f32, Output = Self> {
    fn zero() -> Self;
}

impl SpringValue for f32 {
    fn zero() -> Self {
        0.0
    }
}

impl SpringValue for Vector3<f32> {
    fn zero() -> Self {
        Self::zeros()
    }
}

/// Critically-damped spring state (the tracked value's velocity).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpringTracker<T> {
    velocity: T,
}

impl<T: SpringValue> Default for SpringTracker<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: SpringValue> SpringTracker<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            velocity: T::zero(),
        }
    }

    #[must_use]
    pub const fn velocity(&self) -> T {
        self.velocity
    }

    pub fn reset(&mut self) {
        self.velocity = T::zero();
    }

    /// Advance `current` toward `target` over `dt` seconds with stiffness `k`.
    ///
    /// Returns the new value. A non-positive `dt` or `k` leaves the value
    /// unchanged.
    pub fn track(&mut self, current: T, target: T, dt: f32, k: f32) -> T {
        if dt <= 0.0 || k <= 0.0 {
            return current;
        }
        let omega = k.sqrt();
        let decay = (-omega * dt).exp();
        let offset = current - target;
        let c = self.velocity + offset * omega;
        self.velocity = (self.velocity - c * (omega * dt)) * decay;
        target + (offset + c * dt) * decay
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
