//! Held foot placement.
//!
//! A capture stores each leg's ankle target relative to the character's
//! align. While frozen, the held offsets are mapped back through the current
//! align every frame, so new ground samples do not move the feet.

use nalgebra::{Isometry3, Point3, Vector3};
use tracing::debug;

use strider_core::types::{LegCount, LegIndex, LegSet};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FreezeState {
    offsets: LegSet<Option<Vector3<f32>>>,
    capture_pending: bool,
}

impl FreezeState {
    #[must_use]
    pub fn new(count: LegCount) -> Self {
        Self {
            offsets: LegSet::splat(count, None),
            capture_pending: false,
        }
    }

    /// Capture again on the next frame with valid ground.
    pub fn request_capture(&mut self) {
        self.capture_pending = true;
    }

    #[must_use]
    pub const fn is_capture_pending(&self) -> bool {
        self.capture_pending
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.offsets.as_slice().iter().any(Option::is_some)
    }

    /// Forget every held offset and any pending capture.
    pub fn release(&mut self) {
        for (_, offset) in self.offsets.iter_mut() {
            *offset = None;
        }
        self.capture_pending = false;
    }

    /// Store `targets` (world space) relative to `align` if a capture is
    /// pending. Returns true when a capture happened.
    pub fn try_capture(&mut self, align: &Isometry3<f32>, targets: &LegSet<Point3<f32>>) -> bool {
        if !self.capture_pending {
            return false;
        }
        for (leg, target) in targets.iter() {
            self.offsets[leg] = Some(align.inverse_transform_point(target).coords);
        }
        self.capture_pending = false;
        debug!(legs = targets.len(), "foot placement frozen");
        true
    }

    /// Align-relative offset held for `leg`.
    #[must_use]
    pub fn offset(&self, leg: LegIndex) -> Option<Vector3<f32>> {
        self.offsets[leg]
    }

    /// World-space target held for `leg` under the current `align`.
    #[must_use]
    pub fn held_target(&self, leg: LegIndex, align: &Isometry3<f32>) -> Option<Point3<f32>> {
        self.offsets[leg].map(|offset| align * Point3::from(offset))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
