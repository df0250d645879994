//! World-space joint access.
//!
//! [`JointPose`] is the seam between the leg solver and whatever owns the
//! animated skeleton. [`SkeletonPose`] is the in-crate implementation: a flat
//! joint table with names, parents and world-space locators.

use bevy::prelude::Component;
use nalgebra::{Point3, Translation3, UnitQuaternion, Vector3};

use strider_core::types::{JointIndex, Locator};

/// Read and write world-space joint locators by index.
///
/// Indices come from setup-time name lookup and must be in range.
pub trait JointPose {
    fn joint_count(&self) -> usize;

    fn locator(&self, joint: JointIndex) -> Locator;

    fn set_locator(&mut self, joint: JointIndex, locator: Locator);

    /// Parent of `joint`, if the pose tracks hierarchy.
    fn parent(&self, _joint: JointIndex) -> Option<JointIndex> {
        None
    }

    fn position(&self, joint: JointIndex) -> Point3<f32> {
        Point3::from(self.locator(joint).translation.vector)
    }

    /// Whether `joint` is `ancestor` or below it.
    fn is_in_subtree(&self, joint: JointIndex, ancestor: JointIndex) -> bool {
        let mut current = Some(joint);
        while let Some(j) = current {
            if j == ancestor {
                return true;
            }
            current = self.parent(j);
        }
        false
    }

    /// Rotate `joint` and its subtree about a world-space pivot.
    fn rotate_about(&mut self, joint: JointIndex, pivot: &Point3<f32>, rotation: &UnitQuaternion<f32>) {
        for raw in 0..self.joint_count() {
            let Ok(raw) = u16::try_from(raw) else {
                break;
            };
            let j = JointIndex(raw);
            if !self.is_in_subtree(j, joint) {
                continue;
            }
            let loc = self.locator(j);
            let p = Point3::from(loc.translation.vector);
            let moved = pivot + rotation * (p - pivot);
            self.set_locator(
                j,
                Locator::from_parts(Translation3::from(moved.coords), rotation * loc.rotation),
            );
        }
    }

    /// Translate `joint` and its subtree.
    fn translate(&mut self, joint: JointIndex, offset: &Vector3<f32>) {
        for raw in 0..self.joint_count() {
            let Ok(raw) = u16::try_from(raw) else {
                break;
            };
            let j = JointIndex(raw);
            if self.is_in_subtree(j, joint) {
                let mut loc = self.locator(j);
                loc.translation.vector += offset;
                self.set_locator(j, loc);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SkeletonPose
// ---------------------------------------------------------------------------

/// Flat joint table in world space. Parents precede their children.
#[derive(Component, Debug, Clone, Default, PartialEq)]
pub struct SkeletonPose {
    names: Vec<String>,
    parents: Vec<Option<JointIndex>>,
    locators: Vec<Locator>,
}

impl SkeletonPose {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a joint and return its index.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is not an existing joint or the table is full.
    pub fn add_joint(
        &mut self,
        name: impl Into<String>,
        parent: Option<JointIndex>,
        locator: Locator,
    ) -> JointIndex {
        if let Some(p) = parent {
            assert!(p.as_usize() < self.locators.len(), "parent must precede child");
        }
        let count = self.locators.len();
        assert!(count < usize::from(u16::MAX), "joint table full");
        #[allow(clippy::cast_possible_truncation)]
        let index = JointIndex(count as u16);
        self.names.push(name.into());
        self.parents.push(parent);
        self.locators.push(locator);
        index
    }

    /// Joint with an identity rotation at `position`.
    pub fn add_joint_at(
        &mut self,
        name: impl Into<String>,
        parent: Option<JointIndex>,
        position: Point3<f32>,
    ) -> JointIndex {
        self.add_joint(
            name,
            parent,
            Locator::from_parts(Translation3::from(position.coords), UnitQuaternion::identity()),
        )
    }

    #[must_use]
    pub fn find_joint(&self, name: &str) -> Option<JointIndex> {
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|i| u16::try_from(i).ok())
            .map(JointIndex)
    }

    #[must_use]
    pub fn name(&self, joint: JointIndex) -> Option<&str> {
        self.names.get(joint.as_usize()).map(String::as_str)
    }

    #[must_use]
    pub fn locators(&self) -> &[Locator] {
        &self.locators
    }

    /// Rotate a joint in place (about its own position), carrying its subtree.
    pub fn rotate_joint_ws(&mut self, joint: JointIndex, rotation: &UnitQuaternion<f32>) {
        let pivot = self.position(joint);
        self.rotate_about(joint, &pivot, rotation);
    }

    /// Move the whole skeleton rigidly.
    pub fn transform_all(&mut self, transform: &Locator) {
        for loc in &mut self.locators {
            *loc = transform * *loc;
        }
    }
}

impl JointPose for SkeletonPose {
    fn joint_count(&self) -> usize {
        self.locators.len()
    }

    fn locator(&self, joint: JointIndex) -> Locator {
        self.locators[joint.as_usize()]
    }

    fn set_locator(&mut self, joint: JointIndex, locator: Locator) {
        self.locators[joint.as_usize()] = locator;
    }

    fn parent(&self, joint: JointIndex) -> Option<JointIndex> {
        self.parents.get(joint.as_usize()).copied().flatten()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
