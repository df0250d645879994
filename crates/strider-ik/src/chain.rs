//! Leg topology bound to a skeleton.
//!
//! A [`LegTopology`] is resolved once from a [`LegJointNames`] preset and a
//! [`SkeletonPose`]. Each leg becomes a [`LegIkChain`]: joint indices plus
//! the static bone lengths measured from the bind pose.

use nalgebra::{Point3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use strider_core::error::SetupError;
use strider_core::math::EPSILON;
use strider_core::types::{JointIndex, LegCount, LegIndex, LegSet, MAX_LEGS};

use crate::pose::{JointPose, SkeletonPose};

/// Joints a leg chain is made of, root first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LegJoint {
    Root,
    Hip,
    Knee,
    Ankle,
    Heel,
    Ball,
}

impl LegJoint {
    pub const ALL: [Self; 6] = [
        Self::Root,
        Self::Hip,
        Self::Knee,
        Self::Ankle,
        Self::Heel,
        Self::Ball,
    ];
}

// ---------------------------------------------------------------------------
// Joint names
// ---------------------------------------------------------------------------

/// Skeleton joint names for one leg. Rigs without a heel leave it `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegNames {
    pub root: String,
    pub hip: String,
    pub knee: String,
    pub ankle: String,
    #[serde(default)]
    pub heel: Option<String>,
    pub ball: String,
}

impl LegNames {
    fn new(root: &str, hip: &str, knee: &str, ankle: &str, heel: Option<&str>, ball: &str) -> Self {
        Self {
            root: root.into(),
            hip: hip.into(),
            knee: knee.into(),
            ankle: ankle.into(),
            heel: heel.map(Into::into),
            ball: ball.into(),
        }
    }
}

/// Per-leg joint names in [`LegIndex`] order (2 or 4 legs).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegJointNames {
    pub legs: Vec<LegNames>,
}

impl LegJointNames {
    #[must_use]
    pub fn human() -> Self {
        Self {
            legs: vec![
                LegNames::new("root", "l_upper_leg", "l_knee", "l_ankle", Some("l_heel"), "l_ball"),
                LegNames::new("root", "r_upper_leg", "r_knee", "r_ankle", Some("r_heel"), "r_ball"),
            ],
        }
    }

    /// Hind legs first, then the forelegs.
    #[must_use]
    pub fn horse() -> Self {
        Self {
            legs: vec![
                LegNames::new("root", "l_hip", "l_knee", "l_ankle", None, "l_toeEnd"),
                LegNames::new("root", "r_hip", "r_knee", "r_ankle", None, "r_toeEnd"),
                LegNames::new("root", "l_shoulder", "l_elbow", "l_hand", None, "l_fingerEnd"),
                LegNames::new("root", "r_shoulder", "r_elbow", "r_hand", None, "r_fingerEnd"),
            ],
        }
    }

    /// Dog rigs share the horse joint naming.
    #[must_use]
    pub fn dog() -> Self {
        Self::horse()
    }
}

// ---------------------------------------------------------------------------
// LegIkChain
// ---------------------------------------------------------------------------

/// Resolved joint indices of one leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegJoints {
    pub root: JointIndex,
    pub hip: JointIndex,
    pub knee: JointIndex,
    pub ankle: JointIndex,
    pub heel: Option<JointIndex>,
    pub ball: JointIndex,
}

/// One leg: joints, static bone lengths and the hip forward axis.
///
/// The chain holds no pose data; every accessor reads the live pose it is
/// given, and only the solve step writes to it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegIkChain {
    leg: LegIndex,
    joints: LegJoints,
    thigh_length: f32,
    shin_length: f32,
    /// Hip-local axis the leg faces along.
    hip_forward_axis: Vector3<f32>,
}

impl LegIkChain {
    fn resolve(leg: LegIndex, names: &LegNames, skeleton: &SkeletonPose) -> Result<Self, SetupError> {
        let find = |name: &str| {
            skeleton
                .find_joint(name)
                .ok_or_else(|| SetupError::MissingJoint(name.to_owned()))
        };
        let joints = LegJoints {
            root: find(&names.root)?,
            hip: find(&names.hip)?,
            knee: find(&names.knee)?,
            ankle: find(&names.ankle)?,
            heel: names.heel.as_deref().map(find).transpose()?,
            ball: find(&names.ball)?,
        };
        Self::from_joints(leg, joints, skeleton)
    }

    /// Chain over already-resolved joints; bone lengths come from `pose`.
    pub fn from_joints(
        leg: LegIndex,
        joints: LegJoints,
        pose: &impl JointPose,
    ) -> Result<Self, SetupError> {
        let count = pose.joint_count();
        for index in [joints.root, joints.hip, joints.knee, joints.ankle, joints.ball]
            .into_iter()
            .chain(joints.heel)
        {
            if index.as_usize() >= count {
                return Err(SetupError::JointOutOfRange {
                    index: index.as_usize(),
                    count,
                });
            }
        }
        let thigh_length = (pose.position(joints.knee) - pose.position(joints.hip)).norm();
        let shin_length = (pose.position(joints.ankle) - pose.position(joints.knee)).norm();
        if thigh_length < EPSILON {
            return Err(SetupError::ZeroLengthBone { leg, bone: "thigh" });
        }
        if shin_length < EPSILON {
            return Err(SetupError::ZeroLengthBone { leg, bone: "shin" });
        }
        Ok(Self {
            leg,
            joints,
            thigh_length,
            shin_length,
            hip_forward_axis: Vector3::z(),
        })
    }

    #[must_use]
    pub const fn leg(&self) -> LegIndex {
        self.leg
    }

    #[must_use]
    pub const fn joints(&self) -> &LegJoints {
        &self.joints
    }

    #[must_use]
    pub const fn thigh_length(&self) -> f32 {
        self.thigh_length
    }

    #[must_use]
    pub const fn shin_length(&self) -> f32 {
        self.shin_length
    }

    /// Fully extended hip-to-ankle distance.
    #[must_use]
    pub fn reach(&self) -> f32 {
        self.thigh_length + self.shin_length
    }

    #[must_use]
    pub const fn joint(&self, joint: LegJoint) -> Option<JointIndex> {
        match joint {
            LegJoint::Root => Some(self.joints.root),
            LegJoint::Hip => Some(self.joints.hip),
            LegJoint::Knee => Some(self.joints.knee),
            LegJoint::Ankle => Some(self.joints.ankle),
            LegJoint::Heel => self.joints.heel,
            LegJoint::Ball => Some(self.joints.ball),
        }
    }

    pub fn position<P: JointPose + ?Sized>(&self, pose: &P, joint: LegJoint) -> Option<Point3<f32>> {
        self.joint(joint).map(|j| pose.position(j))
    }

    pub fn hip<P: JointPose + ?Sized>(&self, pose: &P) -> Point3<f32> {
        pose.position(self.joints.hip)
    }

    pub fn knee<P: JointPose + ?Sized>(&self, pose: &P) -> Point3<f32> {
        pose.position(self.joints.knee)
    }

    pub fn ankle<P: JointPose + ?Sized>(&self, pose: &P) -> Point3<f32> {
        pose.position(self.joints.ankle)
    }

    /// Hip forward axis in world space.
    pub fn hip_forward<P: JointPose + ?Sized>(&self, pose: &P) -> Vector3<f32> {
        pose.locator(self.joints.hip).rotation * self.hip_forward_axis
    }

    #[must_use]
    pub fn with_hip_forward_axis(mut self, axis: Vector3<f32>) -> Self {
        self.hip_forward_axis = axis;
        self
    }

    /// Rotate the shin (knee and everything below) about the knee.
    pub fn rotate_knee<P: JointPose + ?Sized>(&self, pose: &mut P, rotation: &UnitQuaternion<f32>) {
        let pivot = self.knee(pose);
        pose.rotate_about(self.joints.knee, &pivot, rotation);
    }

    /// Rotate the whole leg about the hip.
    pub fn rotate_hip<P: JointPose + ?Sized>(&self, pose: &mut P, rotation: &UnitQuaternion<f32>) {
        let pivot = self.hip(pose);
        pose.rotate_about(self.joints.hip, &pivot, rotation);
    }
}

// ---------------------------------------------------------------------------
// LegTopology
// ---------------------------------------------------------------------------

/// Every leg of one character, resolved against its skeleton.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegTopology {
    chains: LegSet<LegIkChain>,
}

impl LegTopology {
    /// Resolve joint names and measure bone lengths from the bind pose.
    pub fn from_skeleton(names: &LegJointNames, skeleton: &SkeletonPose) -> Result<Self, SetupError> {
        let count = LegCount::from_count(names.legs.len())
            .ok_or(SetupError::LegCount(names.legs.len()))?;
        let mut resolved: [Option<LegIkChain>; MAX_LEGS] = [None; MAX_LEGS];
        for (leg, leg_names) in LegIndex::ALL.into_iter().zip(&names.legs) {
            resolved[leg.index()] = Some(LegIkChain::resolve(leg, leg_names, skeleton)?);
        }
        Self::from_chains(count, &resolved)
    }

    /// Topology over prebuilt chains; slot `i` holds leg `LegIndex::ALL[i]`.
    pub fn from_chains(
        count: LegCount,
        chains: &[Option<LegIkChain>; MAX_LEGS],
    ) -> Result<Self, SetupError> {
        let present = chains.iter().take(count.get()).filter(|c| c.is_some()).count();
        let Some(first) = chains[0].filter(|_| present == count.get()) else {
            return Err(SetupError::LegCount(present));
        };
        Ok(Self {
            chains: LegSet::from_fn(count, |leg| chains[leg.index()].unwrap_or(first)),
        })
    }

    #[must_use]
    pub const fn leg_count(&self) -> LegCount {
        self.chains.count()
    }

    #[must_use]
    pub fn chain(&self, leg: LegIndex) -> &LegIkChain {
        &self.chains[leg]
    }

    #[must_use]
    pub const fn chains(&self) -> &LegSet<LegIkChain> {
        &self.chains
    }

    /// Use `axis` (hip-local) as every leg's forward axis.
    #[must_use]
    pub fn with_hip_forward_axis(mut self, axis: Vector3<f32>) -> Self {
        for (_, chain) in self.chains.iter_mut() {
            *chain = chain.with_hip_forward_axis(axis);
        }
        self
    }

    /// Distinct root joints across active legs.
    pub fn roots(&self) -> impl Iterator<Item = JointIndex> + '_ {
        self.chains
            .iter()
            .enumerate()
            .filter(|(i, (_, chain))| {
                self.chains.as_slice()[..*i]
                    .iter()
                    .all(|earlier| earlier.joints.root != chain.joints.root)
            })
            .map(|(_, (_, chain))| chain.joints.root)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn human_skeleton(with_heels: bool) -> SkeletonPose {
        let mut pose = SkeletonPose::new();
        let root = pose.add_joint_at("root", None, Point3::new(0.0, 1.0, 0.0));
        for (side, x) in [("l", 0.1), ("r", -0.1)] {
            let hip = pose.add_joint_at(format!("{side}_upper_leg"), Some(root), Point3::new(x, 0.9, 0.0));
            let knee = pose.add_joint_at(format!("{side}_knee"), Some(hip), Point3::new(x, 0.5, 0.0));
            let ankle = pose.add_joint_at(format!("{side}_ankle"), Some(knee), Point3::new(x, 0.1, 0.0));
            if with_heels {
                pose.add_joint_at(format!("{side}_heel"), Some(ankle), Point3::new(x, 0.0, -0.05));
            }
            pose.add_joint_at(format!("{side}_ball"), Some(ankle), Point3::new(x, 0.0, 0.12));
        }
        pose
    }

    #[test]
    fn human_topology_resolves() {
        let skeleton = human_skeleton(true);
        let topology = LegTopology::from_skeleton(&LegJointNames::human(), &skeleton).unwrap();
        assert_eq!(topology.leg_count(), LegCount::Biped);

        let left = topology.chain(LegIndex::BackLeft);
        assert_relative_eq!(left.thigh_length(), 0.4, epsilon = 1e-6);
        assert_relative_eq!(left.shin_length(), 0.4, epsilon = 1e-6);
        assert_relative_eq!(left.reach(), 0.8, epsilon = 1e-6);
        assert!(left.joint(LegJoint::Heel).is_some());
        assert_eq!(topology.roots().count(), 1);
    }

    #[test]
    fn missing_joint_is_reported() {
        let skeleton = human_skeleton(false);
        let err = LegTopology::from_skeleton(&LegJointNames::human(), &skeleton).unwrap_err();
        assert!(matches!(err, SetupError::MissingJoint(ref name) if name == "l_heel"));
    }

    #[test]
    fn bad_leg_count_is_rejected() {
        let skeleton = human_skeleton(true);
        let mut names = LegJointNames::human();
        names.legs.pop();
        assert!(matches!(
            LegTopology::from_skeleton(&names, &skeleton),
            Err(SetupError::LegCount(1))
        ));
    }

    #[test]
    fn zero_length_bone_is_rejected() {
        let mut skeleton = SkeletonPose::new();
        let root = skeleton.add_joint_at("root", None, Point3::origin());
        let hip = skeleton.add_joint_at("hip", Some(root), Point3::new(0.0, 0.9, 0.0));
        let knee = skeleton.add_joint_at("knee", Some(hip), Point3::new(0.0, 0.9, 0.0));
        let ankle = skeleton.add_joint_at("ankle", Some(knee), Point3::new(0.0, 0.1, 0.0));
        let ball = skeleton.add_joint_at("ball", Some(ankle), Point3::new(0.0, 0.0, 0.1));
        let joints = LegJoints {
            root,
            hip,
            knee,
            ankle,
            heel: None,
            ball,
        };
        let err = LegIkChain::from_joints(LegIndex::BackLeft, joints, &skeleton).unwrap_err();
        assert_eq!(err.to_string(), "Zero-length thigh on leg back_left");
    }

    #[test]
    fn names_round_trip_through_toml() {
        let names = LegJointNames::horse();
        let text = toml::to_string(&names).unwrap();
        let back: LegJointNames = toml::from_str(&text).unwrap();
        assert_eq!(back, names);
        assert_eq!(back.legs.len(), 4);
        assert!(back.legs[2].heel.is_none());
    }

    #[test]
    fn knee_rotation_keeps_thigh() {
        let mut skeleton = human_skeleton(true);
        let topology = LegTopology::from_skeleton(&LegJointNames::human(), &skeleton).unwrap();
        let chain = *topology.chain(LegIndex::BackLeft);
        let rot = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 0.5);
        chain.rotate_knee(&mut skeleton, &rot);
        assert_relative_eq!(chain.knee(&skeleton), Point3::new(0.1, 0.5, 0.0));
        assert_relative_eq!(
            (chain.ankle(&skeleton) - chain.knee(&skeleton)).norm(),
            0.4,
            epsilon = 1e-6
        );
    }
}
