use std::fmt;
use std::ops::{Index, IndexMut};

use nalgebra::Isometry3;
use serde::{Deserialize, Serialize};

/// World-space joint transform (translation + rotation).
pub type Locator = Isometry3<f32>;

/// Maximum number of legs a character may have.
pub const MAX_LEGS: usize = 4;

// ---------------------------------------------------------------------------
// FrameNumber
// ---------------------------------------------------------------------------

/// Monotonic simulation frame counter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct FrameNumber(pub u64);

impl FrameNumber {
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Number of frames elapsed since `earlier` (zero if `earlier` is newer).
    #[must_use]
    pub const fn since(self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for FrameNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// JointIndex
// ---------------------------------------------------------------------------

/// Index into a skeleton's joint table, resolved once at setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JointIndex(pub u16);

impl JointIndex {
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

// ---------------------------------------------------------------------------
// Legs
// ---------------------------------------------------------------------------

/// Leg slot. Bipeds use the two back slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegIndex {
    BackLeft = 0,
    BackRight = 1,
    FrontLeft = 2,
    FrontRight = 3,
}

impl LegIndex {
    pub const ALL: [Self; MAX_LEGS] = [
        Self::BackLeft,
        Self::BackRight,
        Self::FrontLeft,
        Self::FrontRight,
    ];

    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub const fn is_front(self) -> bool {
        matches!(self, Self::FrontLeft | Self::FrontRight)
    }
}

impl fmt::Display for LegIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BackLeft => "back_left",
            Self::BackRight => "back_right",
            Self::FrontLeft => "front_left",
            Self::FrontRight => "front_right",
        };
        f.write_str(name)
    }
}

/// Number of legs on a character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegCount {
    #[default]
    Biped,
    Quadruped,
}

impl LegCount {
    #[must_use]
    pub const fn get(self) -> usize {
        match self {
            Self::Biped => 2,
            Self::Quadruped => 4,
        }
    }

    /// Map a raw leg count onto a supported layout.
    #[must_use]
    pub const fn from_count(count: usize) -> Option<Self> {
        match count {
            2 => Some(Self::Biped),
            4 => Some(Self::Quadruped),
            _ => None,
        }
    }
}

/// Fixed-size per-leg storage.
///
/// Always holds [`MAX_LEGS`] values; only the first `count` are active.
/// Iteration visits active legs only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegSet<T> {
    items: [T; MAX_LEGS],
    count: LegCount,
}

impl<T> LegSet<T> {
    /// Build a set by calling `f` for every slot (active or not).
    pub fn from_fn(count: LegCount, mut f: impl FnMut(LegIndex) -> T) -> Self {
        Self {
            items: std::array::from_fn(|i| f(LegIndex::ALL[i])),
            count,
        }
    }

    #[must_use]
    pub const fn count(&self) -> LegCount {
        self.count
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.count.get()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Active leg indices in slot order.
    pub fn legs(&self) -> impl Iterator<Item = LegIndex> + use<T> {
        LegIndex::ALL.into_iter().take(self.count.get())
    }

    pub fn iter(&self) -> impl Iterator<Item = (LegIndex, &T)> {
        LegIndex::ALL
            .into_iter()
            .zip(self.items.iter())
            .take(self.count.get())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (LegIndex, &mut T)> {
        let n = self.count.get();
        LegIndex::ALL.into_iter().zip(self.items.iter_mut()).take(n)
    }

    /// Active values as a slice.
    pub fn as_slice(&self) -> &[T] {
        &self.items[..self.count.get()]
    }
}

impl<T: Clone> LegSet<T> {
    pub fn splat(count: LegCount, value: T) -> Self {
        Self::from_fn(count, |_| value.clone())
    }
}

impl<T> Index<LegIndex> for LegSet<T> {
    type Output = T;
    fn index(&self, leg: LegIndex) -> &T {
        &self.items[leg.index()]
    }
}

impl<T> IndexMut<LegIndex> for LegSet<T> {
    fn index_mut(&mut self, leg: LegIndex) -> &mut T {
        &mut self.items[leg.index()]
    }
}

// ---------------------------------------------------------------------------
// IkMode
// ---------------------------------------------------------------------------

/// Which leg-IK behavior drives a character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IkMode {
    #[default]
    Disabled,
    Stopped,
    Moving,
    MovingNonPredictive,
    Melee,
    Scripted,
    ScriptedMove,
}

impl IkMode {
    pub const ALL: [Self; 7] = [
        Self::Disabled,
        Self::Stopped,
        Self::Moving,
        Self::MovingNonPredictive,
        Self::Melee,
        Self::Scripted,
        Self::ScriptedMove,
    ];

    #[must_use]
    pub const fn is_enabled(self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

impl fmt::Display for IkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disabled => "disabled",
            Self::Stopped => "stopped",
            Self::Moving => "moving",
            Self::MovingNonPredictive => "moving_non_predictive",
            Self::Melee => "melee",
            Self::Scripted => "scripted",
            Self::ScriptedMove => "scripted_move",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
