// src/joint.rs - Typed per-joint records shared by the mapping engine and the solver
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Index, IndexMut};

/// Number of arm joints handled by the mapping engine (the gripper is separate).
pub const ARM_JOINTS: usize = 6;

/// Range used for joints the configuration does not describe.
pub const DEFAULT_JOINT_RANGE: (f64, f64) = (-180.0, 180.0);

/// Physical arm joint. `J1` is the base, `J6` the wrist roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JointId {
    J1,
    J2,
    J3,
    J4,
    J5,
    J6,
}

impl JointId {
    pub const ALL: [JointId; ARM_JOINTS] = [
        JointId::J1,
        JointId::J2,
        JointId::J3,
        JointId::J4,
        JointId::J5,
        JointId::J6,
    ];

    /// Zero-based position of this joint in an angle vector.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// One-based joint number as printed on the arm.
    pub fn number(self) -> u8 {
        self as u8 + 1
    }
}

impl fmt::Display for JointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "J{}", self.number())
    }
}

/// One value per arm joint, indexed by [`JointId`].
///
/// Serialized as a plain sequence. Sequences shorter than six entries are
/// padded with `T::default()`; longer ones are truncated, so a seven-entry
/// list that carries the gripper as its last element still loads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerJoint<T>([T; ARM_JOINTS]);

impl<T> PerJoint<T> {
    pub const fn new(values: [T; ARM_JOINTS]) -> Self {
        Self(values)
    }

    pub fn from_fn(mut f: impl FnMut(JointId) -> T) -> Self {
        Self(std::array::from_fn(|i| f(JointId::ALL[i])))
    }

    pub fn iter(&self) -> impl Iterator<Item = (JointId, &T)> {
        JointId::ALL.into_iter().zip(self.0.iter())
    }

    pub fn values(&self) -> &[T; ARM_JOINTS] {
        &self.0
    }

    pub fn map<U>(&self, mut f: impl FnMut(JointId, &T) -> U) -> PerJoint<U> {
        PerJoint::from_fn(|joint| f(joint, &self.0[joint.index()]))
    }

    pub fn into_inner(self) -> [T; ARM_JOINTS] {
        self.0
    }
}

impl<T: Default> PerJoint<T> {
    /// Build from a list of any length, padding missing joints with defaults.
    pub fn from_partial(values: Vec<T>) -> Self {
        if values.len() > ARM_JOINTS {
            tracing::debug!(
                "Ignoring {} per-joint entries beyond {}",
                values.len() - ARM_JOINTS,
                JointId::J6
            );
        }
        let mut values = values.into_iter();
        Self(std::array::from_fn(|_| values.next().unwrap_or_default()))
    }
}

impl<T: Default> Default for PerJoint<T> {
    fn default() -> Self {
        Self(std::array::from_fn(|_| T::default()))
    }
}

impl<T> Index<JointId> for PerJoint<T> {
    type Output = T;

    fn index(&self, joint: JointId) -> &T {
        &self.0[joint.index()]
    }
}

impl<T> IndexMut<JointId> for PerJoint<T> {
    fn index_mut(&mut self, joint: JointId) -> &mut T {
        &mut self.0[joint.index()]
    }
}

impl<T: Serialize> Serialize for PerJoint<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter())
    }
}

impl<'de, T: Deserialize<'de> + Default> Deserialize<'de> for PerJoint<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let values = Vec::<T>::deserialize(deserializer)?;
        Ok(Self::from_partial(values))
    }
}

/// A `(min, max)` pair in degrees.
///
/// The pair is stored as written; `min` may exceed `max`. Anything that
/// needs an ordered interval goes through [`JointLimits::low`] and
/// [`JointLimits::high`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct JointLimits {
    pub min: f64,
    pub max: f64,
}

impl JointLimits {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn low(&self) -> f64 {
        self.min.min(self.max)
    }

    pub fn high(&self) -> f64 {
        self.min.max(self.max)
    }

    /// Signed width, `max - min`.
    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    pub fn midpoint(&self) -> f64 {
        (self.min + self.max) / 2.0
    }

    pub fn is_degenerate(&self) -> bool {
        self.min == self.max
    }

    pub fn is_reversed(&self) -> bool {
        self.min > self.max
    }

    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }

    /// Force `value` into `[low, high]`. NaN collapses to `low`.
    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.low()).min(self.high())
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.low() && value <= self.high()
    }
}

impl Default for JointLimits {
    fn default() -> Self {
        Self::new(DEFAULT_JOINT_RANGE.0, DEFAULT_JOINT_RANGE.1)
    }
}

impl From<[f64; 2]> for JointLimits {
    fn from([min, max]: [f64; 2]) -> Self {
        Self::new(min, max)
    }
}

impl From<JointLimits> for [f64; 2] {
    fn from(limits: JointLimits) -> Self {
        [limits.min, limits.max]
    }
}

impl fmt::Display for JointLimits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1})", self.min, self.max)
    }
}

/// Direction of follower motion relative to the leader.
///
/// Stored in configuration files as a gain value; any negative gain means
/// inverted, everything else (including zero) means normal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub enum GainSign {
    #[default]
    Normal,
    Inverted,
}

impl GainSign {
    pub fn is_inverted(self) -> bool {
        matches!(self, GainSign::Inverted)
    }

    pub fn as_f64(self) -> f64 {
        match self {
            GainSign::Normal => 1.0,
            GainSign::Inverted => -1.0,
        }
    }
}

impl From<f64> for GainSign {
    fn from(gain: f64) -> Self {
        if gain < 0.0 {
            GainSign::Inverted
        } else {
            GainSign::Normal
        }
    }
}

impl From<GainSign> for f64 {
    fn from(sign: GainSign) -> Self {
        sign.as_f64()
    }
}
