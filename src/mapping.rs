//! Leader -> follower joint angle mapping with hard safety clamps.
//!
//! Each joint is normalized against its leader range, mapped onto the
//! follower range in the direction given by the joint's gain sign, and then
//! clamped into the follower range. All functions here are pure: the same
//! angles and configuration always give the same result.

use crate::config::{Config, GripperConfig};
use crate::joint::{ARM_JOINTS, GainSign, JointId, JointLimits, PerJoint};

/// Normalized position reported for a joint whose leader range has zero width.
pub const DEGENERATE_NORM: f64 = 0.5;

/// Gripper command range sent to the follower.
pub const GRIPPER_CLOSED_VALUE: u8 = 0;
pub const GRIPPER_OPEN_VALUE: u8 = 100;

/// Result of [`map_arm`].
#[derive(Debug, Clone, PartialEq)]
pub struct ArmMapping {
    /// Follower angles in degrees, or the untouched input when it was too short.
    pub angles: Vec<f64>,
    /// Unclamped normalized leader positions; empty when the input was not processed.
    pub normalized: Vec<f64>,
}

impl ArmMapping {
    pub fn is_processed(&self) -> bool {
        !self.normalized.is_empty()
    }

    /// Follower angles as a fixed joint array, if the frame was processed.
    pub fn follower_angles(&self) -> Option<[f64; ARM_JOINTS]> {
        if !self.is_processed() {
            return None;
        }
        self.angles.as_slice().try_into().ok()
    }
}

/// Map one joint. Returns `(follower_angle, normalized)`.
///
/// A NaN input (or a NaN produced by an infinite input against a zero-width
/// follower range) resolves to the follower midpoint.
pub fn map_joint(
    angle: f64,
    home_offset: f64,
    leader: JointLimits,
    follower: JointLimits,
    gain: GainSign,
) -> (f64, f64) {
    let value = angle + home_offset;
    let norm = if leader.is_degenerate() {
        DEGENERATE_NORM
    } else {
        (value - leader.min) / leader.span()
    };

    let (out_start, out_end) = match gain {
        GainSign::Inverted => (follower.max, follower.min),
        GainSign::Normal => (follower.min, follower.max),
    };
    let target = norm * (out_end - out_start) + out_start;

    let safe = if target.is_nan() {
        follower.clamp(follower.midpoint())
    } else {
        follower.clamp(target)
    };
    if safe != target {
        tracing::trace!(norm, target, safe, "follower target saturated");
    }
    (safe, norm)
}

/// Map all six arm joints of a full leader frame.
pub fn map_joints(
    angles: &[f64; ARM_JOINTS],
    config: &Config,
) -> ([f64; ARM_JOINTS], [f64; ARM_JOINTS]) {
    let mapped: PerJoint<(f64, f64)> = PerJoint::from_fn(|joint: JointId| {
        map_joint(
            angles[joint.index()],
            config.leader.home_offsets[joint],
            config.leader.limits[joint],
            config.follower.limits[joint],
            config.follower.gain_signs[joint],
        )
    });
    let values = mapped.into_inner();
    (values.map(|(out, _)| out), values.map(|(_, norm)| norm))
}

/// Map a leader sample of any length.
///
/// Samples with fewer than six values are returned unchanged with an empty
/// `normalized` vector, which callers treat as "not processed". Values past
/// the sixth (e.g. the gripper channel) are ignored here; see [`map_gripper`].
pub fn map_arm(angles: &[f64], config: &Config) -> ArmMapping {
    let Some(joints) = angles.first_chunk::<ARM_JOINTS>() else {
        return ArmMapping {
            angles: angles.to_vec(),
            normalized: Vec::new(),
        };
    };
    let (out, norm) = map_joints(joints, config);
    ArmMapping {
        angles: out.to_vec(),
        normalized: norm.to_vec(),
    }
}

/// Map a leader gripper angle onto the follower's 0-100 command range.
///
/// `closed` maps to 0 and `open` to 100, whichever is numerically larger.
/// Results are clamped to the range and rounded to the nearest integer with
/// halves rounded away from zero (`f64::round`). NaN maps to 0; equal
/// `closed` and `open` angles map everything to 50.
pub fn map_gripper(angle: f64, closed: f64, open: f64) -> u8 {
    let span = open - closed;
    let value = if span == 0.0 {
        50.0
    } else {
        (angle - closed) * f64::from(GRIPPER_OPEN_VALUE) / span
    };
    value
        .max(f64::from(GRIPPER_CLOSED_VALUE))
        .min(f64::from(GRIPPER_OPEN_VALUE))
        .round() as u8
}

/// [`map_gripper`] using the calibration from the configuration.
pub fn map_gripper_with(angle: f64, gripper: &GripperConfig) -> u8 {
    map_gripper(angle, gripper.leader_closed, gripper.leader_open)
}
