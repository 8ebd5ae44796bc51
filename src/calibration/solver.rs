// src/calibration/solver.rs - Fit leader->baseline relations and invert them into follower limits
use super::regression::{AffineModel, fit_least_squares};
use super::{CalibrationError, align};
use crate::config::Config;
use crate::joint::{GainSign, JointId, JointLimits, PerJoint};
use crate::trajectory::Trajectory;
use serde::Serialize;
use std::fmt;

/// Thresholds and input calibration used when solving.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOptions {
    /// Fits with `|slope|` below this are degenerate and produce no proposal.
    pub min_slope: f64,
    /// Fits with R² below this still propose limits but are flagged.
    pub min_r_squared: f64,
    /// Leader home offsets in effect when the leader log was recorded.
    pub home_offsets: PerJoint<f64>,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            min_slope: 0.01,
            min_r_squared: 0.5,
            home_offsets: PerJoint::default(),
        }
    }
}

impl SolverOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_slope: config.solver.min_slope,
            min_r_squared: config.solver.min_r_squared,
            home_offsets: config.leader.home_offsets,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FitStatus {
    Ok,
    /// Proposed, but the fit explains too little of the baseline motion.
    PoorFit { r_squared: f64 },
    /// Slope too close to zero to invert; no proposal.
    DegenerateSlope { slope: f64 },
}

impl FitStatus {
    pub fn is_flagged(&self) -> bool {
        !matches!(self, FitStatus::Ok)
    }
}

/// Follower range and direction that reproduce a fitted affine relation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProposedLimits {
    pub limits: JointLimits,
    pub gain_sign: GainSign,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct JointCalibration {
    pub joint: JointId,
    pub model: AffineModel,
    pub status: FitStatus,
    pub proposed: Option<ProposedLimits>,
}

/// Outcome of one solver run. A proposal only; nothing is applied until
/// [`CalibrationReport::apply_to`] is called and the result saved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationReport {
    pub leader_samples: usize,
    pub baseline_samples: usize,
    pub time_scale: Option<f64>,
    pub joints: PerJoint<JointCalibration>,
}

impl CalibrationReport {
    pub fn flagged(&self) -> impl Iterator<Item = &JointCalibration> {
        self.joints.values().iter().filter(|j| j.status.is_flagged())
    }

    /// Copy of `config` with the proposed follower limits and gain signs
    /// applied, rounded to 0.1°. Joints without a proposal keep their
    /// current values.
    pub fn apply_to(&self, config: &Config) -> Config {
        let mut updated = config.clone();
        for (joint, calibration) in self.joints.iter() {
            if let Some(proposed) = calibration.proposed {
                updated.follower.limits[joint] = JointLimits::new(
                    round_tenth(proposed.limits.min),
                    round_tenth(proposed.limits.max),
                );
                updated.follower.gain_signs[joint] = proposed.gain_sign;
            }
        }
        updated
    }
}

impl fmt::Display for CalibrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<3} | {:<10} | {:<10} | {:<7} | Proposal",
            "J", "Slope", "Bias", "R2"
        )?;
        writeln!(f, "{}", "-".repeat(70))?;
        for (joint, calibration) in self.joints.iter() {
            let model = &calibration.model;
            write!(
                f,
                "{:<3} | {:<10.3} | {:<10.3} | {:<7.3} | ",
                joint, model.slope, model.intercept, model.r_squared
            )?;
            match (&calibration.proposed, calibration.status) {
                (_, FitStatus::DegenerateSlope { slope }) => {
                    writeln!(f, "UNRELIABLE: slope {:.4} too small, keep current limits", slope)?
                }
                (Some(p), FitStatus::PoorFit { r_squared }) => writeln!(
                    f,
                    "{} gain {:+.0} (CHECK: poor fit, R2 {:.2})",
                    p.limits,
                    p.gain_sign.as_f64(),
                    r_squared
                )?,
                (Some(p), _) => writeln!(f, "{} gain {:+.0}", p.limits, p.gain_sign.as_f64())?,
                (None, _) => writeln!(f, "none")?,
            }
        }
        Ok(())
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Invert a fitted relation `baseline = slope * leader + intercept` into the
/// follower range that makes the mapping engine reproduce it.
///
/// With effective input range `[in_min, in_max]` (leader limits shifted by
/// the home offset):
///
/// ```text
/// target_range = slope * (in_max - in_min)
/// target_min   = intercept + in_min * slope
/// target_max   = target_min + target_range
/// ```
///
/// A negative slope yields `target_min > target_max`; the pair is then
/// written in `[min, max]` order with an inverted gain sign, which the
/// engine maps identically.
pub fn propose_limits(model: &AffineModel, input: JointLimits, home_offset: f64) -> ProposedLimits {
    let in_min = input.min - home_offset;
    let in_max = input.max - home_offset;
    let target_range = model.slope * (in_max - in_min);
    let target_min = model.intercept + in_min * model.slope;
    let target_max = target_min + target_range;

    if target_min <= target_max {
        ProposedLimits {
            limits: JointLimits::new(target_min, target_max),
            gain_sign: GainSign::Normal,
        }
    } else {
        ProposedLimits {
            limits: JointLimits::new(target_max, target_min),
            gain_sign: GainSign::Inverted,
        }
    }
}

fn calibrate_joint(
    joint: JointId,
    inputs: &[f64],
    targets: &[f64],
    input_limits: JointLimits,
    options: &SolverOptions,
) -> JointCalibration {
    let model = fit_least_squares(inputs, targets).unwrap_or(AffineModel {
        slope: 0.0,
        intercept: 0.0,
        r_squared: 0.0,
    });

    // Written so that a NaN slope also lands here
    if !(model.slope.abs() >= options.min_slope) {
        tracing::warn!(
            "{}: slope {:.4} below {}; fit unreliable, no limit proposed",
            joint,
            model.slope,
            options.min_slope
        );
        return JointCalibration {
            joint,
            model,
            status: FitStatus::DegenerateSlope { slope: model.slope },
            proposed: None,
        };
    }

    let proposed = propose_limits(&model, input_limits, options.home_offsets[joint]);
    let status = if model.r_squared < options.min_r_squared {
        tracing::warn!(
            "{}: R2 {:.3} below {}; proposal needs review",
            joint,
            model.r_squared,
            options.min_r_squared
        );
        FitStatus::PoorFit {
            r_squared: model.r_squared,
        }
    } else {
        FitStatus::Ok
    };
    tracing::info!(
        "{}: slope {:.3} bias {:.3} R2 {:.3} -> {}",
        joint,
        model.slope,
        model.intercept,
        model.r_squared,
        proposed.limits
    );

    JointCalibration {
        joint,
        model,
        status,
        proposed: Some(proposed),
    }
}

/// Derive proposed follower limits from a leader log and a baseline log.
///
/// `leader_limits` is the leader input range currently configured; the
/// proposal is computed against it. Each call is an independent batch
/// computation.
pub fn solve(
    leader: &Trajectory,
    baseline: &Trajectory,
    leader_limits: &PerJoint<JointLimits>,
    options: &SolverOptions,
) -> Result<CalibrationReport, CalibrationError> {
    let alignment = align(leader, baseline)?;

    let joints = PerJoint::from_fn(|joint| {
        calibrate_joint(
            joint,
            &leader.joint_series(joint),
            &alignment.baseline[joint],
            leader_limits[joint],
            options,
        )
    });

    Ok(CalibrationReport {
        leader_samples: leader.len(),
        baseline_samples: baseline.len(),
        time_scale: alignment.time_scale,
        joints,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::map_joint;

    #[test]
    fn test_propose_identity() {
        let model = AffineModel {
            slope: 1.0,
            intercept: 0.0,
            r_squared: 1.0,
        };
        let limits = JointLimits::new(-161.8, 152.49);
        let proposed = propose_limits(&model, limits, 0.0);
        assert_eq!(proposed.limits, limits);
        assert_eq!(proposed.gain_sign, GainSign::Normal);
    }

    #[test]
    fn test_proposal_reproduces_fit_through_mapping() {
        let model = AffineModel {
            slope: 0.8,
            intercept: -12.0,
            r_squared: 0.99,
        };
        let leader = JointLimits::new(-150.0, 140.0);
        let offset = 7.5;
        let proposed = propose_limits(&model, leader, offset);
        for x in [-140.0, -30.0, 0.0, 60.0, 130.0] {
            let (out, _) = map_joint(x, offset, leader, proposed.limits, proposed.gain_sign);
            assert!((out - model.predict(x)).abs() < 1e-9, "x={x}");
        }
    }

    #[test]
    fn test_negative_slope_proposes_inverted_gain() {
        let model = AffineModel {
            slope: -1.0,
            intercept: 5.0,
            r_squared: 1.0,
        };
        let leader = JointLimits::new(-100.0, 100.0);
        let proposed = propose_limits(&model, leader, 0.0);
        assert_eq!(proposed.gain_sign, GainSign::Inverted);
        assert_eq!(proposed.limits, JointLimits::new(-95.0, 105.0));
        for x in [-100.0, -20.0, 0.0, 80.0] {
            let (out, _) = map_joint(x, 0.0, leader, proposed.limits, proposed.gain_sign);
            assert!((out - model.predict(x)).abs() < 1e-9, "x={x}");
        }
    }

    #[test]
    fn test_flat_joint_is_flagged_without_proposal() {
        let options = SolverOptions::default();
        let calibration = calibrate_joint(
            JointId::J2,
            &[0.0, 10.0, 20.0, 30.0],
            &[5.0, 5.01, 5.0, 5.02],
            JointLimits::new(-90.0, 90.0),
            &options,
        );
        assert!(matches!(calibration.status, FitStatus::DegenerateSlope { .. }));
        assert_eq!(calibration.proposed, None);
    }

    #[test]
    fn test_poor_fit_still_proposes() {
        let options = SolverOptions::default();
        let calibration = calibrate_joint(
            JointId::J4,
            &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0],
            &[0.0, 5.0, 0.0, 5.0, 0.0, 4.0],
            JointLimits::new(-90.0, 90.0),
            &options,
        );
        assert!(matches!(calibration.status, FitStatus::PoorFit { .. }));
        assert!(calibration.proposed.is_some());
    }

    #[test]
    fn test_apply_rounds_and_keeps_unproposed_joints() {
        let config = Config::default();
        let fitted = |joint, slope: f64| JointCalibration {
            joint,
            model: AffineModel {
                slope,
                intercept: 0.0,
                r_squared: 1.0,
            },
            status: FitStatus::Ok,
            proposed: Some(ProposedLimits {
                limits: JointLimits::new(-10.04, 20.06),
                gain_sign: GainSign::Inverted,
            }),
        };
        let mut joints = PerJoint::from_fn(|joint| fitted(joint, 1.0));
        joints[JointId::J3] = JointCalibration {
            joint: JointId::J3,
            model: AffineModel {
                slope: 0.0,
                intercept: 0.0,
                r_squared: 0.0,
            },
            status: FitStatus::DegenerateSlope { slope: 0.0 },
            proposed: None,
        };
        let report = CalibrationReport {
            leader_samples: 2,
            baseline_samples: 2,
            time_scale: Some(1.0),
            joints,
        };
        let updated = report.apply_to(&config);
        assert_eq!(
            updated.follower.limits[JointId::J1],
            JointLimits::new(-10.0, 20.1)
        );
        assert_eq!(updated.follower.gain_signs[JointId::J2], GainSign::Inverted);
        assert_eq!(
            updated.follower.limits[JointId::J3],
            config.follower.limits[JointId::J3]
        );
        assert_eq!(report.flagged().count(), 1);
        let table = report.to_string();
        assert!(table.contains("UNRELIABLE"));
    }
}
