//! Offline calibration: derive follower limits from a leader log and a
//! ground-truth follower (baseline) log of the same motion.
//!
//! The two logs are recorded independently, so they are aligned by
//! stretching the baseline's time axis to the leader's duration and then
//! resampling it at every leader timestamp. See [`align`] and
//! [`solver::solve`].

pub mod interpolate;
pub mod regression;
pub mod solver;

use crate::joint::{JointId, PerJoint};
use crate::trajectory::Trajectory;
use interpolate::LinearInterpolator;
use thiserror::Error;

pub use regression::{AffineModel, fit_least_squares};
pub use solver::{
    CalibrationReport, FitStatus, JointCalibration, ProposedLimits, SolverOptions, propose_limits,
    solve,
};

/// Minimum number of samples each trajectory needs for alignment and fitting.
pub const MIN_SAMPLES: usize = 2;

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("{role} trajectory has {len} samples, need at least {}", MIN_SAMPLES)]
    TooFewSamples { role: &'static str, len: usize },
}

/// Baseline joint angles resampled onto the leader's timestamps.
#[derive(Debug, Clone)]
pub struct Alignment {
    /// Leader sample times (relative seconds).
    pub times: Vec<f64>,
    /// Factor applied to baseline timestamps, or `None` when a zero-length
    /// recording made scaling meaningless.
    pub time_scale: Option<f64>,
    /// Per joint, the baseline value at each leader timestamp.
    pub baseline: PerJoint<Vec<f64>>,
}

/// Time-align `baseline` to `leader`.
///
/// If both recordings have a positive duration, baseline timestamps are
/// scaled by `duration(leader) / duration(baseline)`. Each baseline joint is
/// then linearly interpolated (and extrapolated past either end) at every
/// leader timestamp.
pub fn align(leader: &Trajectory, baseline: &Trajectory) -> Result<Alignment, CalibrationError> {
    require_samples("leader", leader)?;
    require_samples("baseline", baseline)?;

    let leader_duration = leader.duration();
    let baseline_duration = baseline.duration();
    let time_scale = (leader_duration > 0.0 && baseline_duration > 0.0)
        .then(|| leader_duration / baseline_duration);
    match time_scale {
        Some(scale) => tracing::debug!(
            "Scaling baseline time by {:.3} (leader {:.2}s, baseline {:.2}s)",
            scale,
            leader_duration,
            baseline_duration
        ),
        None => tracing::warn!(
            "Zero-length recording (leader {:.2}s, baseline {:.2}s); baseline time left unscaled",
            leader_duration,
            baseline_duration
        ),
    }

    let scale = time_scale.unwrap_or(1.0);
    let baseline_times: Vec<f64> = baseline.times().into_iter().map(|t| t * scale).collect();
    let times = leader.times();

    let baseline_series = PerJoint::from_fn(|joint: JointId| {
        let values = baseline.joint_series(joint);
        match LinearInterpolator::new(&baseline_times, &values) {
            Some(interp) => interp.resample(&times),
            // Unreachable after require_samples; keep lengths aligned regardless
            None => vec![values.first().copied().unwrap_or(0.0); times.len()],
        }
    });

    Ok(Alignment {
        times,
        time_scale,
        baseline: baseline_series,
    })
}

fn require_samples(role: &'static str, trajectory: &Trajectory) -> Result<(), CalibrationError> {
    if trajectory.len() < MIN_SAMPLES {
        tracing::error!("{} trajectory too short: {} samples", role, trajectory.len());
        return Err(CalibrationError::TooFewSamples {
            role,
            len: trajectory.len(),
        });
    }
    Ok(())
}
