// src/analysis.rs - Offline checks over recorded trajectories and teleop logs
use crate::calibration::{CalibrationError, align};
use crate::config::Config;
use crate::joint::{JointId, JointLimits, PerJoint};
use crate::mapping::map_arm;
use crate::monitor::TeleopSnapshot;
use crate::trajectory::Trajectory;
use serde::Serialize;
use std::fmt;

/// Normalized positions at or beyond these count as saturated.
pub const SATURATION_LOW: f64 = 0.01;
pub const SATURATION_HIGH: f64 = 0.99;

/// Error statistics of mapped leader angles against a baseline, in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ErrorStats {
    pub mean: f64,
    pub rms: f64,
    pub max_abs: f64,
}

impl ErrorStats {
    fn from_errors(errors: &[f64]) -> Self {
        if errors.is_empty() {
            return Self::default();
        }
        let n = errors.len() as f64;
        Self {
            mean: errors.iter().sum::<f64>() / n,
            rms: (errors.iter().map(|e| e * e).sum::<f64>() / n).sqrt(),
            max_abs: errors.iter().fold(0.0, |acc: f64, e| acc.max(e.abs())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonReport {
    pub samples: usize,
    pub time_scale: Option<f64>,
    pub joints: PerJoint<ErrorStats>,
}

impl fmt::Display for ComparisonReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Compared {} samples (time scale {})",
            self.samples,
            self.time_scale
                .map_or_else(|| "n/a".to_string(), |s| format!("{:.3}", s))
        )?;
        writeln!(f, "{:<3} | {:>9} | {:>9} | {:>9}", "J", "Mean", "RMS", "Max")?;
        writeln!(f, "{}", "-".repeat(40))?;
        for (joint, stats) in self.joints.iter() {
            writeln!(
                f,
                "{:<3} | {:>9.2} | {:>9.2} | {:>9.2}",
                joint, stats.mean, stats.rms, stats.max_abs
            )?;
        }
        Ok(())
    }
}

/// Map every leader sample with `config` and compare the result against the
/// baseline recording, aligned the same way the solver aligns them.
///
/// Errors are `mapped - baseline`.
pub fn compare(
    leader: &Trajectory,
    baseline: &Trajectory,
    config: &Config,
) -> Result<ComparisonReport, CalibrationError> {
    let alignment = align(leader, baseline)?;
    let mut errors: PerJoint<Vec<f64>> = PerJoint::default();

    for (i, sample) in leader.samples().iter().enumerate() {
        let mapping = map_arm(&sample.angles, config);
        let Some(mapped) = mapping.follower_angles() else {
            continue;
        };
        for joint in JointId::ALL {
            errors[joint].push(mapped[joint.index()] - alignment.baseline[joint][i]);
        }
    }

    let report = ComparisonReport {
        samples: leader.len(),
        time_scale: alignment.time_scale,
        joints: errors.map(|_, e| ErrorStats::from_errors(e)),
    };
    tracing::debug!("Comparison finished over {} samples", report.samples);
    Ok(report)
}

/// A mapped follower angle that fell outside the configured follower range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SafetyViolation {
    pub frame: usize,
    pub joint: JointId,
    pub value: f64,
    pub limits: JointLimits,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SafetyReport {
    pub frames: usize,
    pub violations: Vec<SafetyViolation>,
}

impl SafetyReport {
    pub fn is_safe(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Run every frame of `trajectory` through the mapping engine and record any
/// output that escapes the follower limits.
pub fn check_safety(trajectory: &Trajectory, config: &Config) -> SafetyReport {
    let mut report = SafetyReport {
        frames: trajectory.len(),
        violations: Vec::new(),
    };
    for (frame, sample) in trajectory.samples().iter().enumerate() {
        let Some(mapped) = map_arm(&sample.angles, config).follower_angles() else {
            continue;
        };
        for joint in JointId::ALL {
            let limits = config.follower.limits[joint];
            let value = mapped[joint.index()];
            if !limits.contains(value) {
                tracing::error!(
                    "Frame {}: {} output {:.3} outside {}",
                    frame,
                    joint,
                    value,
                    limits
                );
                report.violations.push(SafetyViolation {
                    frame,
                    joint,
                    value,
                    limits,
                });
            }
        }
    }
    report
}

/// Per-joint summary of a teleop log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct JointLogStats {
    /// Mean of `output - input` in degrees.
    pub bias: f64,
    pub input_range: Option<JointLimits>,
    pub output_range: Option<JointLimits>,
    /// Share of frames whose normalized position is pinned to either end, in percent.
    pub saturation_pct: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LogAnalysis {
    pub frames: usize,
    pub joints: PerJoint<JointLogStats>,
    pub gripper_in: Option<JointLimits>,
    pub gripper_out: Option<(u8, u8)>,
}

fn observed_range(values: impl Iterator<Item = f64>) -> Option<JointLimits> {
    values
        .filter(|v| v.is_finite())
        .fold(None, |range: Option<(f64, f64)>, v| {
            Some(match range {
                Some((lo, hi)) => (lo.min(v), hi.max(v)),
                None => (v, v),
            })
        })
        .map(|(lo, hi)| JointLimits::new(lo, hi))
}

/// Summarize recorded teleop frames: bias, ranges and saturation per joint.
pub fn analyze_log(snapshots: &[TeleopSnapshot]) -> LogAnalysis {
    if snapshots.is_empty() {
        tracing::warn!("Teleop log contains no frames");
        return LogAnalysis::default();
    }
    let n = snapshots.len() as f64;

    let joints = PerJoint::from_fn(|joint| {
        let i = joint.index();
        let bias = snapshots.iter().map(|s| s.output[i] - s.input[i]).sum::<f64>() / n;
        let saturated = snapshots
            .iter()
            .filter(|s| s.normalized[i] <= SATURATION_LOW || s.normalized[i] >= SATURATION_HIGH)
            .count();
        JointLogStats {
            bias,
            input_range: observed_range(snapshots.iter().map(|s| s.input[i])),
            output_range: observed_range(snapshots.iter().map(|s| s.output[i])),
            saturation_pct: 100.0 * saturated as f64 / n,
        }
    });

    let gripper_out = snapshots
        .iter()
        .filter_map(|s| s.gripper_out)
        .fold(None, |range: Option<(u8, u8)>, g| {
            Some(match range {
                Some((lo, hi)) => (lo.min(g), hi.max(g)),
                None => (g, g),
            })
        });

    LogAnalysis {
        frames: snapshots.len(),
        joints,
        gripper_in: observed_range(snapshots.iter().filter_map(|s| s.gripper_in)),
        gripper_out,
    }
}

impl fmt::Display for LogAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let range = |r: Option<JointLimits>| r.map_or_else(|| "-".to_string(), |r| r.to_string());
        writeln!(f, "Analyzed {} frames", self.frames)?;
        writeln!(
            f,
            "{:<3} | {:>8} | {:<18} | {:<18} | {:>6}",
            "J", "Bias", "Input range", "Output range", "Sat %"
        )?;
        writeln!(f, "{}", "-".repeat(65))?;
        for (joint, stats) in self.joints.iter() {
            writeln!(
                f,
                "{:<3} | {:>8.2} | {:<18} | {:<18} | {:>6.1}",
                joint,
                stats.bias,
                range(stats.input_range),
                range(stats.output_range),
                stats.saturation_pct
            )?;
        }
        write!(f, "Gripper: in {} -> out ", range(self.gripper_in))?;
        match self.gripper_out {
            Some((lo, hi)) => writeln!(f, "({}, {})", lo, hi),
            None => writeln!(f, "-"),
        }
    }
}

/// Joints whose saturation share exceeds `threshold_pct`.
pub fn saturated_joints(analysis: &LogAnalysis, threshold_pct: f64) -> Vec<JointId> {
    analysis
        .joints
        .iter()
        .filter(|(_, stats)| stats.saturation_pct > threshold_pct)
        .map(|(joint, _)| joint)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::joint::GainSign;
    use crate::trajectory::CalibrationSample;

    fn identity_config() -> Config {
        let mut config = Config::default();
        config.leader.limits = PerJoint::default();
        config.leader.home_offsets = PerJoint::default();
        config.follower.limits = PerJoint::default();
        config.follower.gain_signs = PerJoint::from_fn(|_| GainSign::Normal);
        config
    }

    fn sweep(steps: usize, gain: f64, offset: f64) -> Trajectory {
        let samples = (0..=steps)
            .map(|i| {
                let t = i as f64 * 0.1;
                let angle = -90.0 + 180.0 * i as f64 / steps as f64;
                CalibrationSample::new(t, [gain * angle + offset; 6])
            })
            .collect();
        Trajectory::new(samples).unwrap()
    }

    #[test]
    fn test_compare_identity_has_no_error() {
        let leader = sweep(20, 1.0, 0.0);
        let report = compare(&leader, &leader, &identity_config()).unwrap();
        assert_eq!(report.samples, 21);
        for (_, stats) in report.joints.iter() {
            assert!(stats.rms < 1e-9);
            assert!(stats.max_abs < 1e-9);
        }
    }

    #[test]
    fn test_compare_reports_constant_offset() {
        let leader = sweep(20, 1.0, 0.0);
        let baseline = sweep(20, 1.0, -2.0);
        let report = compare(&leader, &baseline, &identity_config()).unwrap();
        let j1 = report.joints[JointId::J1];
        assert!((j1.mean - 2.0).abs() < 1e-9);
        assert!((j1.rms - 2.0).abs() < 1e-9);
        assert!((j1.max_abs - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_check_safety_passes_for_wild_input() {
        let trajectory = Trajectory::new(vec![
            CalibrationSample::new(0.0, [10_000.0, -10_000.0, 0.0, 180.0, -180.0, 1e6]),
            CalibrationSample::new(0.1, [-1e6, 1e6, 400.0, -400.0, 0.0, -0.0]),
        ])
        .unwrap();
        let report = check_safety(&trajectory, &Config::default());
        assert_eq!(report.frames, 2);
        assert!(report.is_safe());
    }

    fn logged(input: f64, norm: f64, output: f64, gripper: Option<(f64, u8)>) -> TeleopSnapshot {
        TeleopSnapshot {
            timestamp: 0.0,
            input: [input; 6],
            gripper_in: gripper.map(|(g, _)| g),
            normalized: [norm; 6],
            output: [output; 6],
            gripper_out: gripper.map(|(_, g)| g),
        }
    }

    #[test]
    fn test_analyze_log() {
        let log = vec![
            logged(0.0, 0.5, 2.0, Some((-10.0, 20))),
            logged(10.0, 0.995, 14.0, None),
            logged(-10.0, 0.0, -6.0, Some((5.0, 4))),
            logged(5.0, 0.6, 6.0, None),
        ];
        let analysis = analyze_log(&log);
        assert_eq!(analysis.frames, 4);
        let j4 = analysis.joints[JointId::J4];
        assert!((j4.bias - 2.75).abs() < 1e-12);
        assert_eq!(j4.input_range, Some(JointLimits::new(-10.0, 10.0)));
        assert_eq!(j4.output_range, Some(JointLimits::new(-6.0, 14.0)));
        assert!((j4.saturation_pct - 50.0).abs() < 1e-12);
        assert_eq!(analysis.gripper_in, Some(JointLimits::new(-10.0, 5.0)));
        assert_eq!(analysis.gripper_out, Some((4, 20)));
        assert_eq!(saturated_joints(&analysis, 40.0).len(), 6);
        assert!(analysis.to_string().contains("Sat %"));
    }

    #[test]
    fn test_analyze_empty_log() {
        let analysis = analyze_log(&[]);
        assert_eq!(analysis.frames, 0);
        assert_eq!(analysis.gripper_out, None);
    }
}
