//! Leader/follower control loop.
//!
//! The loop polls a [`LeaderArm`], maps every usable frame through
//! [`crate::mapping`], forwards the result to a [`FollowerArm`] and hands a
//! [`TeleopSnapshot`] to each registered [`FrameObserver`]. Hardware access
//! lives behind the two arm traits; [`ReplayLeader`] and
//! [`RecordingFollower`] stand in for hardware when replaying logs.

pub mod log;

use crate::config::Config;
use crate::joint::ARM_JOINTS;
use crate::mapping::{map_gripper_with, map_joints};
use crate::monitor::{SnapshotPublisher, TeleopSnapshot};
use crate::trajectory::{CalibrationSample, Trajectory};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;

pub use log::{TeleopLogWriter, read_teleop_log};

#[derive(Debug, Error)]
pub enum TeleopError {
    #[error("Leader error: {0}")]
    Leader(String),
    /// Returned by hardware follower drivers when a command does not reach the arm.
    #[error("Follower error: {0}")]
    Follower(String),
    #[error("Log error: {0}")]
    Log(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One raw read from the leader arm.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaderFrame {
    pub timestamp: f64,
    /// Joint angles in degrees, optionally followed by the gripper angle.
    pub angles: Vec<f64>,
}

/// Source of leader joint angles.
#[async_trait]
pub trait LeaderArm: Send {
    /// Read the current angles. `Ok(None)` means the source is exhausted.
    async fn read_frame(&mut self) -> Result<Option<LeaderFrame>, TeleopError>;
}

/// Sink for mapped follower commands.
#[async_trait]
pub trait FollowerArm: Send {
    async fn write_angles(&mut self, angles: &[f64; ARM_JOINTS]) -> Result<(), TeleopError>;
    async fn set_gripper(&mut self, value: u8) -> Result<(), TeleopError>;
}

/// Receives every processed frame. Implementations must not block.
pub trait FrameObserver: Send {
    fn observe(&mut self, snapshot: &TeleopSnapshot);

    /// Called once when the loop stops. Buffered sinks flush here.
    fn finish(&mut self) -> Result<(), TeleopError> {
        Ok(())
    }
}

impl FrameObserver for SnapshotPublisher {
    fn observe(&mut self, snapshot: &TeleopSnapshot) {
        self.publish(snapshot.clone());
    }
}

#[derive(Debug, Clone)]
pub struct TeleopOptions {
    /// Loop rate; `None` runs as fast as the leader delivers frames.
    pub rate_hz: Option<f64>,
    /// Frames with any value beyond ±this many degrees are treated as bad reads.
    pub plausibility_limit: f64,
    /// Pause after a failed leader read before polling again.
    pub read_error_backoff: Duration,
}

impl TeleopOptions {
    /// Tick period for the configured rate, or `None` to run unpaced.
    ///
    /// Rates that are not finite and positive, or so high that the period
    /// rounds to zero, fall back to unpaced with a warning.
    pub fn tick_period(&self) -> Option<Duration> {
        let hz = self.rate_hz?;
        let period = (hz.is_finite() && hz > 0.0)
            .then(|| Duration::try_from_secs_f64(1.0 / hz).ok())
            .flatten()
            .filter(|period| !period.is_zero());
        if period.is_none() {
            tracing::warn!("Unusable loop rate {} Hz, running unpaced", hz);
        }
        period
    }
}

impl Default for TeleopOptions {
    fn default() -> Self {
        Self {
            rate_hz: Some(50.0),
            plausibility_limit: 200.0,
            read_error_backoff: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeleopStats {
    pub frames_read: u64,
    pub frames_forwarded: u64,
    pub frames_skipped: u64,
    pub read_errors: u64,
    pub write_errors: u64,
    /// Observers whose final flush failed.
    pub observer_errors: u64,
}

/// Why a leader frame was not forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Short,
    NonFinite,
    Implausible,
}

/// Decide whether a raw leader frame is fit to drive the follower.
pub fn screen_frame(angles: &[f64], plausibility_limit: f64) -> Result<(), SkipReason> {
    if angles.len() < ARM_JOINTS {
        return Err(SkipReason::Short);
    }
    if angles.iter().any(|a| !a.is_finite()) {
        return Err(SkipReason::NonFinite);
    }
    if angles.iter().any(|a| a.abs() > plausibility_limit) {
        return Err(SkipReason::Implausible);
    }
    Ok(())
}

/// Map one leader frame into a snapshot. Returns `None` for frames shorter
/// than six joints.
pub fn process_frame(frame: &LeaderFrame, config: &Config) -> Option<TeleopSnapshot> {
    let input: [f64; ARM_JOINTS] = *frame.angles.first_chunk::<ARM_JOINTS>()?;
    let (output, normalized) = map_joints(&input, config);
    let gripper_in = frame.angles.get(ARM_JOINTS).copied();
    let gripper_out = gripper_in.map(|g| map_gripper_with(g, &config.gripper));
    Some(TeleopSnapshot {
        timestamp: frame.timestamp,
        input,
        gripper_in,
        normalized,
        output,
        gripper_out,
    })
}

pub struct TeleopLoop<L: LeaderArm, F: FollowerArm> {
    leader: L,
    follower: F,
    config: Arc<Config>,
    options: TeleopOptions,
    observers: Vec<Box<dyn FrameObserver>>,
}

impl<L: LeaderArm, F: FollowerArm> TeleopLoop<L, F> {
    pub fn new(leader: L, follower: F, config: Arc<Config>, options: TeleopOptions) -> Self {
        Self {
            leader,
            follower,
            config,
            options,
            observers: Vec::new(),
        }
    }

    pub fn add_observer(&mut self, observer: Box<dyn FrameObserver>) {
        self.observers.push(observer);
    }

    pub fn follower(&self) -> &F {
        &self.follower
    }

    pub fn into_parts(self) -> (L, F) {
        (self.leader, self.follower)
    }

    /// Run until the leader is exhausted or `stop` becomes `true`.
    ///
    /// Leader read failures and follower write failures are logged and
    /// counted; the loop keeps running so that a single bad serial read
    /// does not stop the arm.
    pub async fn run(&mut self, mut stop: watch::Receiver<bool>) -> TeleopStats {
        let mut stats = TeleopStats::default();
        let period = self.options.tick_period();
        let mut ticker = period.map(|period| {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            interval
        });
        let started = Instant::now();
        let mut stop_open = true;
        tracing::info!(
            "Teleop loop started ({})",
            period.map_or_else(
                || "unpaced".to_string(),
                |p| format!("{:.0} Hz", 1.0 / p.as_secs_f64())
            )
        );

        loop {
            if *stop.borrow() {
                break;
            }
            if let Some(ticker) = ticker.as_mut() {
                tokio::select! {
                    _ = ticker.tick() => {}
                    changed = stop.changed(), if stop_open => {
                        // A dropped stop handle can no longer stop us; stop polling it
                        stop_open = changed.is_ok();
                        continue;
                    }
                }
            }

            let frame = match self.leader.read_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    tracing::info!("Leader source exhausted");
                    break;
                }
                Err(e) => {
                    stats.read_errors += 1;
                    tracing::warn!("Leader read failed: {}", e);
                    tokio::time::sleep(self.options.read_error_backoff).await;
                    continue;
                }
            };
            stats.frames_read += 1;

            if let Err(reason) = screen_frame(&frame.angles, self.options.plausibility_limit) {
                stats.frames_skipped += 1;
                tracing::debug!("Skipping leader frame at {:.3}s: {:?}", frame.timestamp, reason);
                continue;
            }
            let Some(snapshot) = process_frame(&frame, &self.config) else {
                stats.frames_skipped += 1;
                continue;
            };

            if let Err(e) = self.follower.write_angles(&snapshot.output).await {
                stats.write_errors += 1;
                tracing::warn!("Follower write failed: {}", e);
            }
            if let Some(value) = snapshot.gripper_out {
                if let Err(e) = self.follower.set_gripper(value).await {
                    stats.write_errors += 1;
                    tracing::warn!("Follower gripper write failed: {}", e);
                }
            }
            stats.frames_forwarded += 1;

            for observer in &mut self.observers {
                observer.observe(&snapshot);
            }
        }

        for observer in &mut self.observers {
            if let Err(e) = observer.finish() {
                stats.observer_errors += 1;
                tracing::warn!("Frame observer failed to finish: {}", e);
            }
        }

        tracing::info!(
            "Teleop loop stopped after {:.1}s: {} forwarded, {} skipped, {} read errors, \
             {} write errors, {} observer errors",
            started.elapsed().as_secs_f64(),
            stats.frames_forwarded,
            stats.frames_skipped,
            stats.read_errors,
            stats.write_errors,
            stats.observer_errors
        );
        stats
    }
}

/// Plays back a recorded leader trajectory as if it were live hardware.
#[derive(Debug, Clone)]
pub struct ReplayLeader {
    samples: std::vec::IntoIter<CalibrationSample>,
}

impl ReplayLeader {
    pub fn new(trajectory: &Trajectory) -> Self {
        Self {
            samples: trajectory.samples().to_vec().into_iter(),
        }
    }
}

#[async_trait]
impl LeaderArm for ReplayLeader {
    async fn read_frame(&mut self) -> Result<Option<LeaderFrame>, TeleopError> {
        Ok(self.samples.next().map(|sample| LeaderFrame {
            timestamp: sample.time,
            angles: sample.to_frame(),
        }))
    }
}

/// Follower that stores every command instead of moving hardware.
#[derive(Debug, Clone, Default)]
pub struct RecordingFollower {
    pub angles: Vec<[f64; ARM_JOINTS]>,
    pub gripper: Vec<u8>,
}

#[async_trait]
impl FollowerArm for RecordingFollower {
    async fn write_angles(&mut self, angles: &[f64; ARM_JOINTS]) -> Result<(), TeleopError> {
        self.angles.push(*angles);
        Ok(())
    }

    async fn set_gripper(&mut self, value: u8) -> Result<(), TeleopError> {
        self.gripper.push(value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_screen_frame() {
        assert_eq!(screen_frame(&[0.0; 5], 200.0), Err(SkipReason::Short));
        let non_finite = [0.0, 0.0, f64::INFINITY, 0.0, 0.0, 0.0];
        assert_eq!(screen_frame(&non_finite, 200.0), Err(SkipReason::NonFinite));
        let implausible = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, -250.0];
        assert_eq!(screen_frame(&implausible, 200.0), Err(SkipReason::Implausible));
        assert_eq!(screen_frame(&[10.0; 7], 200.0), Ok(()));
    }

    #[test]
    fn test_process_frame_with_and_without_gripper() {
        let config = Config::default();
        let arm_only = LeaderFrame {
            timestamp: 0.1,
            angles: vec![0.0; 6],
        };
        let snapshot = process_frame(&arm_only, &config).unwrap();
        assert_eq!(snapshot.gripper_in, None);
        assert_eq!(snapshot.gripper_out, None);

        let with_gripper = LeaderFrame {
            timestamp: 0.2,
            angles: vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, config.gripper.leader_open],
        };
        let snapshot = process_frame(&with_gripper, &config).unwrap();
        assert_eq!(snapshot.gripper_out, Some(100));
        assert_eq!(snapshot.timestamp, 0.2);

        let short = LeaderFrame {
            timestamp: 0.0,
            angles: vec![1.0],
        };
        assert!(process_frame(&short, &config).is_none());
    }

    #[test]
    fn test_tick_period_rejects_unusable_rates() {
        let at = |rate_hz| TeleopOptions {
            rate_hz,
            ..TeleopOptions::default()
        };
        assert_eq!(at(Some(50.0)).tick_period(), Some(Duration::from_millis(20)));
        assert_eq!(at(None).tick_period(), None);
        for hz in [0.0, -5.0, 1e10, 1e300, f64::INFINITY, f64::NAN] {
            assert_eq!(at(Some(hz)).tick_period(), None, "{hz}");
        }
    }
}
