// src/monitor.rs - Live state shared with monitoring sidecars, and observed range tracking
use crate::joint::{ARM_JOINTS, JointId, JointLimits, PerJoint};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::watch;

/// Everything the control loop knows about one processed leader frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeleopSnapshot {
    /// Seconds since the start of the session (or the log's own time base).
    pub timestamp: f64,
    pub input: [f64; ARM_JOINTS],
    pub gripper_in: Option<f64>,
    pub normalized: [f64; ARM_JOINTS],
    pub output: [f64; ARM_JOINTS],
    pub gripper_out: Option<u8>,
}

/// Producer half of the latest-value slot. Owned by the control loop.
#[derive(Debug)]
pub struct SnapshotPublisher {
    tx: watch::Sender<Option<TeleopSnapshot>>,
}

/// Consumer half of the latest-value slot. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SnapshotReader {
    rx: watch::Receiver<Option<TeleopSnapshot>>,
}

/// Create a single-slot, last-write-wins channel for teleop snapshots.
///
/// Publishing never waits for readers and never queues: a reader only ever
/// sees the most recent snapshot.
pub fn snapshot_slot() -> (SnapshotPublisher, SnapshotReader) {
    let (tx, rx) = watch::channel(None);
    (SnapshotPublisher { tx }, SnapshotReader { rx })
}

impl SnapshotPublisher {
    pub fn publish(&self, snapshot: TeleopSnapshot) {
        // send_replace succeeds even when every reader has gone away
        self.tx.send_replace(Some(snapshot));
    }

    pub fn subscribe(&self) -> SnapshotReader {
        SnapshotReader {
            rx: self.tx.subscribe(),
        }
    }
}

impl SnapshotReader {
    /// Most recent snapshot, if any frame has been published yet.
    pub fn latest(&self) -> Option<TeleopSnapshot> {
        self.rx.borrow().clone()
    }

    /// Wait for a snapshot newer than the last one seen. Returns `None` once
    /// the publisher is dropped.
    pub async fn next(&mut self) -> Option<TeleopSnapshot> {
        self.rx.changed().await.ok()?;
        self.rx.borrow_and_update().clone()
    }
}

/// Render a snapshot as the one-screen console dashboard.
pub fn render_dashboard(snapshot: &TeleopSnapshot) -> String {
    let fmt_row = |values: &[f64], scale: f64, precision: usize| {
        values
            .iter()
            .map(|v| format!("{:>7.*}", precision, v * scale))
            .collect::<Vec<_>>()
            .join(" ")
    };
    let gripper_in = snapshot
        .gripper_in
        .map_or_else(|| "-".to_string(), |g| format!("{:.1}", g));
    let gripper_out = snapshot
        .gripper_out
        .map_or_else(|| "-".to_string(), |g| g.to_string());
    format!(
        "=== Teleop Monitor (Input -> Norm -> Output) t={:.2}s ===\n  Input:      {}\n  Norm (%):   {}\n  Output:     {}\n  Gripper:    In={} -> Out={}\n{}",
        snapshot.timestamp,
        fmt_row(&snapshot.input, 1.0, 1),
        fmt_row(&snapshot.normalized, 100.0, 0),
        fmt_row(&snapshot.output, 1.0, 1),
        gripper_in,
        gripper_out,
        "-".repeat(60)
    )
}

/// Print the latest snapshot every `period` until the publisher goes away.
///
/// Runs as its own task; it only ever reads the slot, so a slow terminal
/// cannot hold up the control loop.
pub fn spawn_console_monitor(
    reader: SnapshotReader,
    period: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Some(snapshot) = reader.latest() {
                println!("{}", render_dashboard(&snapshot));
            }
            if reader.rx.has_changed().is_err() {
                break;
            }
        }
    })
}

/// Number of channels tracked: six arm joints plus the gripper.
pub const RANGE_CHANNELS: usize = ARM_JOINTS + 1;

/// Tracks the smallest and largest value seen on each leader channel.
///
/// Fed with raw leader frames while an operator sweeps every joint through
/// its full travel; the result is a starting point for the leader limits
/// and gripper calibration.
#[derive(Debug, Clone, Default)]
pub struct RangeMonitor {
    observed: [Option<(f64, f64)>; RANGE_CHANNELS],
    frames: usize,
}

impl RangeMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one frame. Channels beyond the gripper and non-finite values are ignored.
    pub fn observe(&mut self, frame: &[f64]) {
        self.frames += 1;
        for (slot, &value) in self.observed.iter_mut().zip(frame) {
            if !value.is_finite() {
                continue;
            }
            *slot = Some(match *slot {
                Some((lo, hi)) => (lo.min(value), hi.max(value)),
                None => (value, value),
            });
        }
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn joint_range(&self, joint: JointId) -> Option<JointLimits> {
        self.observed[joint.index()].map(|(lo, hi)| JointLimits::new(lo, hi))
    }

    pub fn gripper_range(&self) -> Option<JointLimits> {
        self.observed[ARM_JOINTS].map(|(lo, hi)| JointLimits::new(lo, hi))
    }

    /// Observed ranges as leader limits; joints never seen keep `fallback`.
    pub fn suggested_leader_limits(
        &self,
        fallback: &PerJoint<JointLimits>,
    ) -> PerJoint<JointLimits> {
        PerJoint::from_fn(|joint| self.joint_range(joint).unwrap_or(fallback[joint]))
    }
}
