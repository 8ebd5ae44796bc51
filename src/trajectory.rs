// src/trajectory.rs - Recorded joint-angle trajectories and their CSV log format
use crate::joint::{ARM_JOINTS, JointId};
use std::io::{Read, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrajectoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Timestamp decreases at sample {index}: {previous} -> {current}")]
    NonMonotonic {
        index: usize,
        previous: f64,
        current: f64,
    },
    #[error("Non-finite value in sample {index}")]
    NonFinite { index: usize },
}

/// One recorded frame: time relative to the first frame, six joint angles
/// in degrees and the gripper angle when the log carries one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationSample {
    pub time: f64,
    pub angles: [f64; ARM_JOINTS],
    pub gripper: Option<f64>,
}

impl CalibrationSample {
    pub fn new(time: f64, angles: [f64; ARM_JOINTS]) -> Self {
        Self {
            time,
            angles,
            gripper: None,
        }
    }

    pub fn with_gripper(mut self, gripper: f64) -> Self {
        self.gripper = Some(gripper);
        self
    }

    /// Arm angles followed by the gripper, as a live leader read would return them.
    pub fn to_frame(&self) -> Vec<f64> {
        let mut frame = self.angles.to_vec();
        frame.extend(self.gripper);
        frame
    }

    fn is_finite(&self) -> bool {
        self.time.is_finite()
            && self.angles.iter().all(|a| a.is_finite())
            && self.gripper.is_none_or(f64::is_finite)
    }
}

/// Time-ascending sequence of samples from a single source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trajectory {
    samples: Vec<CalibrationSample>,
}

impl Trajectory {
    /// Build a trajectory, rebasing time so the first sample is at zero.
    ///
    /// Equal consecutive timestamps are accepted; decreasing ones are not.
    pub fn new(mut samples: Vec<CalibrationSample>) -> Result<Self, TrajectoryError> {
        for (index, sample) in samples.iter().enumerate() {
            if !sample.is_finite() {
                return Err(TrajectoryError::NonFinite { index });
            }
        }
        for (index, pair) in samples.windows(2).enumerate() {
            if pair[1].time < pair[0].time {
                return Err(TrajectoryError::NonMonotonic {
                    index: index + 1,
                    previous: pair[0].time,
                    current: pair[1].time,
                });
            }
        }
        if let Some(start) = samples.first().map(|s| s.time) {
            for sample in &mut samples {
                sample.time -= start;
            }
        }
        Ok(Self { samples })
    }

    /// Parse a CSV trajectory log.
    ///
    /// The first row is a header. Column 0 is the timestamp in seconds,
    /// columns 1-6 are J1..J6 in degrees and an optional column 7 is the
    /// gripper. Rows that do not parse are skipped.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, TrajectoryError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut samples = Vec::new();
        let mut skipped = 0usize;
        for (row, record) in csv_reader.records().enumerate() {
            let record = record?;
            match parse_row(&record) {
                Some(sample) => samples.push(sample),
                None => {
                    skipped += 1;
                    tracing::debug!("Skipping malformed trajectory row {}", row + 1);
                }
            }
        }
        if skipped > 0 {
            tracing::warn!("Skipped {} malformed trajectory rows", skipped);
        }
        Self::new(samples)
    }

    /// Write the trajectory in the same CSV layout [`Trajectory::from_reader`] reads.
    pub fn write_to<W: Write>(&self, writer: W) -> Result<(), TrajectoryError> {
        let mut csv_writer = csv::WriterBuilder::new().flexible(true).from_writer(writer);
        let with_gripper = self.samples.iter().any(|s| s.gripper.is_some());

        let mut header = vec!["Timestamp".to_string()];
        header.extend(JointId::ALL.iter().map(|j| j.to_string()));
        if with_gripper {
            header.push("Gripper".to_string());
        }
        csv_writer.write_record(&header)?;

        for sample in &self.samples {
            let mut row = vec![format!("{:.4}", sample.time)];
            row.extend(sample.angles.iter().map(|a| a.to_string()));
            if with_gripper {
                row.push(sample.gripper.map(|g| g.to_string()).unwrap_or_default());
            }
            csv_writer.write_record(&row)?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    pub fn samples(&self) -> &[CalibrationSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Timestamp of the last sample (the first is always zero).
    pub fn duration(&self) -> f64 {
        self.samples.last().map_or(0.0, |s| s.time)
    }

    pub fn times(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.time).collect()
    }

    pub fn joint_series(&self, joint: JointId) -> Vec<f64> {
        self.samples.iter().map(|s| s.angles[joint.index()]).collect()
    }
}

fn parse_row(record: &csv::StringRecord) -> Option<CalibrationSample> {
    let time: f64 = record.get(0)?.parse().ok()?;
    let mut angles = [0.0; ARM_JOINTS];
    for (i, angle) in angles.iter_mut().enumerate() {
        *angle = record.get(i + 1)?.parse().ok()?;
    }
    let gripper = record
        .get(ARM_JOINTS + 1)
        .filter(|field| !field.is_empty())
        .and_then(|field| field.parse().ok());
    let sample = CalibrationSample {
        time,
        angles,
        gripper,
    };
    sample.is_finite().then_some(sample)
}

/// Read a trajectory log from disk.
pub fn read_trajectory(path: impl AsRef<Path>) -> Result<Trajectory, TrajectoryError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|e| {
        tracing::error!("Failed to open trajectory log '{}': {}", path.display(), e);
        e
    })?;
    let trajectory = Trajectory::from_reader(std::io::BufReader::new(file))?;
    tracing::info!(
        "Loaded {} samples ({:.1}s) from {}",
        trajectory.len(),
        trajectory.duration(),
        path.display()
    );
    Ok(trajectory)
}

/// Write a trajectory log to disk.
pub fn write_trajectory(
    path: impl AsRef<Path>,
    trajectory: &Trajectory,
) -> Result<(), TrajectoryError> {
    let file = std::fs::File::create(path.as_ref())?;
    trajectory.write_to(std::io::BufWriter::new(file))
}
