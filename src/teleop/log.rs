// src/teleop/log.rs - CSV log of processed teleop frames (input -> norm -> output)
use super::{FrameObserver, TeleopError};
use crate::joint::{ARM_JOINTS, JointId};
use crate::monitor::TeleopSnapshot;
use std::io::{Read, Write};
use std::path::Path;

fn header() -> Vec<String> {
    let mut columns = vec!["Timestamp".to_string()];
    columns.extend(JointId::ALL.iter().map(|j| format!("Input_J{}", j.number())));
    columns.push("Gripper_In".to_string());
    columns.extend(JointId::ALL.iter().map(|j| format!("Norm_J{}", j.number())));
    columns.extend(JointId::ALL.iter().map(|j| format!("Output_J{}", j.number())));
    columns.push("Gripper_Out".to_string());
    columns
}

/// Writes one CSV row per processed frame.
pub struct TeleopLogWriter<W: Write> {
    writer: csv::Writer<W>,
    rows: usize,
}

impl TeleopLogWriter<std::io::BufWriter<std::fs::File>> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, TeleopError> {
        let file = std::fs::File::create(path.as_ref())?;
        tracing::info!("Logging teleop frames to {}", path.as_ref().display());
        Self::new(std::io::BufWriter::new(file))
    }
}

impl<W: Write> TeleopLogWriter<W> {
    pub fn new(inner: W) -> Result<Self, TeleopError> {
        let mut writer = csv::Writer::from_writer(inner);
        writer.write_record(header())?;
        Ok(Self { writer, rows: 0 })
    }

    pub fn write(&mut self, snapshot: &TeleopSnapshot) -> Result<(), TeleopError> {
        let mut row = Vec::with_capacity(4 + 3 * ARM_JOINTS);
        row.push(format!("{:.3}", snapshot.timestamp));
        row.extend(snapshot.input.iter().map(|v| format!("{:.2}", v)));
        row.push(snapshot.gripper_in.map(|g| format!("{:.2}", g)).unwrap_or_default());
        row.extend(snapshot.normalized.iter().map(|v| format!("{:.3}", v)));
        row.extend(snapshot.output.iter().map(|v| format!("{:.2}", v)));
        row.push(snapshot.gripper_out.map(|g| g.to_string()).unwrap_or_default());
        self.writer.write_record(&row)?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn flush(&mut self) -> Result<(), TeleopError> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> Result<W, TeleopError> {
        self.writer
            .into_inner()
            .map_err(|e| TeleopError::Io(std::io::Error::other(e.to_string())))
    }
}

impl<W: Write + Send> FrameObserver for TeleopLogWriter<W> {
    fn observe(&mut self, snapshot: &TeleopSnapshot) {
        // A logging failure must not stop the arm
        if let Err(e) = self.write(snapshot) {
            tracing::warn!("Failed to write teleop log row: {}", e);
        }
    }

    fn finish(&mut self) -> Result<(), TeleopError> {
        self.flush()
    }
}

/// Column positions resolved from a log header.
struct Columns {
    timestamp: usize,
    input: [usize; ARM_JOINTS],
    gripper_in: Option<usize>,
    norm: [usize; ARM_JOINTS],
    output: [usize; ARM_JOINTS],
    gripper_out: Option<usize>,
}

impl Columns {
    fn resolve(headers: &csv::StringRecord) -> Option<Self> {
        let find = |name: &str| headers.iter().position(|h| h == name);
        let per_joint = |prefixes: &[&str]| -> Option<[usize; ARM_JOINTS]> {
            let mut indices = [0; ARM_JOINTS];
            for joint in JointId::ALL {
                indices[joint.index()] = prefixes
                    .iter()
                    .find_map(|p| find(&format!("{}{}", p, joint.number())))?;
            }
            Some(indices)
        };
        Some(Self {
            timestamp: find("Timestamp")?,
            input: per_joint(&["Input_J"])?,
            gripper_in: find("Gripper_In"),
            norm: per_joint(&["Norm_J"])?,
            output: per_joint(&["Output_J", "Cmd_Output_J"])?,
            gripper_out: find("Gripper_Out"),
        })
    }

    fn parse(&self, record: &csv::StringRecord) -> Option<TeleopSnapshot> {
        let field = |i: usize| record.get(i).and_then(|v| v.parse::<f64>().ok());
        let joints = |indices: &[usize; ARM_JOINTS]| -> Option<[f64; ARM_JOINTS]> {
            let mut values = [0.0; ARM_JOINTS];
            for (value, &i) in values.iter_mut().zip(indices) {
                *value = field(i)?;
            }
            Some(values)
        };
        Some(TeleopSnapshot {
            // Older logs carry wall-clock strings here; keep the row anyway
            timestamp: field(self.timestamp).unwrap_or(f64::NAN),
            input: joints(&self.input)?,
            gripper_in: self.gripper_in.and_then(&field),
            normalized: joints(&self.norm)?,
            output: joints(&self.output)?,
            gripper_out: self
                .gripper_out
                .and_then(|i| record.get(i))
                .and_then(|v| v.parse::<f64>().ok())
                .map(|g| g.clamp(0.0, 100.0).round() as u8),
        })
    }
}

/// Parse a teleop log. Rows with missing or non-numeric joint columns are skipped.
pub fn parse_teleop_log<R: Read>(reader: R) -> Result<Vec<TeleopSnapshot>, TeleopError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = csv_reader.headers()?.clone();
    let Some(columns) = Columns::resolve(&headers) else {
        return Err(TeleopError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "teleop log header is missing Timestamp/Input_J*/Norm_J*/Output_J* columns",
        )));
    };

    let mut snapshots = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        match columns.parse(&record) {
            Some(snapshot) => snapshots.push(snapshot),
            None => tracing::debug!("Skipping malformed teleop log row"),
        }
    }
    Ok(snapshots)
}

pub fn read_teleop_log(path: impl AsRef<Path>) -> Result<Vec<TeleopSnapshot>, TeleopError> {
    let file = std::fs::File::open(path.as_ref())?;
    parse_teleop_log(std::io::BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(timestamp: f64, gripper: Option<(f64, u8)>) -> TeleopSnapshot {
        TeleopSnapshot {
            timestamp,
            input: [1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            gripper_in: gripper.map(|(g, _)| g),
            normalized: [0.5, 0.25, 0.0, 1.0, 0.75, 0.125],
            output: [-1.5, 2.5, 3.0, 4.0, 5.0, 6.0],
            gripper_out: gripper.map(|(_, g)| g),
        }
    }

    #[test]
    fn test_write_then_parse() {
        let mut writer = TeleopLogWriter::new(Vec::new()).unwrap();
        writer.write(&snapshot(0.0, Some((-20.5, 31)))).unwrap();
        writer.observe(&snapshot(0.05, None));
        assert_eq!(writer.rows(), 2);
        let bytes = writer.into_inner().unwrap();

        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("Timestamp,Input_J1"));
        let parsed = parse_teleop_log(text.as_bytes()).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0], snapshot(0.0, Some((-20.5, 31))));
        assert_eq!(parsed[1].gripper_in, None);
        assert_eq!(parsed[1].gripper_out, None);
    }

    #[test]
    fn test_accepts_cmd_output_columns() {
        let mut log = String::from("Timestamp");
        for prefix in ["Input_J", "Norm_J", "Cmd_Output_J"] {
            for j in 1..=6 {
                log.push_str(&format!(",{prefix}{j}"));
            }
        }
        log.push_str(",Gripper_Out\n12:00:01.5,1,2,3,4,5,6,0.1,0.2,0.3,0.4,0.5,0.6,7,8,9,10,11,12,55\n");
        let parsed = parse_teleop_log(log.as_bytes()).unwrap();
        assert_eq!(parsed.len(), 1);
        assert!(parsed[0].timestamp.is_nan());
        assert_eq!(parsed[0].output[5], 12.0);
        assert_eq!(parsed[0].gripper_out, Some(55));
    }

    #[test]
    fn test_rejects_unknown_header() {
        assert!(parse_teleop_log("a,b,c\n1,2,3\n".as_bytes()).is_err());
    }
}
