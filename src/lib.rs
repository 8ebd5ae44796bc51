// teleop_rs: leader -> follower arm angle mapping, safety clamps and offline calibration

pub mod analysis;
pub mod calibration;
pub mod config;
pub mod joint;
pub mod mapping;
pub mod monitor;
pub mod teleop;
pub mod trajectory;

pub use calibration::{CalibrationError, CalibrationReport, SolverOptions, solve};
pub use config::{Config, ConfigError, load_config, save_config};
pub use joint::{ARM_JOINTS, GainSign, JointId, JointLimits, PerJoint};
pub use mapping::{ArmMapping, map_arm, map_gripper, map_joints};
pub use trajectory::{CalibrationSample, Trajectory, TrajectoryError, read_trajectory};
