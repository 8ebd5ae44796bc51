//! # Teleoperation Configuration
//!
//! Leader input ranges, follower safety ranges, per-joint direction and home
//! offsets, and gripper calibration, loaded from a single TOML file.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [leader]
//! limits = [[-161.8, 152.49], [-198.2, 190.38], [-188.62, 183.2],
//!           [-164.61, 160.22], [-118.74, 75.41], [-145.28, 153.1]]
//! home_offsets = [0.0, 0.0, 0.0, 0.0, -25.0, 23.0]
//!
//! [follower]
//! limits = [[-165.0, 165.0], [-54.0, 100.0], [-100.0, 62.0],
//!           [-152.0, 155.0], [-90.0, 120.0], [-148.0, 162.0]]
//! gain_signs = [-1.0, 1.0, 1.0, 1.0, 1.0, -1.0]
//!
//! [gripper]
//! leader_closed = 10.89
//! leader_open = -88.76
//! ```
//!
//! - Lists shorter than six entries are padded with `[-180, 180]`, gain `1.0`
//!   and offset `0.0`.
//! - Direction is expressed only through `gain_signs`; limit pairs must be
//!   written as `[min, max]` (see [`Config::validate`]).
//!
//! The configuration is an immutable value: it is loaded once and passed by
//! reference into every mapping and solver call.

use crate::joint::{GainSign, JointId, JointLimits, PerJoint};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("Invalid {field}: {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Full mapping configuration for a leader/follower arm pair.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub leader: LeaderConfig,
    #[serde(default)]
    pub follower: FollowerConfig,
    #[serde(default)]
    pub gripper: GripperConfig,
    #[serde(default)]
    pub solver: SolverConfig,
}

/// Leader (input) arm calibration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LeaderConfig {
    #[serde(default = "default_leader_limits")]
    pub limits: PerJoint<JointLimits>,
    #[serde(default = "default_home_offsets")]
    pub home_offsets: PerJoint<f64>,
}

impl Default for LeaderConfig {
    fn default() -> Self {
        Self {
            limits: default_leader_limits(),
            home_offsets: default_home_offsets(),
        }
    }
}

/// Follower (output) arm safety ranges and direction.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FollowerConfig {
    #[serde(default = "default_follower_limits")]
    pub limits: PerJoint<JointLimits>,
    #[serde(default = "default_gain_signs")]
    pub gain_signs: PerJoint<GainSign>,
}

impl Default for FollowerConfig {
    fn default() -> Self {
        Self {
            limits: default_follower_limits(),
            gain_signs: default_gain_signs(),
        }
    }
}

/// Observed leader gripper angles at the fully closed and fully open positions.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct GripperConfig {
    #[serde(default = "default_gripper_closed")]
    pub leader_closed: f64,
    #[serde(default = "default_gripper_open")]
    pub leader_open: f64,
}

impl Default for GripperConfig {
    fn default() -> Self {
        Self {
            leader_closed: default_gripper_closed(),
            leader_open: default_gripper_open(),
        }
    }
}

/// Thresholds used by the calibration solver to flag unreliable fits.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct SolverConfig {
    #[serde(default = "default_min_slope")]
    pub min_slope: f64,
    #[serde(default = "default_min_r_squared")]
    pub min_r_squared: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            min_slope: default_min_slope(),
            min_r_squared: default_min_r_squared(),
        }
    }
}

impl Config {
    /// Check the configuration before it is used to drive hardware.
    ///
    /// Reversed limit pairs are rejected: a reversed follower pair combined
    /// with an explicit gain sign has no single meaning. Equal leader limits
    /// are allowed (the joint then always maps to the follower midpoint) but
    /// logged as a warning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (joint, limits) in self.leader.limits.iter() {
            check_limits("leader", joint, limits)?;
            if limits.is_degenerate() {
                tracing::warn!(
                    "Leader {} range is degenerate {}; it will always map to the follower midpoint",
                    joint,
                    limits
                );
            }
        }
        for (joint, limits) in self.follower.limits.iter() {
            check_limits("follower", joint, limits)?;
        }
        for (joint, offset) in self.leader.home_offsets.iter() {
            if !offset.is_finite() {
                return Err(ConfigError::invalid(
                    format!("leader.home_offsets {}", joint),
                    "must be finite",
                ));
            }
        }
        if !self.gripper.leader_closed.is_finite() || !self.gripper.leader_open.is_finite() {
            return Err(ConfigError::invalid("gripper", "calibration angles must be finite"));
        }
        if self.gripper.leader_closed == self.gripper.leader_open {
            tracing::warn!("Gripper closed and open angles are equal; gripper will hold at 50");
        }
        if self.solver.min_slope < 0.0 || !self.solver.min_slope.is_finite() {
            return Err(ConfigError::invalid("solver.min_slope", "must be a finite value >= 0"));
        }
        if !(0.0..=1.0).contains(&self.solver.min_r_squared) {
            return Err(ConfigError::invalid(
                "solver.min_r_squared",
                "must be between 0 and 1",
            ));
        }
        Ok(())
    }

    /// Render the configuration as a TOML document.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }
}

fn check_limits(side: &str, joint: JointId, limits: &JointLimits) -> Result<(), ConfigError> {
    let field = format!("{}.limits {}", side, joint);
    if !limits.is_finite() {
        return Err(ConfigError::invalid(field, "limits must be finite"));
    }
    if limits.is_reversed() {
        return Err(ConfigError::invalid(
            field,
            format!(
                "limits {} are reversed; write [min, max] and use follower.gain_signs to invert",
                limits
            ),
        ));
    }
    Ok(())
}

// Default value functions: the shipped C650 -> M750 calibration
fn default_leader_limits() -> PerJoint<JointLimits> {
    PerJoint::new([
        JointLimits::new(-161.8, 152.49),
        JointLimits::new(-198.2, 190.38),
        JointLimits::new(-188.62, 183.2),
        JointLimits::new(-164.61, 160.22),
        JointLimits::new(-118.74, 75.41),
        JointLimits::new(-145.28, 153.1),
    ])
}
fn default_home_offsets() -> PerJoint<f64> {
    PerJoint::new([0.0, 0.0, 0.0, 0.0, -25.0, 23.0])
}
fn default_follower_limits() -> PerJoint<JointLimits> {
    PerJoint::new([
        JointLimits::new(-165.0, 165.0),
        JointLimits::new(-54.0, 100.0),
        JointLimits::new(-100.0, 62.0),
        JointLimits::new(-152.0, 155.0),
        JointLimits::new(-90.0, 120.0),
        JointLimits::new(-148.0, 162.0),
    ])
}
fn default_gain_signs() -> PerJoint<GainSign> {
    use GainSign::{Inverted, Normal};
    PerJoint::new([Inverted, Normal, Normal, Normal, Normal, Inverted])
}
fn default_gripper_closed() -> f64 { 10.89 }
fn default_gripper_open() -> f64 { -88.76 }
fn default_min_slope() -> f64 { 0.01 }
fn default_min_r_squared() -> f64 { 0.5 }

/// Load configuration from a TOML file at the given path.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::error!("Failed to parse config TOML: {}", e);
                Err(ConfigError::Toml(e))
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path.display(), e);
            Err(ConfigError::Io(e))
        }
    }
}

/// Config file looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "teleop.toml";

/// Load and validate the configuration used by the binaries.
///
/// An explicit `path` must exist. Without one, [`DEFAULT_CONFIG_PATH`] is
/// used if present, otherwise the built-in defaults.
pub fn resolve_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config = match path {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            load_config(path)?
        }
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            tracing::info!("Loading configuration from: {}", DEFAULT_CONFIG_PATH);
            load_config(DEFAULT_CONFIG_PATH)?
        }
        None => {
            tracing::info!("No {} found, using built-in calibration", DEFAULT_CONFIG_PATH);
            Config::default()
        }
    };
    config.validate()?;
    Ok(config)
}

/// Write configuration to a TOML file, replacing any existing file.
pub fn save_config(path: impl AsRef<Path>, config: &Config) -> Result<(), ConfigError> {
    let path = path.as_ref();
    let contents = config.to_toml()?;
    std::fs::write(path, contents)?;
    tracing::info!("Wrote configuration to {}", path.display());
    Ok(())
}

/// The file [`resolve_config`] reads for `path`, if any.
pub fn config_source(path: Option<&Path>) -> Option<PathBuf> {
    match path {
        Some(path) => Some(path.to_path_buf()),
        None => Some(PathBuf::from(DEFAULT_CONFIG_PATH)).filter(|p| p.exists()),
    }
}

/// Save a proposed configuration to a new file. Refuses to replace the
/// configuration it was derived from.
pub fn save_proposal(
    path: &Path,
    config: &Config,
    loaded_from: Option<&Path>,
) -> Result<(), ConfigError> {
    if loaded_from.is_some_and(|source| same_file(path, source)) {
        return Err(ConfigError::invalid(
            "output",
            format!("{} is the loaded configuration; pick a new file", path.display()),
        ));
    }
    save_config(path, config)
}

fn same_file(a: &Path, b: &Path) -> bool {
    // A path that does not exist yet cannot be the loaded file
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
