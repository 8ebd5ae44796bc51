// src/main.rs - teleop-host: mapping, calibration and log tooling for the C650 -> M750 arm pair
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use teleop_rs::analysis::{analyze_log, check_safety, compare, saturated_joints};
use teleop_rs::calibration::{SolverOptions, solve};
use teleop_rs::config::{Config, config_source, resolve_config, save_proposal};
use teleop_rs::joint::ARM_JOINTS;
use teleop_rs::mapping::{map_arm, map_gripper_with};
use teleop_rs::monitor::RangeMonitor;
use teleop_rs::teleop::read_teleop_log;
use teleop_rs::trajectory::read_trajectory;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Saturation share above which `analyze` warns about a joint.
const SATURATION_WARN_PCT: f64 = 5.0;

#[derive(Parser, Debug)]
#[command(name = "teleop-host", about = "Leader -> follower arm mapping and calibration tools.")]
struct Cli {
    /// Path to the TOML config file (defaults to ./teleop.toml, then built-in calibration)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Map one leader sample (six joint angles, optional gripper angle)
    Map {
        #[arg(required = true, allow_hyphen_values = true)]
        angles: Vec<f64>,
    },
    /// Fit follower limits from a leader log and a baseline follower log
    Solve {
        #[arg(long)]
        leader: PathBuf,
        #[arg(long)]
        baseline: PathBuf,
        /// Write the proposed configuration here (never the loaded config in place)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Map a leader log with the current config and compare it against a baseline log
    Compare {
        #[arg(long)]
        leader: PathBuf,
        #[arg(long)]
        baseline: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Summarize a teleop log (bias, ranges, saturation)
    Analyze {
        #[arg(long)]
        log: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Verify that every frame of a leader log maps inside the follower limits
    Check {
        #[arg(long)]
        log: PathBuf,
    },
    /// Report the observed range of each channel in a leader log
    Range {
        #[arg(long)]
        log: PathBuf,
    },
    /// Load and validate the configuration
    Validate,
    /// Print the effective configuration as TOML
    ShowConfig,
}

fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    let config = resolve_config(cli.config.as_deref()).map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        Box::new(e) as BoxError
    })?;

    if let Err(e) = run(cli.command, cli.config.as_deref(), &config) {
        tracing::error!("{}", e);
        return Err(e);
    }
    Ok(())
}

fn run(command: Commands, loaded_from: Option<&Path>, config: &Config) -> Result<(), BoxError> {
    match command {
        Commands::Map { angles } => map_sample(&angles, config),
        Commands::Solve {
            leader,
            baseline,
            output,
            json,
        } => {
            let source = config_source(loaded_from);
            let output = output.as_deref();
            run_solve(&leader, &baseline, output, source.as_deref(), json, config)?
        }
        Commands::Compare {
            leader,
            baseline,
            json,
        } => {
            let report = compare(&read_trajectory(&leader)?, &read_trajectory(&baseline)?, config)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report);
            }
        }
        Commands::Analyze { log, json } => {
            let analysis = analyze_log(&read_teleop_log(&log)?);
            for joint in saturated_joints(&analysis, SATURATION_WARN_PCT) {
                tracing::warn!(
                    "{} saturated in {:.1}% of frames",
                    joint,
                    analysis.joints[joint].saturation_pct
                );
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&analysis)?);
            } else {
                print!("{}", analysis);
            }
        }
        Commands::Check { log } => {
            let report = check_safety(&read_trajectory(&log)?, config);
            if !report.is_safe() {
                return Err(format!(
                    "{} of {} frames left the follower limits",
                    report.violations.len(),
                    report.frames
                )
                .into());
            }
            println!("All {} frames within follower limits", report.frames);
        }
        Commands::Range { log } => {
            let trajectory = read_trajectory(&log)?;
            let mut monitor = RangeMonitor::new();
            for sample in trajectory.samples() {
                monitor.observe(&sample.to_frame());
            }
            println!("Observed {} frames", monitor.frames());
            let suggested = monitor.suggested_leader_limits(&config.leader.limits);
            for (joint, limits) in suggested.iter() {
                let seen = monitor.joint_range(joint).is_some();
                println!("{}: {}{}", joint, limits, if seen { "" } else { " (not observed)" });
            }
            if let Some(gripper) = monitor.gripper_range() {
                println!("Gripper: {}", gripper);
            }
        }
        Commands::Validate => println!("Configuration OK"),
        Commands::ShowConfig => print!("{}", config.to_toml()?),
    }
    Ok(())
}

fn map_sample(angles: &[f64], config: &Config) {
    let mapping = map_arm(angles, config);
    if !mapping.is_processed() {
        tracing::warn!(
            "Need at least {} angles to map, got {}; input returned unchanged",
            ARM_JOINTS,
            angles.len()
        );
    }
    let fmt = |values: &[f64]| {
        values
            .iter()
            .map(|v| format!("{:.2}", v))
            .collect::<Vec<_>>()
            .join(", ")
    };
    println!("Output: [{}]", fmt(&mapping.angles));
    if mapping.is_processed() {
        println!("Norm:   [{}]", fmt(&mapping.normalized));
    }
    if let Some(&gripper) = angles.get(ARM_JOINTS) {
        println!("Gripper: {}", map_gripper_with(gripper, &config.gripper));
    }
}

fn run_solve(
    leader: &Path,
    baseline: &Path,
    output: Option<&Path>,
    loaded_from: Option<&Path>,
    json: bool,
    config: &Config,
) -> Result<(), BoxError> {
    let leader = read_trajectory(leader)?;
    let baseline = read_trajectory(baseline)?;
    tracing::info!(
        "Solving from {} leader / {} baseline samples",
        leader.len(),
        baseline.len()
    );
    let report = solve(
        &leader,
        &baseline,
        &config.leader.limits,
        &SolverOptions::from_config(config),
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report);
    }
    let flagged = report.flagged().count();
    if flagged > 0 {
        tracing::warn!("{} joint(s) need manual review", flagged);
    }

    let proposed = report.apply_to(config);
    match output {
        Some(path) => save_proposal(path, &proposed, loaded_from)?,
        None if !json => {
            println!("\n# Proposed configuration (use --output to save)");
            print!("{}", proposed.to_toml()?);
        }
        None => {}
    }
    Ok(())
}
