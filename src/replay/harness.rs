//! CLI entry point for the replay harness: drives the live teleop loop from a recorded
//! leader log and writes the processed frames as a teleop log.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use teleop_rs::config::resolve_config;
use teleop_rs::monitor::{snapshot_slot, spawn_console_monitor};
use teleop_rs::teleop::{
    RecordingFollower, ReplayLeader, TeleopLogWriter, TeleopLoop, TeleopOptions,
};
use teleop_rs::trajectory::read_trajectory;
use tokio::sync::watch;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Replay Harness CLI
#[derive(Parser, Debug)]
#[command(name = "replay_harness", about = "Replay a raw leader log through the teleop loop.")]
struct Cli {
    /// Raw leader log (Timestamp, J1..J6[, Gripper])
    #[arg(short, long)]
    input: PathBuf,

    /// Teleop log to write (default: teleop_log_<timestamp>.csv)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Loop rate in Hz; 0 replays as fast as possible
    #[arg(long, default_value_t = 50.0)]
    rate: f64,

    /// Print the live dashboard while replaying
    #[arg(long)]
    monitor: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    if !cli.rate.is_finite() || cli.rate < 0.0 {
        return Err(format!("--rate must be finite and non-negative, got {}", cli.rate).into());
    }

    let config = resolve_config(cli.config.as_deref()).map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        Box::new(e) as BoxError
    })?;
    let trajectory = read_trajectory(&cli.input).map_err(|e| {
        tracing::error!("Failed to read {}: {}", cli.input.display(), e);
        Box::new(e) as BoxError
    })?;
    tracing::info!(
        "Replaying {} samples ({:.1}s) from {}",
        trajectory.len(),
        trajectory.duration(),
        cli.input.display()
    );

    let output = cli.output.unwrap_or_else(|| {
        PathBuf::from(format!(
            "teleop_log_{}.csv",
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        ))
    });
    let options = TeleopOptions {
        rate_hz: (cli.rate > 0.0).then_some(cli.rate),
        ..TeleopOptions::default()
    };

    let mut teleop = TeleopLoop::new(
        ReplayLeader::new(&trajectory),
        RecordingFollower::default(),
        Arc::new(config),
        options,
    );
    teleop.add_observer(Box::new(TeleopLogWriter::create(&output)?));

    let mut monitor_task = None;
    if cli.monitor {
        let (publisher, reader) = snapshot_slot();
        monitor_task = Some(spawn_console_monitor(reader, Duration::from_millis(100)));
        teleop.add_observer(Box::new(publisher));
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl+C received, stopping replay");
            let _ = stop_tx.send(true);
        }
    });

    let stats = teleop.run(stop_rx).await;
    // Closes the snapshot slot so the monitor task returns
    drop(teleop);
    if let Some(task) = monitor_task {
        if let Err(e) = task.await {
            tracing::warn!("Monitor task failed: {}", e);
        }
    }
    if stats.observer_errors > 0 {
        return Err(format!("teleop log {} is incomplete", output.display()).into());
    }

    println!(
        "Replayed {} frames ({} forwarded, {} skipped) -> {}",
        stats.frames_read,
        stats.frames_forwarded,
        stats.frames_skipped,
        output.display()
    );
    Ok(())
}
