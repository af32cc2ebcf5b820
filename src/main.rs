//! CLI Entry Point for dyno-daq
//!
//! Provides command-line interface for:
//! - Recording a bench run against the simulated encoder
//! - Validating a configuration file
//!
//! # Usage
//!
//! Record a 20 second run:
//! ```bash
//! dyno_daq run --duration 20 --seed 42
//! ```
//!
//! Check a configuration:
//! ```bash
//! dyno_daq check-config --config config/dyno.toml
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dyno_daq::config::{DynoConfig, DEFAULT_CONFIG_PATH};
use dyno_daq::logging;
use dyno_daq::pipeline::Pipeline;
use dyno_daq::sim::{DynoRunProfile, SimulatedEncoder};
use dyno_daq::PulseSource;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "dyno_daq")]
#[command(about = "Encoder-based dynamometer data acquisition", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a run from the simulated encoder
    Run {
        /// Configuration file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Recording length in seconds (defaults to the full profile)
        #[arg(long)]
        duration: Option<f64>,

        /// RNG seed for a reproducible run
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Validate a configuration file and exit
    CheckConfig {
        /// Configuration file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            duration,
            seed,
        } => run(config, duration, seed).await,
        Commands::CheckConfig { config } => check_config(config),
    }
}

fn load_config(path: &Path) -> Result<DynoConfig> {
    let config = DynoConfig::load_from(path)
        .with_context(|| format!("loading configuration from {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

fn check_config(path: PathBuf) -> Result<()> {
    match load_config(&path) {
        Ok(config) => {
            println!("✅ Configuration OK: {}", path.display());
            println!("   Strategy: {:?}", config.encoder.strategy);
            println!("   Inertia: {} kg·m²", config.kinematics.moment_of_inertia);
            println!("   Log: {}", config.storage.output_dir.display());
            println!();
            println!("Effective configuration (file + DYNO_DAQ_* overrides):");
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Invalid configuration: {:#}", e);
            Err(e)
        }
    }
}

async fn run(config_path: PathBuf, duration: Option<f64>, seed: Option<u64>) -> Result<()> {
    let config = load_config(&config_path)?;
    logging::init_from_config(&config)?;

    println!("🚀 {} - dynamometer acquisition", config.application.name);

    let mut profile = DynoRunProfile::default();
    if let Some(secs) = duration {
        anyhow::ensure!(
            secs.is_finite() && secs > 0.0,
            "--duration must be a positive number of seconds"
        );
        profile = profile.with_duration(secs);
    }

    let pipeline = Pipeline::start(&config)?;
    println!("📝 Logging to {}", pipeline.log_path().display());

    let controller = pipeline.controller();
    let mut encoder = SimulatedEncoder::new(profile, seed);
    encoder.start(pipeline.edge_sink())?;
    controller.start();

    println!("▶️  Recording for {:.1} s (Ctrl-C to stop early)...", profile.total_s);
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs_f64(profile.total_s)) => {}
        _ = tokio::signal::ctrl_c() => {
            println!();
            println!("⏹️  Interrupted");
        }
    }

    encoder.stop()?;
    if !pipeline.drain(Duration::from_secs(5)) {
        eprintln!("⚠️  Writer did not catch up, pending samples will be discarded");
    }
    controller.stop();

    let series = pipeline.series();
    let stats = pipeline.shutdown()?;
    let curve = series.power_curve();
    let peak_torque = curve.iter().map(|p| p.torque).fold(0.0, f64::max);
    let peak_power = curve.iter().map(|p| p.power_kw).fold(0.0, f64::max);
    let top_rpm = series.snapshot().iter().map(|r| r.rpm).fold(0.0, f64::max);

    println!();
    println!("✅ Run complete");
    println!("   Records: {}", series.len());
    println!("   Top speed: {:.0} RPM", top_rpm);
    println!("   Peak torque: {:.3} N·m", peak_torque);
    println!("   Peak power: {:.2} kW", peak_power);
    println!(
        "   Dropped: {} overflow, {} faults, {} log failures",
        stats.queue.overflows, stats.writer.estimator_faults, stats.writer.persistence_failures
    );
    if stats.writer.over_speed > 0 {
        println!("   ⚠️  {} records above max RPM", stats.writer.over_speed);
    }

    Ok(())
}
