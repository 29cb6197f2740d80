/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

mod demo;

use std::path::PathBuf;
use std::process;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use pyros_core::driver::{run_fixed_rate, DriverOptions};
use pyros_core::{Scheduler, SchedulerConfig};

use demo::{DriveBase, Odometry, Setpoint, WheelEncoders};

// ── CLI argument definition ───────────────────────────────────────────────────

/// Pyros control-loop runner.
///
/// Example:
///   pyros-runner --config scheduler.yaml --rate 100 --ticks 500
#[derive(Debug, Parser)]
#[command(
    name = "pyros-runner",
    about = "Pyros fixed-rate scheduler driving a simulated differential-drive robot",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML scheduler configuration file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Run in simulation mode (no hardware binding, no tick log).
    #[arg(long = "sim", default_value_t = false)]
    sim: bool,

    /// Keep running when a Subscriber's hardware fails to initialise.
    #[arg(long = "no-fail-fast", default_value_t = false)]
    no_fail_fast: bool,

    /// Tick rate in Hz (overrides the configuration file).
    #[arg(short = 'r', long = "rate")]
    rate: Option<f64>,

    /// Stop after this many ticks; runs until Ctrl-C when omitted.
    #[arg(short = 't', long = "ticks")]
    ticks: Option<u64>,

    /// Directory for the tick log (overrides the configuration file).
    #[arg(short = 'l', long = "log-dir")]
    log_dir: Option<PathBuf>,
}

impl Cli {
    /// Command-line flags win over the file.
    fn apply(&self, config: &mut SchedulerConfig) {
        if self.sim {
            config.is_sim = true;
        }
        if self.no_fail_fast {
            config.fail_fast_on_hardware_failure = false;
        }
        if let Some(rate) = self.rate {
            config.tick_rate_hz = rate;
        }
        if let Some(dir) = &self.log_dir {
            config.log_dir = dir.clone();
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Pyros runner starting up...");

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // ── Load configuration ────────────────────────────────────────────────────
    let mut config = match &cli.config {
        Some(path) => SchedulerConfig::load_from_file(path)?,
        None => {
            warn!("No configuration file provided, using default scheduler settings");
            SchedulerConfig::default()
        }
    };
    cli.apply(&mut config);

    config.validate()?;
    info!(
        sim          = config.is_sim,
        fail_fast    = config.fail_fast_on_hardware_failure,
        rate_hz      = config.tick_rate_hz,
        log_dir      = %config.log_dir.display(),
        ticks        = ?cli.ticks,
        "Configuration"
    );

    // ── Assemble the robot ────────────────────────────────────────────────────
    let setpoint = Setpoint::default();
    let tick_seconds = config.tick_period()?.as_secs_f64();

    let mut scheduler = Scheduler::from_config(&config);
    scheduler
        .add_topic(WheelEncoders::new(setpoint.clone(), tick_seconds))
        .add_topic(Odometry::new())
        .add_subscriber(DriveBase::new(config.tick_rate_hz.round().max(1.0) as u64))
        .set_command_group(demo::square_leg(&setpoint, config.tick_rate_hz));

    let running = scheduler
        .initialize()
        .context("scheduler failed to initialise")?;
    if let Some(path) = running.log_path() {
        info!("Tick log: {}", path.display());
    }
    for name in running.degraded_subscribers() {
        warn!(subscriber = name, "running without hardware");
    }

    // ── Run ───────────────────────────────────────────────────────────────────
    let mut options = DriverOptions::from_config(&config);
    if let Some(ticks) = cli.ticks {
        options = options.with_max_ticks(ticks);
    }

    let report = run_fixed_rate(running, options, ctrl_c())
        .await
        .context("control loop stopped with an error")?;

    info!(
        ticks = report.ticks,
        overruns = report.overruns,
        "Pyros runner finished"
    );
    Ok(())
}

/// Resolves on Ctrl-C.  If the handler cannot be installed the loop runs
/// until its tick budget is spent.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Ctrl-C handler unavailable: {}", e);
        std::future::pending::<()>().await;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let cli = Cli::try_parse_from([
            "pyros-runner",
            "--sim",
            "--no-fail-fast",
            "--rate",
            "100",
            "--log-dir",
            "/tmp/pyros",
            "--ticks",
            "10",
        ])
        .unwrap();

        let mut config = SchedulerConfig::default();
        cli.apply(&mut config);
        assert!(config.is_sim);
        assert!(!config.fail_fast_on_hardware_failure);
        assert_eq!(config.tick_rate_hz, 100.0);
        assert_eq!(config.log_dir, PathBuf::from("/tmp/pyros"));
        assert_eq!(cli.ticks, Some(10));
    }

    #[test]
    fn absent_flags_keep_config() {
        let cli = Cli::try_parse_from(["pyros-runner"]).unwrap();
        let mut config = SchedulerConfig {
            tick_rate_hz: 20.0,
            ..SchedulerConfig::default()
        };
        cli.apply(&mut config);
        assert_eq!(config, SchedulerConfig {
            tick_rate_hz: 20.0,
            ..SchedulerConfig::default()
        });
    }

    #[tokio::test(start_paused = true)]
    async fn short_simulated_run() {
        let cli = Cli::try_parse_from(["pyros-runner", "--sim", "--ticks", "25"]).unwrap();
        run(cli).await.unwrap();
    }

    #[tokio::test]
    async fn tiny_rate_fails_without_panicking() {
        let cli = Cli::try_parse_from(["pyros-runner", "--sim", "--rate", "1e-300", "--ticks", "1"])
            .unwrap();
        let err = run(cli).await.unwrap_err();
        assert!(format!("{err:#}").contains("tick_rate_hz"), "{err:#}");
    }
}
