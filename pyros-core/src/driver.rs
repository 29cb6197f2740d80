/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Fixed-rate tick driver.
//!
//! Calls [`RunningScheduler::periodic`] on a `tokio::time::interval` until a
//! tick budget is spent, a shutdown future resolves, or a tick fails; then
//! shuts the scheduler down.
//!
//! # Overruns
//! A tick that takes longer than one period is counted as an overrun and,
//! when enabled, logged with `warn!`.  This is a warning only: the loop keeps
//! its single rate and there is no real-time guarantee.  Missed interval ticks
//! are delayed, not bunched ([`MissedTickBehavior::Delay`]).
//!
//! `periodic()` is synchronous and runs on the driving task; use a runtime
//! where blocking that task for one tick is acceptable.

use std::future::Future;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::{period_for_rate, SchedulerConfig};
use crate::scheduler::{RunningScheduler, ShutdownError, TickError};

// ── Options / report ──────────────────────────────────────────────────────────

/// How the driver paces and bounds the loop.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverOptions {
    /// Ticks per second.
    pub rate_hz: f64,
    /// Stop after this many ticks; `None` runs until shutdown.
    pub max_ticks: Option<u64>,
    /// Emit `warn!` for each overrunning tick.
    pub overrun_warning: bool,
}

impl DriverOptions {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            rate_hz: config.tick_rate_hz,
            max_ticks: None,
            overrun_warning: config.overrun_warning,
        }
    }

    pub fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.max_ticks = Some(max_ticks);
        self
    }

    fn period(&self) -> Result<Duration, DriverError> {
        period_for_rate(self.rate_hz).ok_or(DriverError::InvalidRate(self.rate_hz))
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverReport {
    /// Ticks that completed.
    pub ticks: u64,
    /// Ticks that took longer than one period.
    pub overruns: u64,
}

/// Why the driver stopped abnormally.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("tick rate must be a positive number with a representable period, got {0}")]
    InvalidRate(f64),

    #[error("tick failed")]
    Tick(#[from] TickError),

    #[error("scheduler shutdown failed")]
    Shutdown(#[from] ShutdownError),
}

// ── Driver loop ───────────────────────────────────────────────────────────────

/// Drive `scheduler` at a fixed rate until stopped, then shut it down.
///
/// `shutdown` is polled between ticks only; a tick in progress always runs to
/// completion.
///
/// # Errors
/// * [`DriverError::InvalidRate`] – non-positive or non-finite rate, or a
///   rate whose period does not fit a non-zero `Duration`.
/// * [`DriverError::Tick`] – `periodic()` failed.  The scheduler is still
///   shut down (its own failure is only logged) before returning.
/// * [`DriverError::Shutdown`] – a Subscriber's shutdown hook failed.
pub async fn run_fixed_rate<F>(
    mut scheduler: RunningScheduler,
    options: DriverOptions,
    shutdown: F,
) -> Result<DriverReport, DriverError>
where
    F: Future<Output = ()>,
{
    let period = options.period()?;
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    info!(
        rate_hz = options.rate_hz,
        period_us = period.as_micros() as u64,
        max_ticks = ?options.max_ticks,
        "=== fixed-rate loop starting ==="
    );

    let mut report = DriverReport::default();
    loop {
        if options.max_ticks.is_some_and(|max| report.ticks >= max) {
            debug!(ticks = report.ticks, "tick budget reached");
            break;
        }

        tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!(ticks = report.ticks, "shutdown requested");
                break;
            }
            _ = ticker.tick() => {}
        }

        let started = Instant::now();
        if let Err(e) = scheduler.periodic() {
            error!(tick = report.ticks, error = %e, "tick failed, stopping loop");
            if let Err(shutdown_err) = scheduler.shutdown() {
                warn!(error = %shutdown_err, "shutdown after failed tick also failed");
            }
            return Err(e.into());
        }
        report.ticks += 1;

        let elapsed = started.elapsed();
        if elapsed > period {
            report.overruns += 1;
            if options.overrun_warning {
                warn!(
                    tick = report.ticks - 1,
                    elapsed_us = elapsed.as_micros() as u64,
                    period_us = period.as_micros() as u64,
                    "tick overran its period"
                );
            }
        }
    }

    scheduler.shutdown()?;
    info!(
        ticks = report.ticks,
        overruns = report.overruns,
        "=== fixed-rate loop stopped ==="
    );
    Ok(report)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
