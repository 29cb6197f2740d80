//! Scheduler configuration loading.
//!
//! The expected YAML structure is:
//! ```yaml
//! scheduler:
//!   is_sim: false
//!   fail_fast_on_hardware_failure: true
//!   log_dir: "/var/log/pyros"
//!   tick_rate_hz: 50.0
//!   overrun_warning: true
//! ```
//!
//! Every field is optional, and so is the `scheduler:` section itself.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

/// Default loop rate when none is configured.
pub const DEFAULT_TICK_RATE_HZ: f64 = 50.0;

// ── Private YAML deserialization types ────────────────────────────────────────

/// Top-level wrapper that maps directly onto the YAML file layout.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    scheduler: Option<SchedulerEntry>,
}

/// Scheduler fields as they appear in the YAML file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SchedulerEntry {
    #[serde(default)]
    is_sim: bool,
    #[serde(default = "default_true")]
    fail_fast_on_hardware_failure: bool,
    #[serde(default = "default_log_dir")]
    log_dir: PathBuf,
    #[serde(default = "default_tick_rate_hz")]
    tick_rate_hz: f64,
    #[serde(default = "default_true")]
    overrun_warning: bool,
}

fn default_true() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_tick_rate_hz() -> f64 {
    DEFAULT_TICK_RATE_HZ
}

// ── Public data structure ─────────────────────────────────────────────────────

/// Mode flags, log location and loop rate for one scheduler instance.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Simulation mode: no tick log, replay-configured Topics are skipped.
    pub is_sim: bool,
    /// Abort `initialize` when a Subscriber's hardware fails to come up.
    pub fail_fast_on_hardware_failure: bool,
    /// Directory the tick log is created in.
    pub log_dir: PathBuf,
    /// Fixed loop rate for the driver.
    pub tick_rate_hz: f64,
    /// Emit a warning when a tick runs longer than one period.
    pub overrun_warning: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            is_sim: false,
            fail_fast_on_hardware_failure: true,
            log_dir: default_log_dir(),
            tick_rate_hz: DEFAULT_TICK_RATE_HZ,
            overrun_warning: true,
        }
    }
}

impl SchedulerConfig {
    /// Parse `path` into a configuration.
    ///
    /// A file without a `scheduler:` section yields [`SchedulerConfig::default`].
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened, the YAML is structurally
    /// invalid, or the tick rate is not a positive finite number.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading scheduler configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        Self::from_yaml_str(&content)
            .with_context(|| format!("Invalid configuration file: {}", path.display()))
    }

    /// Parse a YAML document.  An empty document yields the defaults.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let file: ConfigFile = if content.trim().is_empty() {
            ConfigFile::default()
        } else {
            serde_yaml::from_str(content).context("Failed to parse YAML")?
        };

        let config = match file.scheduler {
            Some(entry) => Self {
                is_sim: entry.is_sim,
                fail_fast_on_hardware_failure: entry.fail_fast_on_hardware_failure,
                log_dir: entry.log_dir,
                tick_rate_hz: entry.tick_rate_hz,
                overrun_warning: entry.overrun_warning,
            },
            None => {
                debug!("No scheduler section, using defaults");
                Self::default()
            }
        };
        config.validate()?;

        debug!(
            is_sim = config.is_sim,
            fail_fast = config.fail_fast_on_hardware_failure,
            log_dir = %config.log_dir.display(),
            tick_rate_hz = config.tick_rate_hz,
            "scheduler configuration"
        );
        Ok(config)
    }

    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        self.tick_period().map(|_| ())
    }

    /// Duration of one tick at the configured rate.
    ///
    /// # Errors
    /// The rate is not a positive finite number, or its period does not fit
    /// a non-zero [`Duration`].
    pub fn tick_period(&self) -> Result<Duration> {
        match period_for_rate(self.tick_rate_hz) {
            Some(period) => Ok(period),
            None => bail!(
                "tick_rate_hz must be a positive number with a representable period, got {}",
                self.tick_rate_hz
            ),
        }
    }
}

/// Period of a loop running at `rate_hz`, or `None` when the rate is not
/// positive and finite or `1 / rate_hz` is zero or overflows a [`Duration`].
pub fn period_for_rate(rate_hz: f64) -> Option<Duration> {
    if !rate_hz.is_finite() || rate_hz <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(1.0 / rate_hz)
        .ok()
        .filter(|period| !period.is_zero())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Helper: write a YAML string to a temp file and return it.
    fn yaml_tempfile(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn load_full_yaml() {
        let yaml = r#"
scheduler:
  is_sim: true
  fail_fast_on_hardware_failure: false
  log_dir: "/tmp/pyros"
  tick_rate_hz: 100.0
  overrun_warning: false
"#;
        let f = yaml_tempfile(yaml);
        let cfg = SchedulerConfig::load_from_file(f.path()).unwrap();

        assert!(cfg.is_sim);
        assert!(!cfg.fail_fast_on_hardware_failure);
        assert_eq!(cfg.log_dir, PathBuf::from("/tmp/pyros"));
        assert_eq!(cfg.tick_rate_hz, 100.0);
        assert!(!cfg.overrun_warning);
        assert_eq!(cfg.tick_period().unwrap(), Duration::from_millis(10));
    }

    #[test]
    fn optional_fields_use_defaults_when_absent() {
        let f = yaml_tempfile("scheduler:\n  is_sim: true\n");
        let cfg = SchedulerConfig::load_from_file(f.path()).unwrap();

        assert!(cfg.is_sim);
        assert!(cfg.fail_fast_on_hardware_failure); // default = fail fast
        assert_eq!(cfg.log_dir, PathBuf::from("."));
        assert_eq!(cfg.tick_rate_hz, DEFAULT_TICK_RATE_HZ);
        assert!(cfg.overrun_warning);
    }

    #[test]
    fn missing_section_and_empty_file_yield_defaults() {
        assert_eq!(
            SchedulerConfig::from_yaml_str("other: 1\n").unwrap(),
            SchedulerConfig::default()
        );
        assert_eq!(
            SchedulerConfig::from_yaml_str("").unwrap(),
            SchedulerConfig::default()
        );
    }

    #[test]
    fn missing_file_returns_error() {
        let result = SchedulerConfig::load_from_file(Path::new("/nonexistent/path/pyros.yaml"));
        assert!(result.is_err());
    }

    #[test]
    fn malformed_yaml_returns_error() {
        let f = yaml_tempfile("this is: not: valid: yaml: content:::");
        assert!(SchedulerConfig::load_from_file(f.path()).is_err());
    }

    #[test]
    fn unknown_field_is_rejected() {
        let err = SchedulerConfig::from_yaml_str("scheduler:\n  tick_rate: 10\n").unwrap_err();
        assert!(format!("{err:#}").contains("tick_rate"), "{err:#}");
    }

    #[test]
    fn non_positive_rate_is_rejected() {
        assert!(SchedulerConfig::from_yaml_str("scheduler:\n  tick_rate_hz: 0\n").is_err());
        assert!(SchedulerConfig::from_yaml_str("scheduler:\n  tick_rate_hz: -5.0\n").is_err());
    }

    #[test]
    fn rate_with_unrepresentable_period_is_rejected() {
        // 1 / 1e-300 s overflows a Duration; 1 / 1e300 s rounds to zero
        let err = SchedulerConfig::from_yaml_str("scheduler:\n  tick_rate_hz: 1.0e-300\n")
            .unwrap_err();
        assert!(format!("{err:#}").contains("tick_rate_hz"), "{err:#}");
        assert!(SchedulerConfig::from_yaml_str("scheduler:\n  tick_rate_hz: 1.0e300\n").is_err());

        let cfg = SchedulerConfig {
            tick_rate_hz: 1.0e-300,
            ..SchedulerConfig::default()
        };
        assert!(cfg.tick_period().is_err());
    }

    #[test]
    fn period_for_rate_bounds() {
        assert_eq!(period_for_rate(50.0), Some(Duration::from_millis(20)));
        assert_eq!(period_for_rate(0.5), Some(Duration::from_secs(2)));
        assert_eq!(period_for_rate(0.0), None);
        assert_eq!(period_for_rate(f64::NAN), None);
        assert_eq!(period_for_rate(f64::INFINITY), None);
        assert_eq!(period_for_rate(1.0e-300), None);
        assert_eq!(period_for_rate(1.0e300), None);
    }
}
