//! Run configuration
//!
//! A [`ReshapeConfig`] is resolved from three layers, highest first:
//! command line flags, the optional settings file, built-in defaults.

pub mod settings;

pub use settings::{ReshapeSettings, Settings};

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ReshapeError, ReshapeResult};
use crate::reshape::ParallelOptions;

/// Default source directory
pub const DEFAULT_FROM_DIR: &str = "./tmp";

/// Tuning values given on the command line, if any
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TuningOverrides {
    pub max_workers: Option<usize>,
    pub report_interval: Option<Duration>,
}

/// Fully resolved configuration of one `reshape` run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReshapeConfig {
    pub from_dir: PathBuf,
    pub to_dir: PathBuf,
    pub pools: usize,
    pub dry_run: bool,
    pub quiet: bool,
    pub parallel: bool,
    pub parallel_options: ParallelOptions,
}

impl ReshapeConfig {
    pub fn new(from_dir: impl Into<PathBuf>, to_dir: impl Into<PathBuf>, pools: usize) -> Self {
        Self {
            from_dir: from_dir.into(),
            to_dir: to_dir.into(),
            pools,
            dry_run: false,
            quiet: false,
            parallel: false,
            parallel_options: ParallelOptions::default(),
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Layer the settings file and then the command line over the defaults
    pub fn with_tuning(mut self, settings: &Settings, overrides: TuningOverrides) -> Self {
        let defaults = ParallelOptions::default();
        self.parallel_options = ParallelOptions {
            max_workers: overrides
                .max_workers
                .or(settings.reshape.max_workers)
                .unwrap_or(defaults.max_workers),
            report_interval: overrides
                .report_interval
                .or(settings.reshape.report_interval)
                .unwrap_or(defaults.report_interval),
        };
        self
    }

    /// Check the option values that do not need the file system
    pub fn validate(&self) -> ReshapeResult<()> {
        if self.pools < 1 {
            return Err(ReshapeError::config(format!(
                "Number of pools must be positive; got {}",
                self.pools
            )));
        }
        if self.parallel && self.parallel_options.max_workers < 1 {
            return Err(ReshapeError::config(format!(
                "Maximum number of processes must be positive; got {}",
                self.parallel_options.max_workers
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ReshapeConfig::new(DEFAULT_FROM_DIR, "out", 4);
        assert_eq!(config.parallel_options.max_workers, 50);
        assert_eq!(config.parallel_options.report_interval, Duration::from_secs(3));
        assert!(!config.parallel);
        config.validate().unwrap();
    }

    #[test]
    fn test_command_line_wins_over_settings() {
        let settings = Settings {
            reshape: ReshapeSettings {
                max_workers: Some(8),
                report_interval: Some(Duration::from_millis(100)),
            },
        };
        let config = ReshapeConfig::new("in", "out", 2).with_tuning(
            &settings,
            TuningOverrides {
                max_workers: Some(3),
                report_interval: None,
            },
        );
        assert_eq!(config.parallel_options.max_workers, 3);
        assert_eq!(
            config.parallel_options.report_interval,
            Duration::from_millis(100)
        );
    }

    #[test]
    fn test_zero_pools_rejected() {
        let err = ReshapeConfig::new("in", "out", 0).validate().unwrap_err();
        assert!(err.to_string().contains("got 0"));
    }

    #[test]
    fn test_zero_workers_only_matters_in_parallel_mode() {
        let serial = ReshapeConfig::new("in", "out", 2).with_tuning(
            &Settings::default(),
            TuningOverrides {
                max_workers: Some(0),
                report_interval: None,
            },
        );
        serial.validate().unwrap();
        assert!(serial.with_parallel(true).validate().is_err());
    }
}
