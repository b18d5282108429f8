//! CLI argument structures

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{ReshapeConfig, Settings, TuningOverrides, DEFAULT_FROM_DIR};
use crate::error::{ReshapeError, ReshapeResult};

/// Utilities for Perturbo eph_g2 pool files
#[derive(Parser, Debug)]
#[command(name = "pertool")]
#[command(about = "pertool - Utilities for Perturbo eph_g2 pool files", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Rewrite a set of pool files for a different number of pools
    #[command(name = "reshape")]
    Reshape(ReshapeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ReshapeArgs {
    /// Directory holding the source pool files
    #[arg(short = 'f', long = "fromdir", default_value = DEFAULT_FROM_DIR)]
    pub from_dir: PathBuf,

    /// Directory to write the new pool files to; must be absent or empty
    #[arg(short = 't', long = "todir")]
    pub to_dir: PathBuf,

    /// Number of pools to generate
    #[arg(short = 'p', long, allow_negative_numbers = true)]
    pub pools: i64,

    /// Scan the source files but do not write anything
    #[arg(short = 'n', long = "dryrun")]
    pub dry_run: bool,

    /// Run with a minimum of output
    #[arg(short, long)]
    pub quiet: bool,

    /// Use parallel workers to speed up the reshape
    #[arg(long = "mp")]
    pub parallel: bool,

    /// Maximum number of parallel workers (default 50)
    #[arg(short = 'M', long = "max-processes", allow_negative_numbers = true)]
    pub max_processes: Option<i64>,

    /// How often workers report progress, e.g. "3s" or "500ms"
    #[arg(long, value_parser = parse_interval)]
    pub report_interval: Option<Duration>,

    /// Settings file with defaults for the tuning options
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,
}

fn parse_interval(s: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(s).map_err(|e| e.to_string())
}

fn positive(value: i64, what: &str) -> ReshapeResult<usize> {
    usize::try_from(value)
        .ok()
        .filter(|&v| v >= 1)
        .ok_or_else(|| ReshapeError::config(format!("{what} must be positive; got {value}")))
}

impl ReshapeArgs {
    /// Resolve the run configuration against the settings file
    pub fn to_config(&self, settings: &Settings) -> ReshapeResult<ReshapeConfig> {
        let pools = positive(self.pools, "Number of pools")?;
        let max_workers = self
            .max_processes
            .map(|m| positive(m, "Maximum number of processes"))
            .transpose()?;

        let config = ReshapeConfig::new(&self.from_dir, &self.to_dir, pools)
            .with_dry_run(self.dry_run)
            .with_quiet(self.quiet)
            .with_parallel(self.parallel)
            .with_tuning(
                settings,
                TuningOverrides {
                    max_workers,
                    report_interval: self.report_interval,
                },
            );
        config.validate()?;
        Ok(config)
    }
}
