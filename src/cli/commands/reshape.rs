//! `pertool reshape` command

use anyhow::Result;
use std::path::Path;
use tracing::{debug, info};

use crate::cli::args::ReshapeArgs;
use crate::config::{ReshapeConfig, Settings};
use crate::error::ReshapeResult;
use crate::reshape::discovery::{find_pool_files, DiscoveryError, PoolFileSummary, SourceSet};
use crate::reshape::{check_target_dir, copy_parallel, copy_serial, progress, CopySummary};
use crate::storage::{default_store, SharedPoolStore};

/// Run the reshape command with the default store
pub async fn run_reshape_command(args: ReshapeArgs) -> Result<()> {
    let settings = Settings::load_optional(args.config.as_deref())?;
    execute(&args, &settings, default_store()).await?;
    Ok(())
}

/// Check arguments, scan the source set and write the new pool files.
///
/// Returns `None` for a dry run.
pub async fn execute(
    args: &ReshapeArgs,
    settings: &Settings,
    store: SharedPoolStore,
) -> ReshapeResult<Option<CopySummary>> {
    let config = check_args(args, settings)?;
    let source = scan_source(&config, store.clone()).await?;

    if config.dry_run {
        println!("\nDry-run requested, not writing output files.");
        return Ok(None);
    }

    let summary = write_target_files(&config, &source, store).await?;
    info!(
        "Wrote {} records to {} pool files in {:?}",
        summary.records_copied, summary.num_pools, summary.elapsed
    );
    println!("\nDone!");
    Ok(Some(summary))
}

fn check_args(args: &ReshapeArgs, settings: &Settings) -> ReshapeResult<ReshapeConfig> {
    println!("Reading pool files from {}", args.from_dir.display());
    if !args.from_dir.is_dir() {
        return Err(DiscoveryError::NotADirectory(args.from_dir.clone()).into());
    }

    let config = args.to_config(settings)?;
    debug!("Resolved configuration: {:?}", config);

    println!("Writing {} pool files to {}", config.pools, config.to_dir.display());
    check_target_dir(&config.to_dir)?;

    if config.parallel {
        println!(
            "\nUsing parallel workers to speed up performance.  Max workers = {}.",
            config.parallel_options.max_workers
        );
    }
    Ok(config)
}

async fn scan_source(config: &ReshapeConfig, store: SharedPoolStore) -> ReshapeResult<SourceSet> {
    println!("\nScanning source directory {}", config.from_dir.display());

    let listing = find_pool_files(&config.from_dir)?;
    let width = listing.max_filename_len();
    if !config.quiet {
        println!("Found {} files:", listing.num_pools());
    }

    let quiet = config.quiet;
    let on_file = |summary: &PoolFileSummary| {
        if !quiet {
            println!("{}", scan_line(summary, width));
        }
    };
    let source = if config.parallel {
        listing
            .scan_parallel(store, config.parallel_options.max_workers, on_file)
            .await?
    } else {
        listing.scan(store.as_ref(), on_file)?
    };

    if !config.quiet {
        println!(
            "Total k-grid points:  {}\tTotal k-q pairs:  {}",
            source.nkpt, source.nkq
        );
    }
    Ok(source)
}

async fn write_target_files(
    config: &ReshapeConfig,
    source: &SourceSet,
    store: SharedPoolStore,
) -> ReshapeResult<CopySummary> {
    println!(
        "\nWriting new set of pool files to directory {}",
        config.to_dir.display()
    );
    note_missing_target(&config.to_dir);

    let mut reporter = progress::reporter(config.quiet);
    if config.parallel {
        copy_parallel(
            source,
            store,
            &config.to_dir,
            config.pools,
            &config.parallel_options,
            reporter.as_mut(),
        )
        .await
    } else {
        copy_serial(source, store, &config.to_dir, config.pools, reporter.as_mut())
    }
}

fn note_missing_target(dir: &Path) {
    if !dir.exists() {
        println!("NOTE:  {} doesn't exist; creating", dir.display());
    }
}

/// One line of the scan table, padded after the colon so the counts align
pub fn scan_line(summary: &PoolFileSummary, max_filename_len: usize) -> String {
    let label = format!("{}:  ", summary.filename);
    format!(
        " * {:<width$}nk_loc = {}\tnkq = {}",
        label,
        summary.nk_loc,
        summary.nkq,
        width = max_filename_len + 3
    )
}
