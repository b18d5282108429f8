//! Reshape engine
//!
//! Moves every k-point record of a source pool set into a new set with a
//! different number of pools, keeping each record at the same global index.
//!
//! - `mapping` - round-robin global index to pool placement
//! - `discovery` - finding and summarising the source pool files
//! - `pool_set` - source descriptors and target set creation
//! - `serial` - single-threaded copy
//! - `parallel` - one worker per target pool with progress aggregation
//! - `progress` - progress display

pub mod discovery;
pub mod mapping;
pub mod parallel;
pub mod pool_set;
pub mod progress;
pub mod serial;

pub use discovery::{find_pool_files, scan_source_directory, DiscoveryError, SourceSet};
pub use mapping::{kloc_to_pool_index, pool_len, stripe, MappingError, PoolIndex};
pub use parallel::{copy_parallel, ParallelOptions};
pub use progress::{ProgressReporter, SilentProgress, TerminalProgress};
pub use serial::copy_serial;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ReshapeError, ReshapeResult};
use crate::storage::{pool_file_name, StorageError};

/// Outcome of a completed copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopySummary {
    pub target_dir: PathBuf,
    pub prefix: String,
    pub num_pools: usize,
    pub records_copied: usize,
    /// Target files ordered by pool
    pub files: Vec<PathBuf>,
    pub elapsed: Duration,
}

/// Target files removed (or not) after a failed run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

impl CleanupReport {
    /// The error to return for a run that failed with `cause`, naming any
    /// pool files that are still on disk
    pub fn into_error(self, cause: ReshapeError) -> ReshapeError {
        if self.failed.is_empty() {
            return cause;
        }
        warn!(
            "{} partial pool files could not be removed",
            self.failed.len()
        );
        ReshapeError::IncompleteCleanup {
            source: Box::new(cause),
            leftover: self.failed,
        }
    }
}

pub(crate) fn check_pool_count(num_pools: usize) -> ReshapeResult<()> {
    if num_pools < 1 {
        return Err(ReshapeError::config(format!(
            "Number of pools must be positive; got {num_pools}"
        )));
    }
    Ok(())
}

/// Fail unless `dir` is absent or an empty directory
pub fn check_target_dir(dir: &Path) -> ReshapeResult<()> {
    if !dir.exists() {
        return Ok(());
    }
    if !dir.is_dir() {
        return Err(ReshapeError::precondition(format!(
            "{} exists and is not a directory",
            dir.display()
        )));
    }
    let mut entries = fs::read_dir(dir).map_err(|e| StorageError::io(dir, e))?;
    if entries.next().is_some() {
        return Err(ReshapeError::target_not_empty(dir));
    }
    Ok(())
}

/// Check the target precondition, then create the directory if needed.
///
/// Returns `true` when the directory had to be created.
pub fn prepare_target_dir(dir: &Path) -> ReshapeResult<bool> {
    check_target_dir(dir)?;
    if dir.exists() {
        return Ok(false);
    }
    fs::create_dir_all(dir).map_err(|e| StorageError::io(dir, e))?;
    debug!("Created target directory {}", dir.display());
    Ok(true)
}

/// Paths of the pool files a run writes into `dir`
pub fn target_paths(dir: &Path, prefix: &str, num_pools: usize) -> Vec<PathBuf> {
    (1..=num_pools)
        .map(|n| dir.join(pool_file_name(prefix, n)))
        .collect()
}

/// Remove whatever target pool files a failed run left behind
pub fn discard_target_files(dir: &Path, prefix: &str, num_pools: usize) -> CleanupReport {
    let mut report = CleanupReport::default();
    for path in target_paths(dir, prefix, num_pools) {
        if !path.exists() {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => report.removed.push(path),
            Err(e) => {
                warn!("Failed to remove partial pool file {}: {}", path.display(), e);
                report.failed.push(path);
            }
        }
    }
    if !report.removed.is_empty() {
        debug!(
            "Removed {} partial pool files from {}",
            report.removed.len(),
            dir.display()
        );
    }
    report
}
