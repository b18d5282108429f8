//! Single-threaded copy engine

use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::discovery::SourceSet;
use super::pool_set::{SourceReaders, TargetPoolSet};
use super::progress::ProgressReporter;
use super::{check_pool_count, discard_target_files, prepare_target_dir, CopySummary};
use crate::error::ReshapeResult;
use crate::storage::SharedPoolStore;

/// Copy every record of `source` into `target_pools` new pool files in
/// `target_dir`, one global index at a time in increasing order.
///
/// Nothing is written unless `target_dir` is absent or empty. On any storage
/// failure the target files of this run are removed before returning.
pub fn copy_serial(
    source: &SourceSet,
    store: SharedPoolStore,
    target_dir: &Path,
    target_pools: usize,
    progress: &mut dyn ProgressReporter,
) -> ReshapeResult<CopySummary> {
    check_pool_count(target_pools)?;
    prepare_target_dir(target_dir)?;

    info!(
        "Copying {} k-points from {} to {} pools in {}",
        source.nkpt,
        source.num_pools(),
        target_pools,
        target_dir.display()
    );
    let started = Instant::now();

    let mut readers = source.descriptor(store.clone()).readers();
    let copied = copy_all(source, &mut readers, store, target_dir, target_pools, progress);
    let released = readers.close();

    let result = copied.and_then(|files| {
        released?;
        Ok(files)
    });
    let files = match result {
        Ok(files) => files,
        Err(e) => {
            warn!("Serial copy failed: {}", e);
            let cleanup = discard_target_files(target_dir, &source.prefix, target_pools);
            return Err(cleanup.into_error(e));
        }
    };

    let elapsed = started.elapsed();
    debug!("Serial copy finished in {:?}", elapsed);
    Ok(CopySummary {
        target_dir: target_dir.to_path_buf(),
        prefix: source.prefix.clone(),
        num_pools: target_pools,
        records_copied: source.nkpt,
        files,
        elapsed,
    })
}

fn copy_all(
    source: &SourceSet,
    readers: &mut SourceReaders,
    store: SharedPoolStore,
    target_dir: &Path,
    target_pools: usize,
    progress: &mut dyn ProgressReporter,
) -> ReshapeResult<Vec<std::path::PathBuf>> {
    let mut targets =
        TargetPoolSet::create(store.as_ref(), target_dir, &source.prefix, target_pools)?;
    targets.presize(source.nkpt)?;

    progress.start(source.nkpt as u64);
    for i in 0..source.nkpt {
        let record = readers.read(i)?;
        targets.write(i, record)?;
        progress.set_position(i as u64 + 1);
    }
    progress.finish();

    Ok(targets.close_all()?)
}
