//! Parallel copy engine
//!
//! One worker per target pool, at most `max_workers` running at once. Each
//! worker reports progress over an unbounded channel and always ends with a
//! terminal message, which the coordinator's aggregator loop uses to know
//! when every pool is done.
//!
//! A failing worker makes the whole run fail: queued workers are not
//! started, running ones finish their stripe, and every target file of the
//! run is then removed.

pub mod aggregator;
pub mod worker;

pub use aggregator::{AggregatorEvent, ProgressAggregator, ProgressMessage};
pub use worker::{PoolWorker, WorkerPhase, WorkerReport, WorkerSpec};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use self::aggregator::ProgressSender;
use self::worker::CompletionGuard;
use super::discovery::SourceSet;
use super::progress::ProgressReporter;
use super::{check_pool_count, discard_target_files, prepare_target_dir, CopySummary};
use crate::error::{ReshapeError, ReshapeResult};
use crate::storage::SharedPoolStore;

/// Default upper bound on concurrently running workers
pub const DEFAULT_MAX_WORKERS: usize = 50;

/// Default wall-clock interval between worker progress reports
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(3);

/// Tuning for the parallel engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelOptions {
    pub max_workers: usize,
    #[serde(with = "humantime_serde")]
    pub report_interval: Duration,
}

impl Default for ParallelOptions {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            report_interval: DEFAULT_REPORT_INTERVAL,
        }
    }
}

type WorkerHandle = JoinHandle<ReshapeResult<Option<WorkerReport>>>;

/// Copy `source` into `target_pools` new pool files, one worker per file.
pub async fn copy_parallel(
    source: &SourceSet,
    store: SharedPoolStore,
    target_dir: &Path,
    target_pools: usize,
    options: &ParallelOptions,
    progress: &mut dyn ProgressReporter,
) -> ReshapeResult<CopySummary> {
    check_pool_count(target_pools)?;
    if options.max_workers < 1 {
        return Err(ReshapeError::config(format!(
            "Maximum number of workers must be positive; got {}",
            options.max_workers
        )));
    }
    prepare_target_dir(target_dir)?;

    info!(
        "Copying {} k-points from {} to {} pools in {} with up to {} workers",
        source.nkpt,
        source.num_pools(),
        target_pools,
        target_dir.display(),
        options.max_workers
    );
    let started = Instant::now();

    // Workers get a descriptor, never an open handle.
    let descriptor = source.descriptor(store);
    let semaphore = Arc::new(Semaphore::new(options.max_workers));
    let (tx, mut rx) = mpsc::unbounded_channel();

    let tasks: Vec<WorkerHandle> = (0..target_pools)
        .map(|pool| {
            let spec = WorkerSpec {
                target_dir: target_dir.to_path_buf(),
                pool,
                num_pools: target_pools,
                source: descriptor.clone(),
                report_interval: options.report_interval,
            };
            spawn_worker(spec, semaphore.clone(), tx.clone())
        })
        .collect();
    drop(tx);

    progress.start(source.nkpt as u64);
    let mut aggregator = ProgressAggregator::new(0..target_pools);
    let drained = aggregator
        .drain(&mut rx, progress, |pool| {
            warn!(
                "Target pool {} failed, not starting any further workers",
                pool
            );
            semaphore.close();
        })
        .await;

    let joined = join_all(tasks).await;
    progress.finish();

    let mut first_error = drained.err();
    let mut reports = Vec::with_capacity(target_pools);
    for result in joined {
        match result {
            Ok(Ok(Some(report))) => reports.push(report),
            Ok(Ok(None)) => {}
            Ok(Err(e)) => {
                first_error.get_or_insert(e);
            }
            Err(e) => {
                first_error.get_or_insert(ReshapeError::Join(e));
            }
        }
    }
    if first_error.is_none() && aggregator.total() != source.nkpt {
        first_error = Some(ReshapeError::Accounting {
            expected: source.nkpt,
            actual: aggregator.total(),
        });
    }

    if let Some(e) = first_error {
        warn!(
            "Parallel copy failed with {} of {} target pools reporting errors: {}",
            aggregator.failures().len(),
            target_pools,
            e
        );
        let cleanup = discard_target_files(target_dir, &source.prefix, target_pools);
        return Err(cleanup.into_error(e));
    }

    reports.sort_by_key(|r| r.pool);
    let elapsed = started.elapsed();
    debug!("Parallel copy finished in {:?}", elapsed);
    Ok(CopySummary {
        target_dir: target_dir.to_path_buf(),
        prefix: source.prefix.clone(),
        num_pools: target_pools,
        records_copied: reports.iter().map(|r| r.records_written).sum(),
        files: reports.into_iter().map(|r| r.path).collect(),
        elapsed,
    })
}

/// Spawn the task for one target pool.
///
/// Returns `Ok(None)` when the pool was never started because an earlier
/// worker failed.
fn spawn_worker(spec: WorkerSpec, semaphore: Arc<Semaphore>, tx: ProgressSender) -> WorkerHandle {
    tokio::spawn(async move {
        let pool = spec.pool;
        let _completion = CompletionGuard::new(pool, tx.clone());

        let Ok(_permit) = semaphore.clone().acquire_owned().await else {
            debug!("Skipping target pool {} after an earlier failure", pool);
            return Ok(None);
        };

        let worker = PoolWorker::new(spec, tx.clone());
        let outcome = match tokio::task::spawn_blocking(move || worker.run()).await {
            Ok(Ok(report)) => Ok(Some(report)),
            Ok(Err(e)) => Err(ReshapeError::worker(pool, e)),
            Err(e) => Err(ReshapeError::worker(pool, ReshapeError::Join(e))),
        };

        if let Err(e) = &outcome {
            // Close before the permit is released so no queued pool starts.
            semaphore.close();
            let failed = ProgressMessage::Failed {
                pool,
                error: e.to_string(),
            };
            if tx.send(failed).is_err() {
                debug!("Progress channel closed before pool {} reported failure", pool);
            }
        }
        outcome
    })
}
