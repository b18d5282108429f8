//! Per-target-pool copy worker
//!
//! ```text
//! Spawned ──▶ Running ──▶ Done
//!               │  ▲
//!  interval     ▼  │
//!  elapsed    Draining
//! ```
//!
//! A worker owns one target pool file and the stripe of global indices that
//! map onto it. It opens its own read handles on the source set, and only on
//! the source pools its stripe touches, so workers share nothing but the
//! progress channel.

use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::aggregator::{ProgressMessage, ProgressSender};
use crate::error::ReshapeResult;
use crate::reshape::mapping::{kloc_to_pool_index, stripe};
use crate::reshape::pool_set::{write_record, SourceDescriptor, SourceReaders};

/// Lifecycle phase of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    Spawned,
    Running,
    Draining,
    Done,
}

/// Everything a worker is handed when it is spawned
#[derive(Debug, Clone)]
pub struct WorkerSpec {
    pub target_dir: PathBuf,
    /// 0-based target pool
    pub pool: usize,
    pub num_pools: usize,
    pub source: SourceDescriptor,
    pub report_interval: Duration,
}

impl WorkerSpec {
    pub fn target_path(&self) -> PathBuf {
        self.target_dir.join(crate::storage::pool_file_name(
            self.source.prefix(),
            self.pool + 1,
        ))
    }
}

/// Result of a finished worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub pool: usize,
    pub records_written: usize,
    pub path: PathBuf,
}

/// Sends the terminal message for a pool when dropped, whichever way the
/// worker exits.
pub(crate) struct CompletionGuard {
    pool: usize,
    tx: ProgressSender,
}

impl CompletionGuard {
    pub fn new(pool: usize, tx: ProgressSender) -> Self {
        Self { pool, tx }
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if self
            .tx
            .send(ProgressMessage::Finished { pool: self.pool })
            .is_err()
        {
            debug!("Progress channel closed before pool {} finished", self.pool);
        }
    }
}

/// Copies one target pool's stripe
pub struct PoolWorker {
    spec: WorkerSpec,
    tx: ProgressSender,
    phase: WorkerPhase,
    pending: usize,
    last_report: Instant,
}

impl PoolWorker {
    pub fn new(spec: WorkerSpec, tx: ProgressSender) -> Self {
        Self {
            spec,
            tx,
            phase: WorkerPhase::Spawned,
            pending: 0,
            last_report: Instant::now(),
        }
    }

    pub fn phase(&self) -> WorkerPhase {
        self.phase
    }

    fn enter(&mut self, phase: WorkerPhase) {
        trace!(
            "Worker {}: {:?} -> {:?}",
            self.spec.pool,
            self.phase,
            phase
        );
        self.phase = phase;
    }

    /// Copy the whole stripe, blocking on file I/O
    pub fn run(mut self) -> ReshapeResult<WorkerReport> {
        self.enter(WorkerPhase::Running);
        debug!(
            "Worker {} writing {}",
            self.spec.pool,
            self.spec.target_path().display()
        );

        let mut readers = self.spec.source.readers();
        let copied = self.copy_stripe(&mut readers);
        let released = readers.close();
        let report = copied?;
        released?;

        self.report_pending();
        self.enter(WorkerPhase::Done);
        Ok(report)
    }

    fn copy_stripe(&mut self, readers: &mut SourceReaders) -> ReshapeResult<WorkerReport> {
        let pool = self.spec.pool;
        let num_pools = self.spec.num_pools;
        let store = self.spec.source.store().clone();

        let mut target =
            store.create(&self.spec.target_dir, self.spec.source.prefix(), pool + 1)?;
        target.set_local_count(0)?;

        for global_index in stripe(pool, num_pools, self.spec.source.nkpt())? {
            let at = kloc_to_pool_index(global_index, num_pools)?;
            debug_assert_eq!(at.pool, pool, "k-point {global_index} is not in pool {pool}");

            let record = readers.read(global_index)?;
            let local = target.local_count() + 1;
            debug_assert_eq!(local, at.local_number());
            target.set_local_count(local)?;
            write_record(target.as_mut(), local, record)?;

            self.pending += 1;
            if self.last_report.elapsed() >= self.spec.report_interval {
                self.enter(WorkerPhase::Draining);
                self.report_pending();
                self.enter(WorkerPhase::Running);
            }
        }

        let path = target.path().to_path_buf();
        let records_written = target.local_count();
        target.close()?;
        Ok(WorkerReport {
            pool,
            records_written,
            path,
        })
    }

    fn report_pending(&mut self) {
        if self.pending > 0 {
            let message = ProgressMessage::Copied {
                pool: self.spec.pool,
                count: self.pending,
            };
            if self.tx.send(message).is_err() {
                debug!(
                    "Progress channel closed, dropping report from pool {}",
                    self.spec.pool
                );
            }
            self.pending = 0;
        }
        self.last_report = Instant::now();
    }
}
