//! Progress aggregation for parallel copies
//!
//! Workers are the only producers on the progress channel and the
//! coordinator is the only consumer. The aggregator state lives in the
//! coordinator's receive loop and is never shared.

use std::collections::BTreeSet;
use std::ops::Range;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, trace, warn};

use crate::error::{ReshapeError, ReshapeResult};
use crate::reshape::progress::ProgressReporter;

/// Message sent by a worker. `pool` is the 0-based target pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressMessage {
    /// `count` more records were copied since the last report
    Copied { pool: usize, count: usize },
    /// The worker hit an error; its terminal message follows
    Failed { pool: usize, error: String },
    /// Terminal message: the worker will send nothing else
    Finished { pool: usize },
}

pub type ProgressSender = UnboundedSender<ProgressMessage>;
pub type ProgressReceiver = UnboundedReceiver<ProgressMessage>;

/// What a single message changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregatorEvent {
    /// Running total after the update
    Advanced(usize),
    PoolFailed(usize),
    PoolFinished(usize),
    /// Message for a pool that is not running
    Ignored,
}

/// Running total plus the set of pools whose workers have not finished
#[derive(Debug, Clone)]
pub struct ProgressAggregator {
    running: BTreeSet<usize>,
    total: usize,
    failed: Vec<(usize, String)>,
}

impl ProgressAggregator {
    pub fn new(pools: Range<usize>) -> Self {
        Self {
            running: pools.collect(),
            total: 0,
            failed: Vec::new(),
        }
    }

    /// Apply one message
    pub fn apply(&mut self, message: ProgressMessage) -> AggregatorEvent {
        match message {
            ProgressMessage::Copied { pool, count } => {
                if !self.running.contains(&pool) {
                    warn!("Progress from target pool {} after it finished", pool);
                }
                self.total += count;
                trace!("Pool {} copied {} more, total {}", pool, count, self.total);
                AggregatorEvent::Advanced(self.total)
            }
            ProgressMessage::Failed { pool, error } => {
                warn!("Worker for target pool {} failed: {}", pool, error);
                self.failed.push((pool, error));
                AggregatorEvent::PoolFailed(pool)
            }
            ProgressMessage::Finished { pool } => {
                if self.running.remove(&pool) {
                    debug!(
                        "Target pool {} finished, {} still running",
                        pool,
                        self.running.len()
                    );
                    AggregatorEvent::PoolFinished(pool)
                } else {
                    warn!("Duplicate completion from target pool {}", pool);
                    AggregatorEvent::Ignored
                }
            }
        }
    }

    pub fn is_done(&self) -> bool {
        self.running.is_empty()
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn running(&self) -> &BTreeSet<usize> {
        &self.running
    }

    /// Failures reported so far, in arrival order
    pub fn failures(&self) -> &[(usize, String)] {
        &self.failed
    }

    /// Receive until every pool has finished.
    ///
    /// `on_failure` runs once per `Failed` message. If the channel closes
    /// while pools are still running, the first of them is reported lost.
    pub async fn drain(
        &mut self,
        rx: &mut ProgressReceiver,
        progress: &mut dyn ProgressReporter,
        mut on_failure: impl FnMut(usize),
    ) -> ReshapeResult<()> {
        while !self.is_done() {
            let Some(message) = rx.recv().await else {
                let pool = self.running.iter().next().copied().unwrap_or_default();
                return Err(ReshapeError::WorkerLost { pool });
            };
            match self.apply(message) {
                AggregatorEvent::Advanced(total) => progress.set_position(total as u64),
                AggregatorEvent::PoolFailed(pool) => on_failure(pool),
                AggregatorEvent::PoolFinished(_) | AggregatorEvent::Ignored => {}
            }
        }
        Ok(())
    }
}
