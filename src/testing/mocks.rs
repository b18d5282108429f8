//! Test doubles for the storage and progress seams

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::reshape::progress::ProgressReporter;
use crate::storage::{
    BandsIndex, EphG2, FilePoolStore, OpenMode, PoolHandle, PoolStore, SharedPoolStore,
    StorageError, StorageResult,
};

/// Records every progress call for later assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecordingProgress {
    pub total: Option<u64>,
    pub positions: Vec<u64>,
    pub finished: bool,
}

impl ProgressReporter for RecordingProgress {
    fn start(&mut self, total: u64) {
        self.total = Some(total);
    }

    fn set_position(&mut self, position: u64) {
        self.positions.push(position);
    }

    fn finish(&mut self) {
        self.finished = true;
    }
}

/// File store that fails on demand
///
/// Reads are counted across every handle the store hands out, so a limit
/// applies to the run as a whole rather than to a single file.
#[derive(Debug, Clone, Default)]
pub struct FaultyPoolStore {
    inner: FilePoolStore,
    reads: Arc<AtomicUsize>,
    read_limit: Option<usize>,
    failing_pool: Option<usize>,
}

impl FaultyPoolStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow `n` record reads, then fail every read after them
    pub fn fail_reads_after(mut self, n: usize) -> Self {
        self.read_limit = Some(n);
        self
    }

    /// Fail to create the pool file with this 1-based pool number
    pub fn fail_create(mut self, pool_number: usize) -> Self {
        self.failing_pool = Some(pool_number);
        self
    }

    pub fn shared(self) -> SharedPoolStore {
        Arc::new(self)
    }
}

fn injected(path: &Path, what: &str) -> StorageError {
    StorageError::io(path, io::Error::other(format!("injected {what} failure")))
}

impl PoolStore for FaultyPoolStore {
    fn open(&self, path: &Path, mode: OpenMode) -> StorageResult<Box<dyn PoolHandle>> {
        Ok(Box::new(FaultyPoolHandle {
            inner: self.inner.open(path, mode)?,
            reads: self.reads.clone(),
            read_limit: self.read_limit,
        }))
    }

    fn create(
        &self,
        dir: &Path,
        prefix: &str,
        pool_number: usize,
    ) -> StorageResult<Box<dyn PoolHandle>> {
        if self.failing_pool == Some(pool_number) {
            return Err(injected(dir, "create"));
        }
        Ok(Box::new(FaultyPoolHandle {
            inner: self.inner.create(dir, prefix, pool_number)?,
            reads: self.reads.clone(),
            read_limit: self.read_limit,
        }))
    }
}

struct FaultyPoolHandle {
    inner: Box<dyn PoolHandle>,
    reads: Arc<AtomicUsize>,
    read_limit: Option<usize>,
}

impl FaultyPoolHandle {
    fn count_read(&self) -> StorageResult<()> {
        let done = self.reads.fetch_add(1, Ordering::SeqCst);
        match self.read_limit {
            Some(limit) if done >= limit => Err(injected(self.inner.path(), "read")),
            _ => Ok(()),
        }
    }
}

impl PoolHandle for FaultyPoolHandle {
    fn path(&self) -> &Path {
        self.inner.path()
    }

    fn pool_number(&self) -> usize {
        self.inner.pool_number()
    }

    fn local_count(&self) -> usize {
        self.inner.local_count()
    }

    fn set_local_count(&mut self, count: usize) -> StorageResult<()> {
        self.inner.set_local_count(count)
    }

    fn secondary_count(&self) -> usize {
        self.inner.secondary_count()
    }

    fn get_eph_g2(&self, local: usize) -> StorageResult<EphG2> {
        self.count_read()?;
        self.inner.get_eph_g2(local)
    }

    fn set_eph_g2(&mut self, local: usize, value: EphG2) -> StorageResult<()> {
        self.inner.set_eph_g2(local, value)
    }

    fn get_bands_index(&self, local: usize) -> StorageResult<BandsIndex> {
        self.inner.get_bands_index(local)
    }

    fn set_bands_index(&mut self, local: usize, value: BandsIndex) -> StorageResult<()> {
        self.inner.set_bands_index(local, value)
    }

    fn close(self: Box<Self>) -> StorageResult<()> {
        self.inner.close()
    }
}
