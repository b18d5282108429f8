//! Source and target pool sets
//!
//! Open handles never cross a task boundary. A [`SourceDescriptor`] carries
//! only the store and the file paths; every task that needs to read the
//! source takes its own [`SourceReaders`], which opens a source pool the
//! first time a record from it is read and releases everything on
//! [`SourceReaders::close`].

use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

use super::mapping::{kloc_to_pool_index, pool_len};
use crate::error::ReshapeResult;
use crate::storage::{
    KPointRecord, OpenMode, PoolHandle, PoolStore, SharedPoolStore, StorageResult,
};

/// Everything a task needs to open its own view of the source pool set
#[derive(Debug, Clone)]
pub struct SourceDescriptor {
    store: SharedPoolStore,
    prefix: String,
    /// Indexed by 0-based pool
    paths: Vec<PathBuf>,
    nkpt: usize,
}

impl SourceDescriptor {
    pub fn new(store: SharedPoolStore, prefix: String, paths: Vec<PathBuf>, nkpt: usize) -> Self {
        Self {
            store,
            prefix,
            paths,
            nkpt,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn nkpt(&self) -> usize {
        self.nkpt
    }

    pub fn store(&self) -> &SharedPoolStore {
        &self.store
    }

    /// Private readers over the source set; nothing is opened yet
    pub fn readers(&self) -> SourceReaders {
        SourceReaders {
            store: self.store.clone(),
            paths: self.paths.clone(),
            handles: self.paths.iter().map(|_| None).collect(),
        }
    }
}

/// Read handles on the source pools, opened on first use
pub struct SourceReaders {
    store: SharedPoolStore,
    paths: Vec<PathBuf>,
    handles: Vec<Option<Box<dyn PoolHandle>>>,
}

impl SourceReaders {
    /// Read the record stored at a global k-point index
    pub fn read(&mut self, global_index: usize) -> ReshapeResult<KPointRecord> {
        let at = kloc_to_pool_index(global_index, self.paths.len())?;
        let handle = match self.handles[at.pool].take() {
            Some(handle) => handle,
            None => {
                trace!("Opening source pool {}", at.pool + 1);
                self.store.open(&self.paths[at.pool], OpenMode::Read)?
            }
        };
        let record = handle.get_record(at.local_number());
        self.handles[at.pool] = Some(handle);
        Ok(record?)
    }

    /// Number of source pools opened so far
    pub fn opened(&self) -> usize {
        self.handles.iter().filter(|h| h.is_some()).count()
    }

    /// Release every opened handle, reporting the first failure
    pub fn close(self) -> StorageResult<()> {
        debug!(
            "Releasing {} of {} source pools",
            self.opened(),
            self.paths.len()
        );
        close_all(self.handles.into_iter().flatten().collect()).map(|_| ())
    }
}

/// Freshly created target pool files, one per target pool
pub struct TargetPoolSet {
    handles: Vec<Box<dyn PoolHandle>>,
}

impl TargetPoolSet {
    /// Create `num_pools` empty pool files in `dir`
    pub fn create(
        store: &dyn PoolStore,
        dir: &Path,
        prefix: &str,
        num_pools: usize,
    ) -> StorageResult<Self> {
        let mut handles = Vec::with_capacity(num_pools);
        for pool in 0..num_pools {
            match store.create(dir, prefix, pool + 1) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    close_quietly(handles);
                    return Err(e);
                }
            }
        }
        debug!("Created {} target pool files in {}", num_pools, dir.display());
        Ok(Self { handles })
    }

    /// Fix every pool's final `nk_loc` for `nkpt` records before writing
    pub fn presize(&mut self, nkpt: usize) -> ReshapeResult<()> {
        let num_pools = self.handles.len();
        for (pool, handle) in self.handles.iter_mut().enumerate() {
            handle.set_local_count(pool_len(nkpt, num_pools, pool)?)?;
        }
        Ok(())
    }

    /// Store `record` at its global k-point index
    pub fn write(&mut self, global_index: usize, record: KPointRecord) -> ReshapeResult<()> {
        let at = kloc_to_pool_index(global_index, self.handles.len())?;
        write_record(self.handles[at.pool].as_mut(), at.local_number(), record)
    }

    /// Flush and close every target file, returning their paths
    pub fn close_all(self) -> StorageResult<Vec<PathBuf>> {
        close_all(self.handles)
    }
}

/// Write both fields of a record at a 1-based local index
pub fn write_record(
    handle: &mut dyn PoolHandle,
    local: usize,
    record: KPointRecord,
) -> ReshapeResult<()> {
    handle.set_eph_g2(local, record.eph_g2)?;
    handle.set_bands_index(local, record.bands_index)?;
    Ok(())
}

fn close_all(handles: Vec<Box<dyn PoolHandle>>) -> StorageResult<Vec<PathBuf>> {
    let mut paths = Vec::with_capacity(handles.len());
    let mut first_error = None;
    for handle in handles {
        let path = handle.path().to_path_buf();
        match handle.close() {
            Ok(()) => paths.push(path),
            Err(e) => {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(paths),
    }
}

fn close_quietly(handles: Vec<Box<dyn PoolHandle>>) {
    for handle in handles {
        let path = handle.path().to_path_buf();
        if let Err(e) = handle.close() {
            warn!("Failed to close {}: {}", path.display(), e);
        }
    }
}
