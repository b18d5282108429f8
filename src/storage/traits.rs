//! Storage contract for pool files
//!
//! The reshape engines only talk to pool files through these traits. A store
//! opens independent handles, so any number of tasks may hold read handles
//! on the same file at once; a handle itself is owned by exactly one task.

use std::fmt;
use std::path::Path;

use super::error::StorageResult;
use super::types::{BandsIndex, EphG2, KPointRecord, OpenMode};

/// Factory for pool file handles
pub trait PoolStore: Send + Sync + fmt::Debug {
    /// Open an existing pool file
    fn open(&self, path: &Path, mode: OpenMode) -> StorageResult<Box<dyn PoolHandle>>;

    /// Create a new, empty pool file `<prefix>_eph_g2_p<pool_number>.h5` in `dir`
    fn create(
        &self,
        dir: &Path,
        prefix: &str,
        pool_number: usize,
    ) -> StorageResult<Box<dyn PoolHandle>>;
}

/// One open pool file. Local indices are 1-based.
pub trait PoolHandle: Send {
    /// Path of the underlying file
    fn path(&self) -> &Path;

    /// 1-based pool number recorded in the file
    fn pool_number(&self) -> usize;

    /// Number of k-points stored in this pool (`nk_loc`)
    fn local_count(&self) -> usize;

    /// Resize the pool to `count` records
    fn set_local_count(&mut self, count: usize) -> StorageResult<()>;

    /// Number of k-q pairs stored in this pool (`nkq`)
    fn secondary_count(&self) -> usize;

    fn get_eph_g2(&self, local: usize) -> StorageResult<EphG2>;

    fn set_eph_g2(&mut self, local: usize, value: EphG2) -> StorageResult<()>;

    fn get_bands_index(&self, local: usize) -> StorageResult<BandsIndex>;

    fn set_bands_index(&mut self, local: usize, value: BandsIndex) -> StorageResult<()>;

    /// Read both fields of the record at a 1-based local index
    fn get_record(&self, local: usize) -> StorageResult<KPointRecord> {
        Ok(KPointRecord {
            eph_g2: self.get_eph_g2(local)?,
            bands_index: self.get_bands_index(local)?,
        })
    }

    /// Flush and release the file
    fn close(self: Box<Self>) -> StorageResult<()>;
}
