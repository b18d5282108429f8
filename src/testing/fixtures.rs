//! Synthetic pool sets with known contents

use anyhow::{Context, Result};
use std::path::Path;

use crate::reshape::discovery::scan_source_directory;
use crate::storage::{EphG2, KPointRecord, PoolStore, StorageResult};

/// Shape of every fixture `eph_g2` array
pub const FIXTURE_SHAPE: [usize; 2] = [2, 3];

/// The record fixtures store at global index `i`.
///
/// Values are distinct per index and not exactly representable in decimal,
/// and the band table length varies, so misplaced or truncated records show
/// up in comparisons.
pub fn expected_record(i: usize) -> KPointRecord {
    let len: usize = FIXTURE_SHAPE.iter().product();
    let values = (0..len)
        .map(|j| (i * 10 + j) as f64 + 1.0 / 3.0)
        .collect();
    let eph_g2 = EphG2::new(FIXTURE_SHAPE.to_vec(), values)
        .unwrap_or_else(|e| panic!("fixture record {i} is malformed: {e}"));
    let bands_index = (0..1 + i % 3).map(|b| (i * 4 + b) as i32).collect();
    KPointRecord {
        eph_g2,
        bands_index,
    }
}

/// A source pool set of `nkpt` fixture records over `pools` files
#[derive(Debug, Clone)]
pub struct SourceFixture {
    prefix: String,
    nkpt: usize,
    pools: usize,
}

impl SourceFixture {
    pub fn new(prefix: &str, nkpt: usize, pools: usize) -> Self {
        assert!(pools > 0, "a fixture needs at least one pool");
        Self {
            prefix: prefix.to_string(),
            nkpt,
            pools,
        }
    }

    pub fn nkpt(&self) -> usize {
        self.nkpt
    }

    /// Total k-q pairs the written set holds
    pub fn expected_nkq(&self) -> usize {
        (0..self.nkpt).map(|i| expected_record(i).bands_index.len()).sum()
    }

    /// Write the pool files into `dir`, laid out round-robin
    pub fn write(&self, dir: &Path, store: &dyn PoolStore) -> StorageResult<()> {
        for pool in 0..self.pools {
            let mut handle = store.create(dir, &self.prefix, pool + 1)?;
            let globals: Vec<usize> = (pool..self.nkpt).step_by(self.pools).collect();
            handle.set_local_count(globals.len())?;
            for (offset, &global) in globals.iter().enumerate() {
                let record = expected_record(global);
                handle.set_eph_g2(offset + 1, record.eph_g2)?;
                handle.set_bands_index(offset + 1, record.bands_index)?;
            }
            handle.close()?;
        }
        Ok(())
    }
}

/// Read back every record of the pool set in `dir`, in global order
pub fn read_all_records(dir: &Path, store: &dyn PoolStore) -> Result<Vec<KPointRecord>> {
    let set = scan_source_directory(dir, store)
        .with_context(|| format!("Failed to scan {}", dir.display()))?;

    let mut handles = Vec::with_capacity(set.pools.len());
    for pool in &set.pools {
        handles.push(store.open(&pool.path, crate::storage::OpenMode::Read)?);
    }

    let num_pools = handles.len();
    let mut records = Vec::with_capacity(set.nkpt);
    for i in 0..set.nkpt {
        records.push(handles[i % num_pools].get_record(i / num_pools + 1)?);
    }
    for handle in handles {
        handle.close()?;
    }
    Ok(records)
}
