//! Record and pool file data types

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::error::{StorageError, StorageResult};

/// Band index table attached to one k-point
pub type BandsIndex = Vec<i32>;

/// Mode a pool file handle is opened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
}

/// e-ph matrix elements `|g|^2` of one k-point, stored row-major
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EphG2 {
    shape: Vec<usize>,
    values: Vec<f64>,
}

impl EphG2 {
    /// Create a new array, checking that `values` fills `shape` exactly
    pub fn new(shape: Vec<usize>, values: Vec<f64>) -> StorageResult<Self> {
        let array = Self { shape, values };
        array.validate()?;
        Ok(array)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Check the shape/value invariant, used after decoding untrusted input
    pub fn validate(&self) -> StorageResult<()> {
        let expected = self
            .shape
            .iter()
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
            .ok_or_else(|| {
                StorageError::invalid_record(format!("eph_g2 shape {:?} is too large", self.shape))
            })?;
        if expected != self.values.len() {
            return Err(StorageError::invalid_record(format!(
                "eph_g2 shape {:?} needs {} values, found {}",
                self.shape,
                expected,
                self.values.len()
            )));
        }
        Ok(())
    }
}

/// One k-point record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KPointRecord {
    pub eph_g2: EphG2,
    pub bands_index: BandsIndex,
}

impl KPointRecord {
    pub fn validate(&self) -> StorageResult<()> {
        self.eph_g2.validate()
    }
}

/// Pool file metadata, stored ahead of the records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct PoolHeader {
    pub prefix: String,
    pub pool: usize,
    pub nk_loc: usize,
    pub nkq: usize,
}

/// Complete contents of one pool file
#[derive(Debug, Clone)]
pub(crate) struct PoolDocument {
    pub header: PoolHeader,
    pub records: Vec<KPointRecord>,
}

#[derive(Debug, Clone, Default)]
struct Slot {
    eph_g2: Option<EphG2>,
    bands_index: Option<BandsIndex>,
}

/// Editable in-memory view of one pool file, addressed by 1-based local index
#[derive(Debug)]
pub(crate) struct PoolSlots {
    path: PathBuf,
    prefix: String,
    pool: usize,
    slots: Vec<Slot>,
}

impl PoolSlots {
    pub fn empty(path: &Path, prefix: &str, pool: usize) -> Self {
        Self {
            path: path.to_path_buf(),
            prefix: prefix.to_string(),
            pool,
            slots: Vec::new(),
        }
    }

    pub fn from_document(path: &Path, doc: PoolDocument) -> StorageResult<Self> {
        if doc.records.len() != doc.header.nk_loc {
            return Err(StorageError::serialization(
                path,
                format!(
                    "nk_loc is {} but {} records are stored",
                    doc.header.nk_loc,
                    doc.records.len()
                ),
            ));
        }
        for record in &doc.records {
            record.validate()?;
        }
        let slots = doc
            .records
            .into_iter()
            .map(|r| Slot {
                eph_g2: Some(r.eph_g2),
                bands_index: Some(r.bands_index),
            })
            .collect();
        Ok(Self {
            path: path.to_path_buf(),
            prefix: doc.header.prefix,
            pool: doc.header.pool,
            slots,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pool_number(&self) -> usize {
        self.pool
    }

    pub fn local_count(&self) -> usize {
        self.slots.len()
    }

    pub fn secondary_count(&self) -> usize {
        self.slots
            .iter()
            .filter_map(|s| s.bands_index.as_ref())
            .map(Vec::len)
            .sum()
    }

    fn slot_index(&self, local: usize) -> StorageResult<usize> {
        if local == 0 || local > self.slots.len() {
            return Err(StorageError::IndexOutOfRange {
                path: self.path.clone(),
                index: local,
                len: self.slots.len(),
            });
        }
        Ok(local - 1)
    }

    pub fn set_local_count(&mut self, count: usize) -> StorageResult<()> {
        self.slots.resize_with(count, Slot::default);
        Ok(())
    }

    pub fn get_eph_g2(&self, local: usize) -> StorageResult<EphG2> {
        let idx = self.slot_index(local)?;
        self.slots[idx]
            .eph_g2
            .clone()
            .ok_or_else(|| StorageError::MissingField {
                path: self.path.clone(),
                index: local,
                field: "eph_g2",
            })
    }

    pub fn set_eph_g2(&mut self, local: usize, value: EphG2) -> StorageResult<()> {
        value.validate()?;
        let idx = self.slot_index(local)?;
        self.slots[idx].eph_g2 = Some(value);
        Ok(())
    }

    pub fn get_bands_index(&self, local: usize) -> StorageResult<BandsIndex> {
        let idx = self.slot_index(local)?;
        self.slots[idx]
            .bands_index
            .clone()
            .ok_or_else(|| StorageError::MissingField {
                path: self.path.clone(),
                index: local,
                field: "bands_index",
            })
    }

    pub fn set_bands_index(&mut self, local: usize, value: BandsIndex) -> StorageResult<()> {
        let idx = self.slot_index(local)?;
        self.slots[idx].bands_index = Some(value);
        Ok(())
    }

    /// Turn the slots into a document, failing on any half-written record
    pub fn into_document(self) -> StorageResult<PoolDocument> {
        let nkq = self.secondary_count();
        let nk_loc = self.slots.len();
        let mut records = Vec::with_capacity(nk_loc);
        for (i, slot) in self.slots.into_iter().enumerate() {
            match (slot.eph_g2, slot.bands_index) {
                (Some(eph_g2), Some(bands_index)) => records.push(KPointRecord {
                    eph_g2,
                    bands_index,
                }),
                _ => {
                    return Err(StorageError::Incomplete {
                        path: self.path,
                        index: i + 1,
                    })
                }
            }
        }
        Ok(PoolDocument {
            header: PoolHeader {
                prefix: self.prefix,
                pool: self.pool,
                nk_loc,
                nkq,
            },
            records,
        })
    }
}
