//! Global k-point index to pool placement
//!
//! Records are striped round-robin across pools: global index `i` lives in
//! pool `i % P` at local position `i / P`. The same rule decodes a source
//! index and encodes a target index, so no placement table is ever stored
//! next to the pool files.

use thiserror::Error;

/// Errors raised by the index mapper
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    #[error("Invalid argument: number of pools must be at least 1, got {0}")]
    InvalidArgument(usize),
}

/// Placement of one record: 0-based pool and 0-based local index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolIndex {
    pub pool: usize,
    pub local: usize,
}

impl PoolIndex {
    /// Pool number as it appears in file names (1-based)
    pub fn pool_number(&self) -> usize {
        self.pool + 1
    }

    /// Local index as the pool file addresses records (1-based)
    pub fn local_number(&self) -> usize {
        self.local + 1
    }
}

fn check_pools(num_pools: usize) -> Result<(), MappingError> {
    if num_pools == 0 {
        return Err(MappingError::InvalidArgument(num_pools));
    }
    Ok(())
}

/// Map a global k-point index onto its pool for a set of `num_pools` pools.
pub fn kloc_to_pool_index(global_index: usize, num_pools: usize) -> Result<PoolIndex, MappingError> {
    check_pools(num_pools)?;
    Ok(PoolIndex {
        pool: global_index % num_pools,
        local: global_index / num_pools,
    })
}

/// Inverse of [`kloc_to_pool_index`].
pub fn pool_index_to_kloc(index: PoolIndex, num_pools: usize) -> Result<usize, MappingError> {
    check_pools(num_pools)?;
    Ok(index.local * num_pools + index.pool)
}

/// Number of records out of `total` that land on `pool`.
///
/// Any two pools differ by at most one record, and the lengths of all pools
/// add up to `total`.
pub fn pool_len(total: usize, num_pools: usize, pool: usize) -> Result<usize, MappingError> {
    check_pools(num_pools)?;
    if pool >= num_pools {
        return Ok(0);
    }
    let base = total / num_pools;
    let extra = usize::from(pool < total % num_pools);
    Ok(base + extra)
}

/// Global indices owned by `pool`, in increasing order.
pub fn stripe(pool: usize, num_pools: usize, total: usize) -> Result<Stripe, MappingError> {
    check_pools(num_pools)?;
    Ok(Stripe {
        next: pool,
        step: num_pools,
        end: total,
    })
}

/// Iterator over one pool's stripe of global indices
#[derive(Debug, Clone)]
pub struct Stripe {
    next: usize,
    step: usize,
    end: usize,
}

impl Iterator for Stripe {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let current = self.next;
        self.next = self.next.saturating_add(self.step);
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = if self.next >= self.end {
            0
        } else {
            (self.end - self.next).div_ceil(self.step)
        };
        (len, Some(len))
    }
}

impl ExactSizeIterator for Stripe {}
