//! Source directory discovery
//!
//! Finds the `<prefix>_eph_g2_p<N>.h5` files of one dataset, reads each
//! file's `nk_loc` and `nkq`, and checks that the files form a complete,
//! round-robin laid out pool set.

use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, trace};
use walkdir::WalkDir;

use super::mapping::pool_len;
use super::pool_set::SourceDescriptor;
use crate::storage::{
    parse_pool_file_name, OpenMode, PoolStore, SharedPoolStore, StorageError,
};

/// Errors raised while discovering a source pool set
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("Found no pool data files in {}", .0.display())]
    EmptyDataset(PathBuf),

    #[error("Pool files for more than one dataset found in {}: {}", dir.display(), prefixes.join(", "))]
    AmbiguousDataset { dir: PathBuf, prefixes: Vec<String> },

    #[error("Pool number {pool_number} appears more than once in {}", dir.display())]
    DuplicatePool { dir: PathBuf, pool_number: usize },

    #[error("Pool file {pool_number} of {num_pools} is missing from {}", dir.display())]
    MissingPool {
        dir: PathBuf,
        pool_number: usize,
        num_pools: usize,
    },

    #[error("{filename} holds {found} k-points, expected {expected} for {nkpt} k-points over {num_pools} pools")]
    InconsistentLayout {
        filename: String,
        found: usize,
        expected: usize,
        nkpt: usize,
        num_pools: usize,
    },

    #[error("{filename} records pool number {recorded}, expected {pool_number}")]
    MislabelledPool {
        filename: String,
        pool_number: usize,
        recorded: usize,
    },

    #[error("Failed to scan {}: {source}", dir.display())]
    Scan {
        dir: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Metadata scan task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Metadata of one source pool file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolFileSummary {
    pub filename: String,
    pub path: PathBuf,
    pub pool_number: usize,
    pub nk_loc: usize,
    pub nkq: usize,
}

/// Pool files found in a directory, before their metadata is read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolFileListing {
    pub dir: PathBuf,
    pub prefix: String,
    /// Paths keyed by 1-based pool number
    pub files: BTreeMap<usize, PathBuf>,
}

/// A fully scanned source pool set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSet {
    pub dir: PathBuf,
    pub prefix: String,
    /// Ordered by pool number
    pub pools: Vec<PoolFileSummary>,
    /// Total k-points (`nkpt`)
    pub nkpt: usize,
    /// Total k-q pairs (`nkq`)
    pub nkq: usize,
}

/// List the pool files of the single dataset stored in `dir`
pub fn find_pool_files(dir: &Path) -> Result<PoolFileListing, DiscoveryError> {
    if !dir.is_dir() {
        return Err(DiscoveryError::NotADirectory(dir.to_path_buf()));
    }

    let mut by_prefix: BTreeMap<String, BTreeMap<usize, PathBuf>> = BTreeMap::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|source| DiscoveryError::Scan {
            dir: dir.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        let Some(parsed) = parse_pool_file_name(name) else {
            trace!("Skipping {}", name);
            continue;
        };
        let files = by_prefix.entry(parsed.prefix).or_default();
        if files
            .insert(parsed.pool_number, entry.path().to_path_buf())
            .is_some()
        {
            return Err(DiscoveryError::DuplicatePool {
                dir: dir.to_path_buf(),
                pool_number: parsed.pool_number,
            });
        }
    }

    if by_prefix.len() > 1 {
        return Err(DiscoveryError::AmbiguousDataset {
            dir: dir.to_path_buf(),
            prefixes: by_prefix.into_keys().collect(),
        });
    }
    let Some((prefix, files)) = by_prefix.into_iter().next() else {
        return Err(DiscoveryError::EmptyDataset(dir.to_path_buf()));
    };

    let num_pools = files.len();
    if let Some(pool_number) = (1..=num_pools).find(|n| !files.contains_key(n)) {
        return Err(DiscoveryError::MissingPool {
            dir: dir.to_path_buf(),
            pool_number,
            num_pools,
        });
    }

    debug!(
        "Found {} pool files with prefix '{}' in {}",
        num_pools,
        prefix,
        dir.display()
    );
    Ok(PoolFileListing {
        dir: dir.to_path_buf(),
        prefix,
        files,
    })
}

/// Read the metadata of one pool file through a private read handle.
///
/// The pool number stored in the file must match the one in its name.
pub fn scan_pool_file(
    store: &dyn PoolStore,
    pool_number: usize,
    path: &Path,
) -> Result<PoolFileSummary, DiscoveryError> {
    let handle = store.open(path, OpenMode::Read)?;
    let summary = PoolFileSummary {
        filename: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        path: path.to_path_buf(),
        pool_number,
        nk_loc: handle.local_count(),
        nkq: handle.secondary_count(),
    };
    let recorded = handle.pool_number();
    handle.close()?;
    if recorded != pool_number {
        return Err(DiscoveryError::MislabelledPool {
            filename: summary.filename,
            pool_number,
            recorded,
        });
    }
    Ok(summary)
}

impl PoolFileListing {
    pub fn num_pools(&self) -> usize {
        self.files.len()
    }

    /// Length of the longest file name, for aligned diagnostics
    pub fn max_filename_len(&self) -> usize {
        self.files
            .values()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().len())
            .max()
            .unwrap_or(0)
    }

    /// Read every file's metadata in pool order
    pub fn scan(
        &self,
        store: &dyn PoolStore,
        mut on_file: impl FnMut(&PoolFileSummary),
    ) -> Result<SourceSet, DiscoveryError> {
        let mut summaries = Vec::with_capacity(self.files.len());
        for (&pool_number, path) in &self.files {
            let summary = scan_pool_file(store, pool_number, path)?;
            on_file(&summary);
            summaries.push(summary);
        }
        self.assemble(summaries)
    }

    /// Read every file's metadata with at most `max_workers` files open at
    /// once. `on_file` sees files in completion order; the result is still
    /// ordered by pool.
    pub async fn scan_parallel(
        &self,
        store: SharedPoolStore,
        max_workers: usize,
        mut on_file: impl FnMut(&PoolFileSummary),
    ) -> Result<SourceSet, DiscoveryError> {
        let semaphore = Arc::new(Semaphore::new(max_workers.max(1)));
        let mut futures = FuturesUnordered::new();

        for (&pool_number, path) in &self.files {
            let semaphore = semaphore.clone();
            let store = store.clone();
            let path = path.clone();
            futures.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                tokio::task::spawn_blocking(move || {
                    scan_pool_file(store.as_ref(), pool_number, &path)
                })
                .await
            }));
        }

        let mut summaries = Vec::with_capacity(self.files.len());
        while let Some(joined) = futures.next().await {
            let summary = joined???;
            on_file(&summary);
            summaries.push(summary);
        }
        self.assemble(summaries)
    }

    fn assemble(&self, mut summaries: Vec<PoolFileSummary>) -> Result<SourceSet, DiscoveryError> {
        summaries.sort_by_key(|s| s.pool_number);
        let nkpt = summaries.iter().map(|s| s.nk_loc).sum();
        let nkq = summaries.iter().map(|s| s.nkq).sum();
        let num_pools = summaries.len();

        for summary in &summaries {
            let expected = pool_len(nkpt, num_pools, summary.pool_number - 1)
                .map_err(|_| DiscoveryError::EmptyDataset(self.dir.clone()))?;
            if summary.nk_loc != expected {
                return Err(DiscoveryError::InconsistentLayout {
                    filename: summary.filename.clone(),
                    found: summary.nk_loc,
                    expected,
                    nkpt,
                    num_pools,
                });
            }
        }

        info!(
            "Scanned {} pool files in {}: nkpt = {}, nkq = {}",
            num_pools,
            self.dir.display(),
            nkpt,
            nkq
        );
        Ok(SourceSet {
            dir: self.dir.clone(),
            prefix: self.prefix.clone(),
            pools: summaries,
            nkpt,
            nkq,
        })
    }
}

impl SourceSet {
    pub fn num_pools(&self) -> usize {
        self.pools.len()
    }

    /// Describe this set so that any task can open its own read handles
    pub fn descriptor(&self, store: SharedPoolStore) -> SourceDescriptor {
        SourceDescriptor::new(
            store,
            self.prefix.clone(),
            self.pools.iter().map(|p| p.path.clone()).collect(),
            self.nkpt,
        )
    }
}

/// Find and scan the source directory in one step
pub fn scan_source_directory(
    dir: &Path,
    store: &dyn PoolStore,
) -> Result<SourceSet, DiscoveryError> {
    find_pool_files(dir)?.scan(store, |_| {})
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::default_store;
    use crate::testing::fixtures::SourceFixture;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_scan_example_layout() {
        let dir = TempDir::new().unwrap();
        let store = default_store();
        SourceFixture::new("si", 10, 3).write(dir.path(), store.as_ref()).unwrap();

        let set = scan_source_directory(dir.path(), store.as_ref()).unwrap();
        assert_eq!(set.prefix, "si");
        assert_eq!(set.num_pools(), 3);
        assert_eq!(set.nkpt, 10);
        let counts: Vec<_> = set.pools.iter().map(|p| p.nk_loc).collect();
        assert_eq!(counts, vec![4, 3, 3]);
        assert_eq!(set.nkq, SourceFixture::new("si", 10, 3).expected_nkq());
        assert_eq!(set.pools[0].filename, "si_eph_g2_p1.h5");
    }

    #[test]
    fn test_scan_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = default_store();
        SourceFixture::new("si", 17, 4).write(dir.path(), store.as_ref()).unwrap();

        let first = scan_source_directory(dir.path(), store.as_ref()).unwrap();
        let second = scan_source_directory(dir.path(), store.as_ref()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_other_files_ignored() {
        let dir = TempDir::new().unwrap();
        let store = default_store();
        SourceFixture::new("si", 5, 2).write(dir.path(), store.as_ref()).unwrap();
        fs::write(dir.path().join("si_epwan.h5"), "x").unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        fs::create_dir(dir.path().join("si_eph_g2_p3.h5")).unwrap();

        let set = scan_source_directory(dir.path(), store.as_ref()).unwrap();
        assert_eq!(set.num_pools(), 2);
    }

    #[test]
    fn test_empty_directory() {
        let dir = TempDir::new().unwrap();
        let err = find_pool_files(dir.path()).unwrap_err();
        assert!(matches!(err, DiscoveryError::EmptyDataset(_)));
    }

    #[test]
    fn test_not_a_directory() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file");
        fs::write(&file, "x").unwrap();
        assert!(matches!(
            find_pool_files(&file),
            Err(DiscoveryError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_ambiguous_prefix() {
        let dir = TempDir::new().unwrap();
        let store = default_store();
        SourceFixture::new("si", 4, 2).write(dir.path(), store.as_ref()).unwrap();
        SourceFixture::new("gaas", 4, 1).write(dir.path(), store.as_ref()).unwrap();
        match find_pool_files(dir.path()) {
            Err(DiscoveryError::AmbiguousDataset { prefixes, .. }) => {
                assert_eq!(prefixes, vec!["gaas".to_string(), "si".to_string()]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_missing_pool() {
        let dir = TempDir::new().unwrap();
        let store = default_store();
        SourceFixture::new("si", 9, 3).write(dir.path(), store.as_ref()).unwrap();
        fs::remove_file(dir.path().join("si_eph_g2_p2.h5")).unwrap();
        assert!(matches!(
            find_pool_files(dir.path()),
            Err(DiscoveryError::MissingPool { pool_number: 2, .. })
        ));
    }

    #[test]
    fn test_duplicate_pool_number() {
        let dir = TempDir::new().unwrap();
        let store = default_store();
        SourceFixture::new("si", 4, 1).write(dir.path(), store.as_ref()).unwrap();
        fs::copy(
            dir.path().join("si_eph_g2_p1.h5"),
            dir.path().join("si_eph_g2_p01.h5"),
        )
        .unwrap();
        assert!(matches!(
            find_pool_files(dir.path()),
            Err(DiscoveryError::DuplicatePool { pool_number: 1, .. })
        ));
    }

    #[test]
    fn test_inconsistent_layout() {
        let dir = TempDir::new().unwrap();
        let store = default_store();
        // 9 k-points over 3 pools, with pool 3 swapped for the 4-point pool 3
        // of a 12 k-point set: nkpt becomes 10, so pool 1 should hold 4.
        SourceFixture::new("si", 9, 3).write(dir.path(), store.as_ref()).unwrap();
        let other = TempDir::new().unwrap();
        SourceFixture::new("si", 12, 3).write(other.path(), store.as_ref()).unwrap();
        fs::copy(
            other.path().join("si_eph_g2_p3.h5"),
            dir.path().join("si_eph_g2_p3.h5"),
        )
        .unwrap();
        let err = scan_source_directory(dir.path(), store.as_ref()).unwrap_err();
        match err {
            DiscoveryError::InconsistentLayout {
                found,
                expected,
                nkpt,
                ..
            } => {
                assert_eq!((found, expected, nkpt), (3, 4, 10));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_swapped_pool_files_rejected() {
        let dir = TempDir::new().unwrap();
        let store = default_store();
        // Every pool holds 3 k-points, so only the recorded pool number differs
        SourceFixture::new("si", 9, 3).write(dir.path(), store.as_ref()).unwrap();
        let p1 = dir.path().join("si_eph_g2_p1.h5");
        let p2 = dir.path().join("si_eph_g2_p2.h5");
        let held = dir.path().join("held");
        fs::rename(&p1, &held).unwrap();
        fs::rename(&p2, &p1).unwrap();
        fs::rename(&held, &p2).unwrap();

        match scan_source_directory(dir.path(), store.as_ref()) {
            Err(DiscoveryError::MislabelledPool {
                filename,
                pool_number,
                recorded,
            }) => {
                assert_eq!(filename, "si_eph_g2_p1.h5");
                assert_eq!((pool_number, recorded), (1, 2));
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let listing = find_pool_files(dir.path()).unwrap();
        assert!(matches!(
            listing.scan_parallel(store, 4, |_| {}).await,
            Err(DiscoveryError::MislabelledPool { .. })
        ));
    }

    #[tokio::test]
    async fn test_parallel_scan_matches_serial() {
        let dir = TempDir::new().unwrap();
        let store = default_store();
        SourceFixture::new("si", 23, 5).write(dir.path(), store.as_ref()).unwrap();

        let listing = find_pool_files(dir.path()).unwrap();
        let serial = listing.scan(store.as_ref(), |_| {}).unwrap();
        let mut seen = Vec::new();
        let parallel = listing
            .scan_parallel(store.clone(), 2, |s| seen.push(s.pool_number))
            .await
            .unwrap();

        assert_eq!(serial, parallel);
        seen.sort();
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_max_filename_len() {
        let dir = TempDir::new().unwrap();
        let store = default_store();
        SourceFixture::new("si", 12, 11).write(dir.path(), store.as_ref()).unwrap();
        let listing = find_pool_files(dir.path()).unwrap();
        assert_eq!(listing.max_filename_len(), "si_eph_g2_p11.h5".len());
    }
}
