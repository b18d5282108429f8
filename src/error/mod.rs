use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::reshape::discovery::DiscoveryError;
use crate::reshape::mapping::MappingError;
use crate::storage::StorageError;

/// Result type for reshape operations
pub type ReshapeResult<T> = Result<T, ReshapeError>;

/// The unified error type for a reshape run
#[derive(Error, Debug)]
pub enum ReshapeError {
    /// Invalid option combination, detected before any I/O
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// Target directory is not usable, detected before any write
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// A worker writing one target pool failed
    #[error("Worker for target pool {pool} failed: {source}")]
    Worker {
        pool: usize,
        #[source]
        source: Box<ReshapeError>,
    },

    /// A worker stopped without reporting completion
    #[error("Worker for target pool {pool} exited without reporting completion")]
    WorkerLost { pool: usize },

    /// The progress messages did not add up to the number of k-points
    #[error("Progress accounting mismatch: expected {expected} records, workers reported {actual}")]
    Accounting { expected: usize, actual: usize },

    /// The run failed and some of its partial pool files could not be removed
    #[error("{source}; partial pool files left behind: {}", list_paths(leftover))]
    IncompleteCleanup {
        #[source]
        source: Box<ReshapeError>,
        leftover: Vec<PathBuf>,
    },

    /// A worker task panicked or was cancelled
    #[error("Worker task failed to complete: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ReshapeError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a precondition error
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }

    /// Error for a target directory that already holds files
    pub fn target_not_empty(dir: &Path) -> Self {
        Self::Precondition(format!("Existing files found in {}, aborting.", dir.display()))
    }

    /// Wrap an error raised inside the worker for `pool`
    pub fn worker(pool: usize, source: ReshapeError) -> Self {
        Self::Worker {
            pool,
            source: Box::new(source),
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        1
    }
}

fn list_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_error_message_includes_pool_and_cause() {
        let err = ReshapeError::worker(
            3,
            ReshapeError::Storage(StorageError::invalid_record("bad shape")),
        );
        let msg = err.to_string();
        assert!(msg.contains("target pool 3"));
        assert!(msg.contains("bad shape"));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_incomplete_cleanup_names_leftover_files() {
        let err = ReshapeError::IncompleteCleanup {
            source: Box::new(ReshapeError::WorkerLost { pool: 2 }),
            leftover: vec![PathBuf::from("/out/si_eph_g2_p1.h5")],
        };
        let msg = err.to_string();
        assert!(msg.contains("target pool 2"));
        assert!(msg.ends_with("partial pool files left behind: /out/si_eph_g2_p1.h5"));
        assert_eq!(err.exit_code(), 1);
    }
}
