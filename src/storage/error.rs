//! Error types for the pool file storage layer

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage error types
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O operation failed
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Pool file contents could not be encoded or decoded
    #[error("Serialization error in {}: {message}", path.display())]
    Serialization { path: PathBuf, message: String },

    /// Local index outside `1..=nk_loc`
    #[error("Local index {index} out of range 1..={len} in {}", path.display())]
    IndexOutOfRange {
        path: PathBuf,
        index: usize,
        len: usize,
    },

    /// Write attempted on a handle opened for reading
    #[error("{} is open read-only", path.display())]
    ReadOnly { path: PathBuf },

    /// A record slot was read before its field was written
    #[error("Record {index} in {} has no {field}", path.display())]
    MissingField {
        path: PathBuf,
        index: usize,
        field: &'static str,
    },

    /// A pool file was closed with unwritten records
    #[error("{} is incomplete: record {index} was never fully written", path.display())]
    Incomplete { path: PathBuf, index: usize },

    /// A record value violates its own shape invariants
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Refused to overwrite an existing pool file
    #[error("{} already exists", path.display())]
    AlreadyExists { path: PathBuf },
}

impl StorageError {
    /// Create an I/O error tagged with the file it happened on
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create a serialization error tagged with the file it happened on
    pub fn serialization<E: std::fmt::Display>(path: impl AsRef<Path>, err: E) -> Self {
        Self::Serialization {
            path: path.as_ref().to_path_buf(),
            message: err.to_string(),
        }
    }

    /// Create an invalid record error
    pub fn invalid_record<E: std::fmt::Display>(msg: E) -> Self {
        Self::InvalidRecord(msg.to_string())
    }

    /// Check if this error came from the operating system
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}
