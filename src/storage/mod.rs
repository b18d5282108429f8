//! Storage abstraction layer for pool files
//!
//! The reshape core treats pool files as an opaque store exposing
//! get/set-by-index operations. [`PoolStore`] and [`PoolHandle`] are that
//! contract; [`backends::FilePoolStore`] is the bundled implementation.

pub mod backends;
pub mod error;
pub mod naming;
pub mod traits;
pub mod types;

pub use backends::FilePoolStore;
pub use error::{StorageError, StorageResult};
pub use naming::{parse_pool_file_name, pool_file_name, PoolFileName};
pub use traits::{PoolHandle, PoolStore};
pub use types::{BandsIndex, EphG2, KPointRecord, OpenMode};

use std::sync::Arc;

/// Shared handle to whichever store the run uses
pub type SharedPoolStore = Arc<dyn PoolStore>;

/// Default store for the command line tool
pub fn default_store() -> SharedPoolStore {
    Arc::new(FilePoolStore::new())
}
