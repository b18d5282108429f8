//! Storage backend implementations

pub mod file;

pub use file::{FilePoolHandle, FilePoolReader, FilePoolStore};
