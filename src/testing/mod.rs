//! Testing utilities and fixtures
//!
//! Synthetic pool sets, a progress recorder and a store that injects
//! storage failures. Used by unit tests, integration tests and benchmarks.

pub mod fixtures;
pub mod mocks;

pub use fixtures::{expected_record, read_all_records, SourceFixture};
pub use mocks::{FaultyPoolStore, RecordingProgress};
