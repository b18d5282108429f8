//! # pertool
//!
//! Reshape Perturbo `eph_g2` pool files for a different number of pools.
//!
//! ## Usage
//!
//! ```bash
//! pertool reshape -f ./tmp -t ./tmp-8 -p 8 [--mp] [-M 16] [-n] [-q]
//! ```
//!
//! ## Modules
//!
//! - `cli` - Argument parsing and command handlers
//! - `config` - Run configuration and the optional settings file
//! - `error` - Unified error type for reshape runs
//! - `reshape` - Index mapping, discovery and the serial and parallel copy engines
//! - `storage` - Pool file storage contract and the bundled file backend
//! - `testing` - Fixtures and test doubles shared by tests and benchmarks
pub mod cli;
pub mod config;
pub mod error;
pub mod reshape;
pub mod storage;

pub mod testing;
