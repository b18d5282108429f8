//! Pool file naming convention: `<prefix>_eph_g2_p<pool_number>.h5`
//!
//! Pool numbers are 1-based on disk.

use once_cell::sync::Lazy;
use regex::Regex;

static POOL_FILE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([^_]+)_eph_g2_p(\d+)\.h5$").expect("Invalid pool file regex")
});

/// Parsed pool file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolFileName {
    pub prefix: String,
    pub pool_number: usize,
}

/// Build the file name for a pool
pub fn pool_file_name(prefix: &str, pool_number: usize) -> String {
    format!("{prefix}_eph_g2_p{pool_number}.h5")
}

/// Parse a file name, returning `None` for anything that is not a pool file
pub fn parse_pool_file_name(name: &str) -> Option<PoolFileName> {
    let caps = POOL_FILE_REGEX.captures(name)?;
    let pool_number = caps[2].parse().ok()?;
    Some(PoolFileName {
        prefix: caps[1].to_string(),
        pool_number,
    })
}
