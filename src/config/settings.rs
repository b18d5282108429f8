//! Optional TOML settings file
//!
//! ```toml
//! [reshape]
//! max_workers = 16
//! report_interval = "500ms"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::error::{ReshapeError, ReshapeResult};

/// Contents of a settings file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub reshape: ReshapeSettings,
}

/// Defaults for the `reshape` command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReshapeSettings {
    pub max_workers: Option<usize>,
    #[serde(with = "humantime_serde")]
    pub report_interval: Option<Duration>,
}

impl Settings {
    pub fn from_toml_str(content: &str) -> ReshapeResult<Self> {
        toml::from_str(content)
            .map_err(|e| ReshapeError::config(format!("Invalid settings: {e}")))
    }

    /// Load settings from `path`
    pub fn load(path: &Path) -> ReshapeResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ReshapeError::config(format!("Cannot read {}: {e}", path.display()))
        })?;
        let settings: Self = toml::from_str(&content).map_err(|e| {
            ReshapeError::config(format!("Invalid settings in {}: {e}", path.display()))
        })?;
        debug!("Loaded settings from {}: {:?}", path.display(), settings);
        Ok(settings)
    }

    /// Load from `path` if given, otherwise use empty settings
    pub fn load_optional(path: Option<&Path>) -> ReshapeResult<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }
}
