use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tunables for a streaming session.
///
/// Every field has a default, so an empty TOML document is a valid
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StreamConfig {
    /// Width of every atlas page in pixels. Must be a power of two.
    pub page_width: u32,
    /// Height of every atlas page in pixels. Must be a power of two.
    pub page_height: u32,
    /// Refuse to allocate more pages than this.
    pub max_pages: Option<usize>,
    /// Threads kept free of decode work for the update and render loop.
    pub reserved_threads: usize,
    /// Cap on items drained per tick. `None` drains everything available.
    pub max_drain_per_tick: Option<usize>,
    pub initial_instance_capacity: usize,
    /// Directory that `data/`-prefixed identities resolve under.
    pub data_root: Option<PathBuf>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            page_width: 4096,
            page_height: 4096,
            max_pages: None,
            reserved_threads: 2,
            max_drain_per_tick: None,
            initial_instance_capacity: 1024,
            data_root: None,
        }
    }
}

impl StreamConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn with_page_size(mut self, width: u32, height: u32) -> Self {
        self.page_width = width;
        self.page_height = height;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("page_width", self.page_width),
            ("page_height", self.page_height),
        ] {
            if !value.is_power_of_two() {
                return Err(ConfigError::InvalidValue {
                    key,
                    reason: format!("{value} is not a non-zero power of two"),
                });
            }
        }
        if self.max_pages == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "max_pages",
                reason: "at least one page is required".to_string(),
            });
        }
        if self.max_drain_per_tick == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "max_drain_per_tick",
                reason: "a tick must be allowed to drain something".to_string(),
            });
        }
        Ok(())
    }
}
