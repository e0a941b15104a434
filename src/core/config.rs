//! Engine configuration
//!
//! Loaded from TOML and validated before use:
//!
//! ```toml
//! data_dir = "/home/me/.cache/catalog"
//! online = true
//! worker_threads = 4
//!
//! [pictures]
//! capacity = 5000
//! update_interval_secs = 15552000
//!
//! [price_guides]
//! capacity = 500
//! update_interval_secs = 1209600
//! ```

use crate::artifact::ArtifactKind;
use crate::error::{EngineError, Result};
use crate::transfer::UrlScheme;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use validator::Validate;

const DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct CacheConfig {
    /// Capacity in cost units (pictures: KiB of image data, price guides: entries)
    #[validate(range(min = 1))]
    pub capacity: usize,

    /// Refresh interval in seconds, 0 disables refreshing
    pub update_interval_secs: u64,
}

impl CacheConfig {
    pub fn pictures() -> Self {
        CacheConfig {
            capacity: 5000,
            update_interval_secs: 180 * DAY,
        }
    }

    pub fn price_guides() -> Self {
        CacheConfig {
            capacity: 500,
            update_interval_secs: 14 * DAY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct EngineConfig {
    /// Root of the artifact disk cache
    pub data_dir: PathBuf,

    /// Catalog snapshot, `<data_dir>/database` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,

    #[serde(default = "default_online")]
    pub online: bool,

    #[serde(default = "default_worker_threads")]
    #[validate(range(min = 1, max = 64))]
    pub worker_threads: usize,

    #[serde(default = "CacheConfig::pictures")]
    #[validate(nested)]
    pub pictures: CacheConfig,

    #[serde(default = "CacheConfig::price_guides")]
    #[validate(nested)]
    pub price_guides: CacheConfig,

    #[serde(default)]
    pub urls: UrlScheme,
}

fn default_online() -> bool {
    true
}

fn default_worker_threads() -> usize {
    4
}

impl EngineConfig {
    pub fn new<P: Into<PathBuf>>(data_dir: P) -> Self {
        EngineConfig {
            data_dir: data_dir.into(),
            database: None,
            online: default_online(),
            worker_threads: default_worker_threads(),
            pictures: CacheConfig::pictures(),
            price_guides: CacheConfig::price_guides(),
            urls: UrlScheme::default(),
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: EngineConfig =
            toml::from_str(text).map_err(|e| EngineError::Config(e.to_string()))?;
        config.check()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Run the field validators
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| EngineError::Config(e.to_string()))
    }

    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| self.data_dir.join("database"))
    }

    pub fn cache(&self, kind: ArtifactKind) -> &CacheConfig {
        match kind {
            ArtifactKind::Picture => &self.pictures,
            ArtifactKind::PriceGuide => &self.price_guides,
        }
    }

    pub fn cache_mut(&mut self, kind: ArtifactKind) -> &mut CacheConfig {
        match kind {
            ArtifactKind::Picture => &mut self.pictures,
            ArtifactKind::PriceGuide => &mut self.price_guides,
        }
    }
}
