//! Installation-wide configuration (`site.toml`).
//!
//! Holds the global course defaults applied when a create spec omits a
//! field, plus the site-level completion switch. A missing file means
//! compiled-in defaults; a malformed file is a configuration error.

use crate::core::error::CatalogError;
use crate::core::store::Store;
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CourseDefaults {
    pub format: String,
    pub numsections: i64,
    pub summaryformat: i64,
    pub visible: bool,
    pub lang: String,
}

impl Default for CourseDefaults {
    fn default() -> Self {
        Self {
            format: "topics".to_string(),
            numsections: 5,
            summaryformat: 1,
            visible: true,
            lang: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Completion tracking is honored only when this is on; otherwise the
    /// per-course flag is stored inert as 0.
    pub enablecompletion: bool,
    pub coursedefaults: CourseDefaults,
}

impl SiteConfig {
    pub fn load(store: &Store) -> Result<Self, CatalogError> {
        let path = store.config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&path).map_err(CatalogError::Io)?;
        toml::from_str(&raw)
            .map_err(|e| CatalogError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn save(&self, store: &Store) -> Result<(), CatalogError> {
        let raw = toml::to_string_pretty(self)
            .map_err(|e| CatalogError::Config(e.to_string()))?;
        fs::write(store.config_path(), raw).map_err(CatalogError::Io)
    }
}
