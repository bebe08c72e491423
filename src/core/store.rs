//! Store handle for a catalog installation.
//!
//! A Store is the root directory holding the catalog database, the site
//! configuration file, and the mutation audit log. All manager operations
//! are scoped to a store.

use std::path::{Path, PathBuf};

use crate::core::schemas;

/// Handle to one catalog installation rooted at a directory.
#[derive(Debug, Clone)]
pub struct Store {
    /// Absolute path to the store root directory.
    pub root: PathBuf,
}

impl Store {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// Path of the catalog database inside this store.
    pub fn db_path(&self) -> PathBuf {
        self.root.join(schemas::CATALOG_DB_NAME)
    }

    /// Path of the site configuration file inside this store.
    pub fn config_path(&self) -> PathBuf {
        self.root.join("site.toml")
    }
}
