//! Module plugin contract.
//!
//! The core never looks inside an activity's type-specific payload; it only
//! orchestrates the lifecycle (create / delete / clone) through this trait,
//! looked up by module-type identifier. The built-in plugins all store a
//! minimal (name, intro) payload in a table they own, which is enough for
//! the catalog core and its import pipeline; richer activity types plug in
//! the same way.

use crate::core::error::CatalogError;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;

/// Lifecycle hooks implemented per module type. `instance` ids are foreign
/// keys into whatever storage the plugin owns.
pub trait ModulePlugin: Send + Sync {
    fn name(&self) -> &str;

    /// Create the plugin's own storage. Idempotent.
    fn install(&self, conn: &Connection) -> Result<(), CatalogError>;

    fn create(
        &self,
        conn: &Connection,
        course: i64,
        name: &str,
        intro: &str,
    ) -> Result<i64, CatalogError>;

    fn delete(&self, conn: &Connection, instance: i64) -> Result<(), CatalogError>;

    /// Clone an instance into `target_course`, returning the fresh instance id.
    fn clone_instance(
        &self,
        conn: &Connection,
        instance: i64,
        target_course: i64,
    ) -> Result<i64, CatalogError>;

    /// Display name and raw intro text of an instance.
    fn describe(&self, conn: &Connection, instance: i64) -> Result<(String, String), CatalogError>;
}

/// Generic plugin over a `mod_<type>` table with (course, name, intro) rows.
pub struct TablePlugin {
    modname: String,
    table: String,
}

impl TablePlugin {
    pub fn new(modname: &str) -> Self {
        Self {
            modname: modname.to_string(),
            table: format!("mod_{}", modname),
        }
    }
}

impl ModulePlugin for TablePlugin {
    fn name(&self) -> &str {
        &self.modname
    }

    fn install(&self, conn: &Connection) -> Result<(), CatalogError> {
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    course INTEGER NOT NULL,
                    name TEXT NOT NULL,
                    intro TEXT NOT NULL DEFAULT ''
                )",
                self.table
            ),
            [],
        )?;
        Ok(())
    }

    fn create(
        &self,
        conn: &Connection,
        course: i64,
        name: &str,
        intro: &str,
    ) -> Result<i64, CatalogError> {
        conn.execute(
            &format!(
                "INSERT INTO {} (course, name, intro) VALUES (?1, ?2, ?3)",
                self.table
            ),
            params![course, name, intro],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn delete(&self, conn: &Connection, instance: i64) -> Result<(), CatalogError> {
        let removed = conn.execute(
            &format!("DELETE FROM {} WHERE id = ?1", self.table),
            [instance],
        )?;
        if removed == 0 {
            return Err(CatalogError::MissingRecord(format!(
                "{} instance {}",
                self.modname, instance
            )));
        }
        Ok(())
    }

    fn clone_instance(
        &self,
        conn: &Connection,
        instance: i64,
        target_course: i64,
    ) -> Result<i64, CatalogError> {
        let (name, intro) = self.describe(conn, instance)?;
        self.create(conn, target_course, &name, &intro)
    }

    fn describe(&self, conn: &Connection, instance: i64) -> Result<(String, String), CatalogError> {
        conn.query_row(
            &format!("SELECT name, intro FROM {} WHERE id = ?1", self.table),
            [instance],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?
        .ok_or_else(|| {
            CatalogError::MissingRecord(format!("{} instance {}", self.modname, instance))
        })
    }
}

/// Registry of module plugins, looked up by module-type identifier.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Box<dyn ModulePlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in activity/resource types.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for modname in ["forum", "page", "label", "url", "quiz"] {
            registry.register(Box::new(TablePlugin::new(modname)));
        }
        registry
    }

    pub fn register(&mut self, plugin: Box<dyn ModulePlugin>) {
        self.plugins.insert(plugin.name().to_string(), plugin);
    }

    pub fn get(&self, modname: &str) -> Result<&dyn ModulePlugin, CatalogError> {
        self.plugins
            .get(modname)
            .map(|p| p.as_ref())
            .ok_or_else(|| {
                CatalogError::Validation(format!("unknown module type '{}'", modname))
            })
    }

    pub fn plugins(&self) -> impl Iterator<Item = &dyn ModulePlugin> {
        self.plugins.values().map(|p| p.as_ref())
    }
}
