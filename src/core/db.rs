use crate::core::broker::DbBroker;
use crate::core::error;
use crate::core::modplugin::PluginRegistry;
use crate::core::schemas;
use crate::core::store::Store;
use rusqlite::Connection;
use std::fs;

pub fn db_connect(db_path: &str) -> Result<Connection, error::CatalogError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .map_err(error::CatalogError::Rusqlite)?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))
        .map_err(error::CatalogError::Rusqlite)?;
    conn.execute("PRAGMA foreign_keys=ON;", [])
        .map_err(error::CatalogError::Rusqlite)?;
    Ok(conn)
}

/// Create the catalog database and every plugin's instance table.
pub fn initialize_catalog_db(
    store: &Store,
    registry: &PluginRegistry,
) -> Result<(), error::CatalogError> {
    fs::create_dir_all(&store.root).map_err(error::CatalogError::Io)?;

    let broker = DbBroker::new(&store.root);
    broker.with_conn(&store.db_path(), "system", "catalog.init", |conn| {
        conn.execute(schemas::CATALOG_DB_SCHEMA_CATEGORIES, [])?;
        conn.execute(schemas::CATALOG_DB_SCHEMA_INDEX_CATEGORY_PARENT, [])?;
        conn.execute(schemas::CATALOG_DB_SCHEMA_INDEX_CATEGORY_PATH, [])?;
        conn.execute(schemas::CATALOG_DB_SCHEMA_COURSES, [])?;
        conn.execute(schemas::CATALOG_DB_SCHEMA_INDEX_COURSE_CATEGORY, [])?;
        conn.execute(schemas::CATALOG_DB_SCHEMA_FORMAT_OPTIONS, [])?;
        conn.execute(schemas::CATALOG_DB_SCHEMA_SECTIONS, [])?;
        conn.execute(schemas::CATALOG_DB_SCHEMA_MODULES, [])?;
        conn.execute(schemas::CATALOG_DB_SCHEMA_INDEX_MODULES_COURSE, [])?;
        conn.execute(schemas::CATALOG_DB_SCHEMA_BLOCKS, [])?;
        conn.execute(schemas::CATALOG_DB_SCHEMA_FILTERS, [])?;
        conn.execute(schemas::CATALOG_DB_SCHEMA_ENROLMENTS, [])?;
        for plugin in registry.plugins() {
            plugin.install(conn)?;
        }
        Ok(())
    })
}
