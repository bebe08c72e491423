use crate::core::db;
use crate::core::error;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use ulid::Ulid;

/// The DB Broker is the single entry point for state access: it opens the
/// connection, serializes in-process callers, and appends an audit event for
/// every operation, success or failure.
pub struct DbBroker {
    audit_log_path: PathBuf,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BrokerEvent {
    pub ts: String,
    pub event_id: String,
    pub actor: String,
    pub op: String,
    pub status: String,
}

impl DbBroker {
    pub fn new(root: &Path) -> Self {
        Self {
            audit_log_path: root.join("catalog.events.jsonl"),
        }
    }

    /// Execute a closure with a serialized connection to the catalog DB.
    ///
    /// The closure receives a mutable connection so multi-step mutations can
    /// open a scoped `rusqlite` transaction.
    pub fn with_conn<F, R>(
        &self,
        db_path: &Path,
        actor: &str,
        op_name: &str,
        f: F,
    ) -> Result<R, error::CatalogError>
    where
        F: FnOnce(&mut Connection) -> Result<R, error::CatalogError>,
    {
        static DB_LOCK: Mutex<()> = Mutex::new(());
        let _lock = DB_LOCK.lock().unwrap();

        let mut conn = db::db_connect(&db_path.to_string_lossy())?;
        let result = f(&mut conn);

        let status = if result.is_ok() { "success" } else { "error" };
        self.log_event(actor, op_name, status)?;

        result
    }

    fn log_event(&self, actor: &str, op: &str, status: &str) -> Result<(), error::CatalogError> {
        use std::fs::OpenOptions;
        use std::io::Write;
        use std::time::{SystemTime, UNIX_EPOCH};

        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let ts = format!("{}Z", secs);

        let ev = BrokerEvent {
            ts,
            event_id: Ulid::new().to_string(),
            actor: actor.to_string(),
            op: op.to_string(),
            status: status.to_string(),
        };

        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.audit_log_path)
            .map_err(error::CatalogError::Io)?;

        writeln!(f, "{}", serde_json::to_string(&ev).unwrap()).map_err(error::CatalogError::Io)?;
        Ok(())
    }
}
