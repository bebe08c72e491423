use std::io;
use thiserror::Error;

/// Error taxonomy for catalog operations.
///
/// Every variant maps to a stable machine-readable code via [`CatalogError::code`];
/// messages are the human-readable half of the contract. Permission failures
/// name the missing capability and the context it was checked in.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("SQLite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Permission denied: missing capability '{capability}' in {context}")]
    Permission { capability: String, context: String },
    #[error("Access denied: {0}")]
    Access(String),
    #[error("Cannot delete: {0}")]
    NotEmpty(String),
    #[error("Move would create a cycle: {0}")]
    Cycle(String),
    #[error("Record not found: {0}")]
    MissingRecord(String),
    #[error("Uniqueness violation: {0}")]
    Uniqueness(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CatalogError {
    /// Stable machine-readable error code, independent of the message text.
    pub fn code(&self) -> &'static str {
        match self {
            CatalogError::Rusqlite(_) => "storage",
            CatalogError::Io(_) => "io",
            CatalogError::Validation(_) => "invalidparameter",
            CatalogError::Permission { .. } => "nopermissions",
            CatalogError::Access(_) => "requirelogin",
            CatalogError::NotEmpty(_) => "categorynotempty",
            CatalogError::Cycle(_) => "cyclicparent",
            CatalogError::MissingRecord(_) => "invalidrecord",
            CatalogError::Uniqueness(_) => "duplicatevalue",
            CatalogError::Config(_) => "invalidconfig",
        }
    }
}
