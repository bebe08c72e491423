//! Core catalog engine: storage, capability gate, tree store, and the
//! managers behind the external surface.

pub mod broker;
pub mod capability;
pub mod category;
pub mod config;
pub mod contents;
pub mod course;
pub mod db;
pub mod error;
pub mod external;
pub mod format;
pub mod import;
pub mod modplugin;
pub mod schemas;
pub mod store;
pub mod time;
pub mod tree;
