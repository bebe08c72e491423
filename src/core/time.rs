//! Timestamp helper shared by the catalog tables.

/// RFC3339-like UTC seconds with a 'Z' suffix. Stable ordering and human
/// readable without pulling in a date/time dependency.
pub fn now_iso() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("{}Z", secs)
}
