//! Course format registry.
//!
//! The format identifier on a course decides which structural options apply.
//! Each format declares its option schema; create/update validate submitted
//! name/value pairs against it, rejecting unknown names and non-integer
//! values before anything is stored.

use crate::core::error::CatalogError;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

/// Summary formats recognized installation-wide: 0 (site), 1 (html),
/// 2 (plain), 4 (markdown).
pub const VALID_SUMMARY_FORMATS: &[i64] = &[0, 1, 2, 4];

pub fn is_valid_summary_format(value: i64) -> bool {
    VALID_SUMMARY_FORMATS.contains(&value)
}

/// An option name/value pair as carried across the call boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FormatOption {
    pub name: String,
    pub value: String,
}

impl FormatOption {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

/// Declared option names per format.
fn option_schema(format: &str) -> Result<&'static [&'static str], CatalogError> {
    match format {
        "topics" => Ok(&["numsections", "hiddensections", "coursedisplay"]),
        "weeks" => Ok(&["numsections", "hiddensections"]),
        other => Err(CatalogError::Validation(format!(
            "unknown course format '{}'",
            other
        ))),
    }
}

pub fn is_known_format(format: &str) -> bool {
    option_schema(format).is_ok()
}

/// Validate submitted options against the named format's schema. All
/// declared options are integer-valued.
pub fn validate_options(format: &str, options: &[FormatOption]) -> Result<(), CatalogError> {
    let schema = option_schema(format)?;
    for opt in options {
        if !schema.contains(&opt.name.as_str()) {
            return Err(CatalogError::Validation(format!(
                "option '{}' is not declared by course format '{}'",
                opt.name, format
            )));
        }
        opt.value.parse::<i64>().map_err(|_| {
            CatalogError::Validation(format!(
                "option '{}' expects an integer value, got '{}'",
                opt.name, opt.value
            ))
        })?;
    }
    Ok(())
}

/// Store options for a course, replacing any previous value per name.
pub fn set_options(
    conn: &Connection,
    courseid: i64,
    format: &str,
    options: &[FormatOption],
) -> Result<(), CatalogError> {
    validate_options(format, options)?;
    for opt in options {
        conn.execute(
            "INSERT INTO course_format_options (courseid, format, name, value)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(courseid, format, name) DO UPDATE SET value = excluded.value",
            params![courseid, format, opt.name, opt.value],
        )?;
    }
    Ok(())
}

/// Flattened name/value pairs for a course in declaration order.
pub fn get_options(
    conn: &Connection,
    courseid: i64,
    format: &str,
) -> Result<Vec<FormatOption>, CatalogError> {
    let schema = option_schema(format)?;
    let mut out = Vec::new();
    let mut stmt = conn.prepare(
        "SELECT value FROM course_format_options WHERE courseid = ?1 AND format = ?2 AND name = ?3",
    )?;
    for name in schema {
        let value: Option<String> = stmt
            .query_row(params![courseid, format, name], |row| row.get(0))
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        if let Some(value) = value {
            out.push(FormatOption::new(name, &value));
        }
    }
    Ok(out)
}

/// Copy all stored options from one course to another (import engine).
pub fn copy_options(conn: &Connection, source: i64, target: i64) -> Result<(), CatalogError> {
    conn.execute(
        "INSERT INTO course_format_options (courseid, format, name, value)
         SELECT ?2, format, name, value FROM course_format_options WHERE courseid = ?1
         ON CONFLICT(courseid, format, name) DO UPDATE SET value = excluded.value",
        params![source, target],
    )?;
    Ok(())
}
