//! Content transfer between courses: import (copy content into an existing
//! course, optionally purging it first) and duplicate (materialize a fresh
//! course from an existing one). Both run their mutations inside a single
//! transaction so a failed transfer leaves the target untouched.

use crate::core::broker::DbBroker;
use crate::core::capability::{
    allowed_in_chain, context_chain, require_in_chain, Actor, CapabilityGate, Context,
    CAP_BACKUP_COURSE, CAP_BACKUP_USERINFO, CAP_COURSE_CREATE, CAP_RESTORE_COURSE,
    CAP_RESTORE_USERINFO,
};
use crate::core::course::{self, CourseRecord};
use crate::core::error::CatalogError;
use crate::core::format;
use crate::core::modplugin::PluginRegistry;
use crate::core::store::Store;
use crate::core::time::now_iso;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::time::Instant;

/// Which content kinds a transfer carries. Everything is on by default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportOptions {
    pub activities: bool,
    pub blocks: bool,
    pub filters: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            activities: true,
            blocks: true,
            filters: true,
        }
    }
}

impl ImportOptions {
    /// Parse name/value pairs. Unknown names are rejected; values must be
    /// "0" or "1".
    pub fn parse(options: &[(String, String)]) -> Result<Self, CatalogError> {
        let mut parsed = ImportOptions::default();
        for (name, value) in options {
            let on = match value.as_str() {
                "0" => false,
                "1" => true,
                other => {
                    return Err(CatalogError::Validation(format!(
                        "option '{}' value '{}' must be 0 or 1",
                        name, other
                    )))
                }
            };
            match name.as_str() {
                "activities" => parsed.activities = on,
                "blocks" => parsed.blocks = on,
                "filters" => parsed.filters = on,
                other => {
                    return Err(CatalogError::Validation(format!(
                        "unknown import option '{}'",
                        other
                    )))
                }
            }
        }
        Ok(parsed)
    }
}

thread_local! {
    static BUDGET_DEADLINE: Cell<Option<Instant>> = const { Cell::new(None) };
}

/// Suspends the thread's execution deadline for the lifetime of the guard.
/// Transfers copy arbitrary amounts of content, so they run unbudgeted;
/// the previous deadline is restored when the guard drops, failure paths
/// included.
pub struct ExecutionBudget {
    previous: Option<Instant>,
}

impl ExecutionBudget {
    pub fn suspend() -> Self {
        let previous = BUDGET_DEADLINE.with(|cell| cell.replace(None));
        ExecutionBudget { previous }
    }

    pub fn set_deadline(deadline: Instant) {
        BUDGET_DEADLINE.with(|cell| cell.set(Some(deadline)));
    }

    pub fn current_deadline() -> Option<Instant> {
        BUDGET_DEADLINE.with(|cell| cell.get())
    }
}

impl Drop for ExecutionBudget {
    fn drop(&mut self) {
        let previous = self.previous;
        BUDGET_DEADLINE.with(|cell| cell.set(previous));
    }
}

/// Copy content from one existing course into another.
///
/// `delete_content` must be 0 (merge) or 1 (purge the target's enabled
/// content kinds first); any other value is rejected by name before
/// anything is touched. Needs `backup:backupcourse` on the source chain and
/// `restore:restorecourse` on the target chain.
pub fn import_course(
    store: &Store,
    gate: &dyn CapabilityGate,
    actor: &Actor,
    registry: &PluginRegistry,
    source: i64,
    target: i64,
    delete_content: i64,
    options: &ImportOptions,
) -> Result<(), CatalogError> {
    if delete_content != 0 && delete_content != 1 {
        return Err(CatalogError::Validation(format!(
            "deletecontent must be 0 or 1, got {}",
            delete_content
        )));
    }
    let broker = DbBroker::new(&store.root);
    broker.with_conn(&store.db_path(), &actor.name, "course.import", |conn| {
        course::get_course(conn, source)?;
        course::get_course(conn, target)?;

        let source_chain = context_chain(conn, &Context::Course(source))?;
        require_in_chain(gate, actor, &source_chain, CAP_BACKUP_COURSE)?;
        let target_chain = context_chain(conn, &Context::Course(target))?;
        require_in_chain(gate, actor, &target_chain, CAP_RESTORE_COURSE)?;

        let _budget = ExecutionBudget::suspend();
        let tx = conn.transaction()?;
        if delete_content == 1 {
            purge_content(&tx, registry, target, options)?;
        }
        clone_content(&tx, registry, source, target, options)?;
        tx.commit()?;
        Ok(())
    })
}

/// Options accepted by [`duplicate_course`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DuplicateOptions {
    /// Carry enrolments over. Silently degrades to structure-only when the
    /// actor lacks the userinfo capabilities on either side.
    pub users: bool,
    #[serde(default)]
    pub visible: Option<bool>,
}

/// Create a fresh course in `categoryid` carrying all of `source`'s
/// structure and content.
pub fn duplicate_course(
    store: &Store,
    gate: &dyn CapabilityGate,
    actor: &Actor,
    registry: &PluginRegistry,
    source: i64,
    fullname: &str,
    shortname: &str,
    categoryid: i64,
    options: &DuplicateOptions,
) -> Result<CourseRecord, CatalogError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(&store.db_path(), &actor.name, "course.duplicate", |conn| {
        let src = course::get_course(conn, source)?;
        crate::core::category::get_category(conn, categoryid)?;

        let target_chain = context_chain(conn, &Context::Category(categoryid))?;
        require_in_chain(gate, actor, &target_chain, CAP_COURSE_CREATE)?;
        let source_chain = context_chain(conn, &Context::Course(source))?;
        require_in_chain(gate, actor, &source_chain, CAP_BACKUP_COURSE)?;

        // The users option needs both userinfo capabilities; lacking them
        // quietly downgrades the copy instead of failing it.
        let copy_users = options.users
            && allowed_in_chain(gate, actor, &source_chain, CAP_BACKUP_USERINFO)
            && allowed_in_chain(gate, actor, &target_chain, CAP_RESTORE_USERINFO);

        let clash: Option<i64> = conn
            .query_row(
                "SELECT id FROM courses WHERE shortname = ?1",
                [shortname],
                |row| row.get(0),
            )
            .optional()?;
        if clash.is_some() {
            return Err(CatalogError::Uniqueness(format!(
                "course shortname '{}' already exists",
                shortname
            )));
        }

        let _budget = ExecutionBudget::suspend();
        let tx = conn.transaction()?;
        let visible = options.visible.unwrap_or(src.visible);
        let ts = now_iso();
        tx.execute(
            "INSERT INTO courses
               (category, fullname, shortname, idnumber, summary, summaryformat, format,
                numsections, visible, lang, theme, enablecompletion, timecreated, timemodified)
             VALUES (?1, ?2, ?3, NULL, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
            params![
                categoryid,
                fullname,
                shortname,
                src.summary,
                src.summaryformat,
                src.format,
                src.numsections,
                visible as i64,
                src.lang,
                src.theme,
                src.enablecompletion as i64,
                ts
            ],
        )?;
        let new_id = tx.last_insert_rowid();
        course::ensure_sections(&tx, new_id, src.numsections)?;
        format::copy_options(&tx, source, new_id)?;

        clone_content(&tx, registry, source, new_id, &ImportOptions::default())?;
        if copy_users {
            tx.execute(
                "INSERT OR IGNORE INTO enrolments (courseid, actor)
                 SELECT ?1, actor FROM enrolments WHERE courseid = ?2",
                params![new_id, source],
            )?;
        }
        tx.commit()?;

        course::get_course(conn, new_id)
    })
}

/// Copy the enabled content kinds from `source` into `target`. Sections are
/// matched by position index; a missing target section is created carrying
/// the source section's name, summary and visibility. Activity instances go
/// through their plugin's clone hook so every copy gets a fresh instance id.
pub fn clone_content(
    conn: &Connection,
    registry: &PluginRegistry,
    source: i64,
    target: i64,
    options: &ImportOptions,
) -> Result<(), CatalogError> {
    if options.activities {
        let mut stmt = conn.prepare(
            "SELECT s.section, s.name, s.summary, s.visible, m.modname, m.instance,
                    m.visible, m.showdescription
               FROM course_modules m JOIN course_sections s ON m.section = s.id
              WHERE m.course = ?1 ORDER BY s.section, m.id",
        )?;
        #[allow(clippy::type_complexity)]
        let rows: Vec<(i64, Option<String>, Option<String>, i64, String, i64, i64, i64)> = stmt
            .query_map([source], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                ))
            })?
            .collect::<Result<_, _>>()?;

        for (section, name, summary, sec_visible, modname, instance, visible, showdesc) in rows {
            let sectionid = match course::section_id(conn, target, section) {
                Ok(id) => id,
                Err(CatalogError::MissingRecord(_)) => {
                    conn.execute(
                        "INSERT INTO course_sections (course, section, name, summary, visible)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![target, section, name, summary, sec_visible],
                    )?;
                    conn.last_insert_rowid()
                }
                Err(err) => return Err(err),
            };
            let plugin = registry.get(&modname)?;
            let new_instance = plugin.clone_instance(conn, instance, target)?;
            conn.execute(
                "INSERT INTO course_modules
                   (course, section, modname, instance, visible, showdescription)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![target, sectionid, modname, new_instance, visible, showdesc],
            )?;
        }
    }
    if options.blocks {
        conn.execute(
            "INSERT INTO block_instances (course, blockname)
             SELECT ?1, blockname FROM block_instances WHERE course = ?2",
            params![target, source],
        )?;
    }
    if options.filters {
        conn.execute(
            "INSERT INTO course_filters (course, filter, active)
             SELECT ?1, filter, active FROM course_filters WHERE course = ?2",
            params![target, source],
        )?;
    }
    Ok(())
}

fn purge_content(
    conn: &Connection,
    registry: &PluginRegistry,
    courseid: i64,
    options: &ImportOptions,
) -> Result<(), CatalogError> {
    if options.activities {
        let mut stmt =
            conn.prepare("SELECT modname, instance FROM course_modules WHERE course = ?1")?;
        let modules: Vec<(String, i64)> = stmt
            .query_map([courseid], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<_, _>>()?;
        for (modname, instance) in modules {
            registry.get(&modname)?.delete(conn, instance)?;
        }
        conn.execute("DELETE FROM course_modules WHERE course = ?1", [courseid])?;
    }
    if options.blocks {
        conn.execute("DELETE FROM block_instances WHERE course = ?1", [courseid])?;
    }
    if options.filters {
        conn.execute("DELETE FROM course_filters WHERE course = ?1", [courseid])?;
    }
    Ok(())
}
