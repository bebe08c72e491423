//! Course manager: create/read/update/delete courses, their sections and
//! activity modules. Owns the per-field capability table behind the
//! warn-and-skip update contract, and the enrolment-based access checks for
//! destructive operations.

use crate::core::broker::DbBroker;
use crate::core::capability::{
    allowed_in_chain, context_chain, require_in_chain, Actor, CapabilityGate, Context,
    CAP_COURSE_CHANGECATEGORY, CAP_COURSE_CHANGEFULLNAME, CAP_COURSE_CHANGEIDNUMBER,
    CAP_COURSE_CHANGESHORTNAME, CAP_COURSE_CHANGESUMMARY, CAP_COURSE_CREATE,
    CAP_COURSE_MANAGEACTIVITIES, CAP_COURSE_UPDATE, CAP_COURSE_VISIBILITY,
};
use crate::core::category;
use crate::core::config::SiteConfig;
use crate::core::error::CatalogError;
use crate::core::format::{self, FormatOption};
use crate::core::modplugin::PluginRegistry;
use crate::core::store::Store;
use crate::core::time::now_iso;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseSpec {
    pub fullname: String,
    pub shortname: String,
    pub categoryid: i64,
    #[serde(default)]
    pub idnumber: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub summaryformat: Option<i64>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub numsections: Option<i64>,
    #[serde(default)]
    pub visible: Option<bool>,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub enablecompletion: Option<bool>,
    #[serde(default)]
    pub courseformatoptions: Vec<FormatOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseRecord {
    pub id: i64,
    pub categoryid: i64,
    pub fullname: String,
    pub shortname: String,
    pub idnumber: Option<String>,
    pub summary: String,
    pub summaryformat: i64,
    pub format: String,
    pub numsections: i64,
    pub visible: bool,
    pub lang: String,
    pub theme: String,
    pub enablecompletion: bool,
    pub courseformatoptions: Vec<FormatOption>,
    pub timecreated: String,
    pub timemodified: String,
}

/// Partial update; absent fields are left alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourseUpdate {
    pub id: i64,
    #[serde(default)]
    pub fullname: Option<String>,
    #[serde(default)]
    pub shortname: Option<String>,
    #[serde(default)]
    pub categoryid: Option<i64>,
    #[serde(default)]
    pub idnumber: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub summaryformat: Option<i64>,
    #[serde(default)]
    pub visible: Option<bool>,
}

/// A skipped item/field in a batch update, keyed by course id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Warning {
    pub item: String,
    pub warningcode: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateResult {
    pub warnings: Vec<Warning>,
}

/// Create courses in input order. `course:create` is required in each target
/// category's context; the call raises on the first unauthorized item. A
/// `visible` request without `course:visibility` silently falls back to the
/// owning category's visibility instead of failing.
pub fn create_courses(
    store: &Store,
    gate: &dyn CapabilityGate,
    actor: &Actor,
    specs: &[CourseSpec],
) -> Result<Vec<CourseRecord>, CatalogError> {
    let config = SiteConfig::load(store)?;
    let broker = DbBroker::new(&store.root);
    broker.with_conn(&store.db_path(), &actor.name, "course.create", |conn| {
        let mut created = Vec::with_capacity(specs.len());
        for spec in specs {
            let cat = category::get_category(conn, spec.categoryid)?;
            let chain = context_chain(conn, &Context::Category(spec.categoryid))?;
            require_in_chain(gate, actor, &chain, CAP_COURSE_CREATE)?;

            ensure_unique_shortname(conn, &spec.shortname, None)?;
            if let Some(idnumber) = &spec.idnumber {
                ensure_unique_idnumber(conn, idnumber, None)?;
            }

            let defaults = &config.coursedefaults;
            let fmt = spec.format.clone().unwrap_or_else(|| defaults.format.clone());
            if !format::is_known_format(&fmt) {
                return Err(CatalogError::Validation(format!(
                    "unknown course format '{}'",
                    fmt
                )));
            }
            let summaryformat = spec.summaryformat.unwrap_or(defaults.summaryformat);
            if !format::is_valid_summary_format(summaryformat) {
                return Err(CatalogError::Validation(format!(
                    "invalid summary format {}",
                    summaryformat
                )));
            }
            format::validate_options(&fmt, &spec.courseformatoptions)?;

            let visible = match spec.visible {
                Some(wanted) if allowed_in_chain(gate, actor, &chain, CAP_COURSE_VISIBILITY) => {
                    wanted
                }
                // No visibility capability (or no explicit request): the
                // category's visibility wins, silently.
                _ => cat.visible,
            };
            // Stored but inert while completion is disabled site-wide.
            let enablecompletion =
                config.enablecompletion && spec.enablecompletion.unwrap_or(false);

            let numsections = spec.numsections.unwrap_or(defaults.numsections);
            let ts = now_iso();
            conn.execute(
                "INSERT INTO courses
                   (category, fullname, shortname, idnumber, summary, summaryformat, format,
                    numsections, visible, lang, theme, enablecompletion, timecreated, timemodified)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
                params![
                    spec.categoryid,
                    spec.fullname,
                    spec.shortname,
                    spec.idnumber,
                    spec.summary.clone().unwrap_or_default(),
                    summaryformat,
                    fmt,
                    numsections,
                    visible as i64,
                    spec.lang.clone().unwrap_or_else(|| defaults.lang.clone()),
                    spec.theme.clone().unwrap_or_default(),
                    enablecompletion as i64,
                    ts
                ],
            )?;
            let id = conn.last_insert_rowid();

            ensure_sections(conn, id, numsections)?;

            // Format options are applied after creation: valid names depend
            // on the chosen format, and numsections feeds back into the
            // section layout.
            if !spec.courseformatoptions.is_empty() {
                format::set_options(conn, id, &fmt, &spec.courseformatoptions)?;
                if let Some(opt) = spec
                    .courseformatoptions
                    .iter()
                    .find(|o| o.name == "numsections")
                {
                    let n: i64 = opt.value.parse().unwrap_or(numsections);
                    conn.execute(
                        "UPDATE courses SET numsections = ?1 WHERE id = ?2",
                        params![n, id],
                    )?;
                    ensure_sections(conn, id, n)?;
                }
            }

            created.push(get_course(conn, id)?);
        }
        Ok(created)
    })
}

/// Fetch full course records; an empty id list means every course.
pub fn get_courses(
    store: &Store,
    actor: &Actor,
    ids: &[i64],
) -> Result<Vec<CourseRecord>, CatalogError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(&store.db_path(), &actor.name, "course.get", |conn| {
        if ids.is_empty() {
            let mut stmt = conn.prepare("SELECT id FROM courses ORDER BY id")?;
            let all: Vec<i64> = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<_, _>>()?;
            return all.iter().map(|id| get_course(conn, *id)).collect();
        }
        ids.iter().map(|id| get_course(conn, *id)).collect()
    })
}

/// The declarative field -> capability table behind [`update_courses`].
const FIELD_CAPABILITIES: &[(&str, &str)] = &[
    ("categoryid", CAP_COURSE_CHANGECATEGORY),
    ("fullname", CAP_COURSE_CHANGEFULLNAME),
    ("shortname", CAP_COURSE_CHANGESHORTNAME),
    ("idnumber", CAP_COURSE_CHANGEIDNUMBER),
    ("summary", CAP_COURSE_CHANGESUMMARY),
    ("visible", CAP_COURSE_VISIBILITY),
];

/// Batch update with per-field capability checks.
///
/// A forbidden field change is skipped and recorded as a warning keyed by
/// course id and field; the batch never aborts for permission problems. An
/// invalid summaryformat is likewise warned and skipped. Structural errors
/// (unknown course id, uniqueness collisions) still raise.
pub fn update_courses(
    store: &Store,
    gate: &dyn CapabilityGate,
    actor: &Actor,
    updates: &[CourseUpdate],
) -> Result<UpdateResult, CatalogError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(&store.db_path(), &actor.name, "course.update", |conn| {
        let mut warnings = Vec::new();
        for update in updates {
            let current = get_course(conn, update.id)?;
            let chain = context_chain(conn, &Context::Course(update.id))?;

            if !allowed_in_chain(gate, actor, &chain, CAP_COURSE_UPDATE) {
                warnings.push(warning(update.id, "base", CAP_COURSE_UPDATE));
                continue;
            }

            let mut staged = update.clone();
            for (field, capability) in FIELD_CAPABILITIES {
                if !field_changed(&current, &staged, field) {
                    continue;
                }
                if !allowed_in_chain(gate, actor, &chain, capability) {
                    warnings.push(warning(update.id, field, capability));
                    clear_field(&mut staged, field);
                }
            }

            if let Some(summaryformat) = staged.summaryformat {
                if !format::is_valid_summary_format(summaryformat) {
                    warnings.push(Warning {
                        item: update.id.to_string(),
                        warningcode: "invalidsummaryformat".to_string(),
                        message: format!(
                            "summary format {} is not recognized; field skipped",
                            summaryformat
                        ),
                    });
                    staged.summaryformat = None;
                }
            }

            if let Some(shortname) = &staged.shortname {
                ensure_unique_shortname(conn, shortname, Some(update.id))?;
            }
            if let Some(idnumber) = &staged.idnumber {
                ensure_unique_idnumber(conn, idnumber, Some(update.id))?;
            }
            if let Some(categoryid) = staged.categoryid {
                // Target category must exist before the assignment moves.
                category::get_category(conn, categoryid)?;
            }

            let ts = now_iso();
            conn.execute(
                "UPDATE courses SET
                    fullname = COALESCE(?1, fullname),
                    shortname = COALESCE(?2, shortname),
                    category = COALESCE(?3, category),
                    idnumber = COALESCE(?4, idnumber),
                    summary = COALESCE(?5, summary),
                    summaryformat = COALESCE(?6, summaryformat),
                    visible = COALESCE(?7, visible),
                    timemodified = ?8
                 WHERE id = ?9",
                params![
                    staged.fullname,
                    staged.shortname,
                    staged.categoryid,
                    staged.idnumber,
                    staged.summary,
                    staged.summaryformat,
                    staged.visible.map(|v| v as i64),
                    ts,
                    update.id
                ],
            )?;
        }
        Ok(UpdateResult { warnings })
    })
}

/// Delete courses with all their content. Admin actors may delete any
/// course; anyone else needs an enrolment in it.
pub fn delete_courses(
    store: &Store,
    actor: &Actor,
    registry: &PluginRegistry,
    ids: &[i64],
) -> Result<(), CatalogError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(&store.db_path(), &actor.name, "course.delete", |conn| {
        for id in ids {
            get_course(conn, *id)?;
            if !actor.admin && !is_enrolled(conn, *id, &actor.name)? {
                return Err(CatalogError::Access(format!(
                    "actor '{}' has no access to course {}",
                    actor.name, id
                )));
            }
            let tx = conn.transaction()?;
            purge_course(&tx, registry, *id)?;
            tx.commit()?;
        }
        Ok(())
    })
}

/// Delete course modules by course-module id.
///
/// Every id is resolved and authorized before anything is removed, and the
/// removals run in one transaction: the first failing item aborts the whole
/// batch with no module touched. (Deliberately stricter than the course
/// update's warn-and-skip contract.)
pub fn delete_modules(
    store: &Store,
    gate: &dyn CapabilityGate,
    actor: &Actor,
    registry: &PluginRegistry,
    cmids: &[i64],
) -> Result<(), CatalogError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(&store.db_path(), &actor.name, "module.delete", |conn| {
        let mut resolved = Vec::with_capacity(cmids.len());
        for cmid in cmids {
            let (course, modname, instance): (i64, String, i64) = conn
                .query_row(
                    "SELECT course, modname, instance FROM course_modules WHERE id = ?1",
                    [cmid],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?
                .ok_or_else(|| {
                    CatalogError::MissingRecord(format!("course module {}", cmid))
                })?;

            if !actor.admin && !is_enrolled(conn, course, &actor.name)? {
                return Err(CatalogError::Access(format!(
                    "actor '{}' has no access to course {}",
                    actor.name, course
                )));
            }
            // The capability lives in the module's own context, not the
            // course's.
            let chain = context_chain(conn, &Context::Module(*cmid))?;
            require_in_chain(gate, actor, &chain, CAP_COURSE_MANAGEACTIVITIES)?;

            resolved.push((*cmid, modname, instance));
        }

        let tx = conn.transaction()?;
        for (cmid, modname, instance) in &resolved {
            registry.get(modname)?.delete(&tx, *instance)?;
            tx.execute("DELETE FROM course_modules WHERE id = ?1", [cmid])?;
        }
        tx.commit()?;
        Ok(())
    })
}

/// Place a new activity module in a course section. This is the authoring/
/// provisioning path, not part of the remote surface; callers hold a
/// connection-level trust equivalent to the module plugins themselves.
pub fn add_module(
    store: &Store,
    actor: &Actor,
    registry: &PluginRegistry,
    course: i64,
    modname: &str,
    name: &str,
    intro: &str,
    section: i64,
    showdescription: bool,
) -> Result<i64, CatalogError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(&store.db_path(), &actor.name, "module.add", |conn| {
        get_course(conn, course)?;
        let sectionid = section_id(conn, course, section)?;
        let plugin = registry.get(modname)?;
        let instance = plugin.create(conn, course, name, intro)?;
        conn.execute(
            "INSERT INTO course_modules (course, section, modname, instance, visible, showdescription)
             VALUES (?1, ?2, ?3, ?4, 1, ?5)",
            params![course, sectionid, modname, instance, showdescription as i64],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Record an enrolment giving `actor_name` course access.
pub fn enrol(store: &Store, courseid: i64, actor_name: &str) -> Result<(), CatalogError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(&store.db_path(), actor_name, "course.enrol", |conn| {
        get_course(conn, courseid)?;
        conn.execute(
            "INSERT OR IGNORE INTO enrolments (courseid, actor) VALUES (?1, ?2)",
            params![courseid, actor_name],
        )?;
        Ok(())
    })
}

pub fn is_enrolled(
    conn: &Connection,
    courseid: i64,
    actor_name: &str,
) -> Result<bool, CatalogError> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT id FROM enrolments WHERE courseid = ?1 AND actor = ?2",
            params![courseid, actor_name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Remove a course and everything it owns: plugin instances first (through
/// their delete hooks), then the course row, whose child rows cascade.
pub fn purge_course(
    conn: &Connection,
    registry: &PluginRegistry,
    courseid: i64,
) -> Result<(), CatalogError> {
    let mut stmt =
        conn.prepare("SELECT modname, instance FROM course_modules WHERE course = ?1")?;
    let modules: Vec<(String, i64)> = stmt
        .query_map([courseid], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<_, _>>()?;
    for (modname, instance) in modules {
        registry.get(&modname)?.delete(conn, instance)?;
    }
    conn.execute("DELETE FROM courses WHERE id = ?1", [courseid])?;
    Ok(())
}

/// Ensure the general section 0 plus sections 1..=numsections exist.
pub fn ensure_sections(
    conn: &Connection,
    courseid: i64,
    numsections: i64,
) -> Result<(), CatalogError> {
    for section in 0..=numsections.max(0) {
        conn.execute(
            "INSERT OR IGNORE INTO course_sections (course, section) VALUES (?1, ?2)",
            params![courseid, section],
        )?;
    }
    Ok(())
}

/// Section row id for a (course, position index) pair.
pub fn section_id(conn: &Connection, courseid: i64, section: i64) -> Result<i64, CatalogError> {
    conn.query_row(
        "SELECT id FROM course_sections WHERE course = ?1 AND section = ?2",
        params![courseid, section],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| {
        CatalogError::MissingRecord(format!("section {} of course {}", section, courseid))
    })
}

pub fn get_course(conn: &Connection, id: i64) -> Result<CourseRecord, CatalogError> {
    let record = conn
        .query_row(
            "SELECT id, category, fullname, shortname, idnumber, summary, summaryformat,
                    format, numsections, visible, lang, theme, enablecompletion,
                    timecreated, timemodified
               FROM courses WHERE id = ?1",
            [id],
            |row| {
                Ok(CourseRecord {
                    id: row.get(0)?,
                    categoryid: row.get(1)?,
                    fullname: row.get(2)?,
                    shortname: row.get(3)?,
                    idnumber: row.get(4)?,
                    summary: row.get(5)?,
                    summaryformat: row.get(6)?,
                    format: row.get(7)?,
                    numsections: row.get(8)?,
                    visible: row.get::<_, i64>(9)? != 0,
                    lang: row.get(10)?,
                    theme: row.get(11)?,
                    enablecompletion: row.get::<_, i64>(12)? != 0,
                    courseformatoptions: Vec::new(),
                    timecreated: row.get(13)?,
                    timemodified: row.get(14)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| CatalogError::MissingRecord(format!("course {}", id)))?;

    let options = format::get_options(conn, record.id, &record.format)?;
    Ok(CourseRecord {
        courseformatoptions: options,
        ..record
    })
}

fn warning(id: i64, field: &str, capability: &str) -> Warning {
    Warning {
        item: id.to_string(),
        warningcode: "nopermissions".to_string(),
        message: format!(
            "field '{}' skipped: missing capability '{}'",
            field, capability
        ),
    }
}

fn field_changed(current: &CourseRecord, staged: &CourseUpdate, field: &str) -> bool {
    match field {
        "categoryid" => staged.categoryid.is_some_and(|v| v != current.categoryid),
        "fullname" => staged
            .fullname
            .as_ref()
            .is_some_and(|v| *v != current.fullname),
        "shortname" => staged
            .shortname
            .as_ref()
            .is_some_and(|v| *v != current.shortname),
        "idnumber" => staged
            .idnumber
            .as_ref()
            .is_some_and(|v| Some(v) != current.idnumber.as_ref()),
        "summary" => staged
            .summary
            .as_ref()
            .is_some_and(|v| *v != current.summary),
        "visible" => staged.visible.is_some_and(|v| v != current.visible),
        _ => false,
    }
}

fn clear_field(staged: &mut CourseUpdate, field: &str) {
    match field {
        "categoryid" => staged.categoryid = None,
        "fullname" => staged.fullname = None,
        "shortname" => staged.shortname = None,
        "idnumber" => staged.idnumber = None,
        "summary" => staged.summary = None,
        "visible" => staged.visible = None,
        _ => {}
    }
}

fn ensure_unique_shortname(
    conn: &Connection,
    shortname: &str,
    exclude: Option<i64>,
) -> Result<(), CatalogError> {
    let clash: Option<i64> = conn
        .query_row(
            "SELECT id FROM courses WHERE shortname = ?1 AND id != ?2",
            params![shortname, exclude.unwrap_or(0)],
            |row| row.get(0),
        )
        .optional()?;
    if clash.is_some() {
        return Err(CatalogError::Uniqueness(format!(
            "course shortname '{}' already exists",
            shortname
        )));
    }
    Ok(())
}

fn ensure_unique_idnumber(
    conn: &Connection,
    idnumber: &str,
    exclude: Option<i64>,
) -> Result<(), CatalogError> {
    let clash: Option<i64> = conn
        .query_row(
            "SELECT id FROM courses WHERE idnumber = ?1 AND id != ?2",
            params![idnumber, exclude.unwrap_or(0)],
            |row| row.get(0),
        )
        .optional()?;
    if clash.is_some() {
        return Err(CatalogError::Uniqueness(format!(
            "course idnumber '{}' already exists",
            idnumber
        )));
    }
    Ok(())
}
