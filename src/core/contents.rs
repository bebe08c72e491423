//! Course contents aggregation: a section-ordered view of a course's
//! activity modules, with option-driven filtering and sanitized
//! descriptions.

use crate::core::broker::DbBroker;
use crate::core::capability::{
    context_chain, require_in_chain, Actor, CapabilityGate, Context, CAP_COURSE_VIEW,
};
use crate::core::course;
use crate::core::error::CatalogError;
use crate::core::modplugin::PluginRegistry;
use crate::core::store::Store;
use regex::Regex;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Name/value option as supplied by callers of the contents operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentsOption {
    pub name: String,
    pub value: String,
}

impl ContentsOption {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

/// Parsed filter state. Unknown option names are rejected up front rather
/// than silently ignored.
#[derive(Debug, Clone, Default)]
pub struct ContentsFilter {
    pub excludemodules: bool,
    pub sectionnumber: Option<i64>,
}

impl ContentsFilter {
    pub fn parse(options: &[ContentsOption]) -> Result<Self, CatalogError> {
        let mut filter = ContentsFilter::default();
        for option in options {
            match option.name.as_str() {
                "excludemodules" => {
                    filter.excludemodules = option.value == "1" || option.value == "true";
                }
                "sectionnumber" => {
                    let n: i64 = option.value.parse().map_err(|_| {
                        CatalogError::Validation(format!(
                            "sectionnumber '{}' is not a number",
                            option.value
                        ))
                    })?;
                    filter.sectionnumber = Some(n);
                }
                other => {
                    return Err(CatalogError::Validation(format!(
                        "unknown contents option '{}'",
                        other
                    )))
                }
            }
        }
        Ok(filter)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleSummary {
    pub id: i64,
    pub name: String,
    pub modname: String,
    pub instance: i64,
    pub visible: bool,
    pub showdescription: bool,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionContents {
    pub id: i64,
    pub section: i64,
    pub name: String,
    pub summary: String,
    pub visible: bool,
    pub modules: Vec<ModuleSummary>,
}

/// Sections of a course in position order, each carrying its modules in
/// placement order. Requires `course:view` somewhere in the course's
/// context chain.
pub fn get_course_contents(
    store: &Store,
    gate: &dyn CapabilityGate,
    actor: &Actor,
    registry: &PluginRegistry,
    courseid: i64,
    options: &[ContentsOption],
) -> Result<Vec<SectionContents>, CatalogError> {
    let filter = ContentsFilter::parse(options)?;
    let broker = DbBroker::new(&store.root);
    broker.with_conn(&store.db_path(), &actor.name, "course.contents", |conn| {
        course::get_course(conn, courseid)?;
        let chain = context_chain(conn, &Context::Course(courseid))?;
        require_in_chain(gate, actor, &chain, CAP_COURSE_VIEW)?;

        let mut stmt = conn.prepare(
            "SELECT id, section, name, summary, visible
               FROM course_sections WHERE course = ?1 ORDER BY section",
        )?;
        let sections: Vec<SectionContents> = stmt
            .query_map([courseid], |row| {
                Ok(SectionContents {
                    id: row.get(0)?,
                    section: row.get(1)?,
                    name: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    summary: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    visible: row.get::<_, i64>(4)? != 0,
                    modules: Vec::new(),
                })
            })?
            .collect::<Result<_, _>>()?;

        let mut out = Vec::new();
        for mut section in sections {
            if let Some(wanted) = filter.sectionnumber {
                if section.section != wanted {
                    continue;
                }
            }
            if !filter.excludemodules {
                section.modules = section_modules(conn, registry, section.id)?;
            }
            out.push(section);
        }
        Ok(out)
    })
}

fn section_modules(
    conn: &Connection,
    registry: &PluginRegistry,
    sectionid: i64,
) -> Result<Vec<ModuleSummary>, CatalogError> {
    let mut stmt = conn.prepare(
        "SELECT id, modname, instance, visible, showdescription
           FROM course_modules WHERE section = ?1 ORDER BY id",
    )?;
    let rows: Vec<(i64, String, i64, bool, bool)> = stmt
        .query_map([sectionid], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get::<_, i64>(3)? != 0,
                row.get::<_, i64>(4)? != 0,
            ))
        })?
        .collect::<Result<_, _>>()?;

    let mut modules = Vec::with_capacity(rows.len());
    for (id, modname, instance, visible, showdescription) in rows {
        let (name, intro) = registry.get(&modname)?.describe(conn, instance)?;
        // The intro is only surfaced when the module opted in, and always
        // passes through the sanitizer on the way out.
        let description = if showdescription {
            sanitize_html(&intro)
        } else {
            String::new()
        };
        modules.push(ModuleSummary {
            id,
            name,
            modname,
            instance,
            visible,
            showdescription,
            description,
        });
    }
    Ok(modules)
}

/// Strip executable content from stored HTML. Text is returned otherwise
/// unchanged, with no paragraph wrapping or entity rewriting.
pub fn sanitize_html(input: &str) -> String {
    static SCRIPT: OnceLock<Regex> = OnceLock::new();
    let re = SCRIPT.get_or_init(|| {
        Regex::new(r"(?is)<script\b[^>]*>.*?</script>").expect("static pattern")
    });
    re.replace_all(input, "").into_owned()
}
