//! Capability gate: (actor, context, capability) -> allow/deny.
//!
//! The permission store itself is an external collaborator; the core only
//! consumes it through [`CapabilityGate`]. Contexts are hierarchical
//! (module -> course -> category path -> system) and a grant at an ancestor
//! context applies below it, so checks walk the resolved context chain.

use crate::core::error::CatalogError;
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashSet;
use std::fmt;

pub const CAP_CATEGORY_MANAGE: &str = "category:manage";
pub const CAP_COURSE_CREATE: &str = "course:create";
pub const CAP_COURSE_VIEW: &str = "course:view";
pub const CAP_COURSE_UPDATE: &str = "course:update";
pub const CAP_COURSE_CHANGECATEGORY: &str = "course:changecategory";
pub const CAP_COURSE_CHANGEFULLNAME: &str = "course:changefullname";
pub const CAP_COURSE_CHANGESHORTNAME: &str = "course:changeshortname";
pub const CAP_COURSE_CHANGEIDNUMBER: &str = "course:changeidnumber";
pub const CAP_COURSE_CHANGESUMMARY: &str = "course:changesummary";
pub const CAP_COURSE_VISIBILITY: &str = "course:visibility";
pub const CAP_COURSE_MANAGEACTIVITIES: &str = "course:manageactivities";
pub const CAP_BACKUP_COURSE: &str = "backup:backupcourse";
pub const CAP_RESTORE_COURSE: &str = "restore:restorecourse";
pub const CAP_BACKUP_USERINFO: &str = "backup:userinfo";
pub const CAP_RESTORE_USERINFO: &str = "restore:userinfo";

/// A hierarchical permission context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Context {
    System,
    Category(i64),
    Course(i64),
    Module(i64),
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Context::System => write!(f, "system context"),
            Context::Category(id) => write!(f, "category context {}", id),
            Context::Course(id) => write!(f, "course context {}", id),
            Context::Module(id) => write!(f, "module context {}", id),
        }
    }
}

/// The calling identity. Admin actors bypass login/enrolment access checks
/// where the operation contract says so; they do not bypass validation.
#[derive(Debug, Clone)]
pub struct Actor {
    pub name: String,
    pub admin: bool,
}

impl Actor {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            admin: false,
        }
    }

    pub fn admin(name: &str) -> Self {
        Self {
            name: name.to_string(),
            admin: true,
        }
    }
}

/// Boolean permission oracle consulted before every mutating operation.
pub trait CapabilityGate {
    fn has(&self, actor: &Actor, context: &Context, capability: &str) -> bool;
}

/// Allows everything. Used by the CLI surface, which runs as the local admin.
pub struct OpenGate;

impl CapabilityGate for OpenGate {
    fn has(&self, _actor: &Actor, _context: &Context, _capability: &str) -> bool {
        true
    }
}

/// Explicit grant table: (actor, context, capability) triples.
#[derive(Default)]
pub struct RoleTable {
    grants: HashSet<(String, Context, String)>,
}

impl RoleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&mut self, actor: &str, context: Context, capability: &str) {
        self.grants
            .insert((actor.to_string(), context, capability.to_string()));
    }

    pub fn revoke(&mut self, actor: &str, context: &Context, capability: &str) {
        self.grants.remove(&(
            actor.to_string(),
            context.clone(),
            capability.to_string(),
        ));
    }
}

impl CapabilityGate for RoleTable {
    fn has(&self, actor: &Actor, context: &Context, capability: &str) -> bool {
        self.grants.contains(&(
            actor.name.clone(),
            context.clone(),
            capability.to_string(),
        ))
    }
}

/// Resolve the ancestor chain of a context, innermost first, ending at
/// [`Context::System`]. Category ancestry comes from the stored path.
pub fn context_chain(conn: &Connection, ctx: &Context) -> Result<Vec<Context>, CatalogError> {
    let mut chain = Vec::new();
    match ctx {
        Context::System => {}
        Context::Category(id) => {
            chain.extend(category_chain(conn, *id)?);
        }
        Context::Course(id) => {
            chain.push(Context::Course(*id));
            let category: Option<i64> = conn
                .query_row("SELECT category FROM courses WHERE id = ?1", [id], |row| {
                    row.get(0)
                })
                .optional()?;
            let category = category
                .ok_or_else(|| CatalogError::MissingRecord(format!("course {}", id)))?;
            chain.extend(category_chain(conn, category)?);
        }
        Context::Module(cmid) => {
            chain.push(Context::Module(*cmid));
            let course: Option<i64> = conn
                .query_row(
                    "SELECT course FROM course_modules WHERE id = ?1",
                    [cmid],
                    |row| row.get(0),
                )
                .optional()?;
            let course = course
                .ok_or_else(|| CatalogError::MissingRecord(format!("course module {}", cmid)))?;
            chain.extend(context_chain(conn, &Context::Course(course))?);
            return Ok(chain);
        }
    }
    chain.push(Context::System);
    Ok(chain)
}

fn category_chain(conn: &Connection, id: i64) -> Result<Vec<Context>, CatalogError> {
    let path: Option<String> = conn
        .query_row("SELECT path FROM categories WHERE id = ?1", [id], |row| {
            row.get(0)
        })
        .optional()?;
    let path =
        path.ok_or_else(|| CatalogError::MissingRecord(format!("category {}", id)))?;
    let mut ids: Vec<i64> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();
    ids.reverse();
    Ok(ids.into_iter().map(Context::Category).collect())
}

/// Check a capability along a resolved context chain; a grant at any level
/// allows. Denial yields a [`CatalogError::Permission`] naming the missing
/// capability and the innermost context checked.
pub fn require_in_chain(
    gate: &dyn CapabilityGate,
    actor: &Actor,
    chain: &[Context],
    capability: &str,
) -> Result<(), CatalogError> {
    if chain.iter().any(|ctx| gate.has(actor, ctx, capability)) {
        return Ok(());
    }
    let innermost = chain.first().cloned().unwrap_or(Context::System);
    Err(CatalogError::Permission {
        capability: capability.to_string(),
        context: innermost.to_string(),
    })
}

/// Non-raising form of [`require_in_chain`] for the warn-and-skip paths.
pub fn allowed_in_chain(
    gate: &dyn CapabilityGate,
    actor: &Actor,
    chain: &[Context],
    capability: &str,
) -> bool {
    chain.iter().any(|ctx| gate.has(actor, ctx, capability))
}
