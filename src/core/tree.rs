//! Tree store: the persistent category forest.
//!
//! This module exclusively owns the two structural invariants of the
//! catalog hierarchy:
//!
//! - `path` is always the parent's path plus "/" plus the node's own id;
//!   roots carry "/" plus their id.
//! - `sortorder` is a dense global total order over the whole forest,
//!   consistent with a depth-first traversal in which a new sibling lands
//!   after the existing siblings of the same parent.
//!
//! Callers hand in a connection that is already inside a transaction when
//! the mutation spans multiple steps (move, delete); every function leaves
//! both invariants restored before returning.

use crate::core::course;
use crate::core::error::CatalogError;
use crate::core::modplugin::PluginRegistry;
use crate::core::time::now_iso;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;

/// Root sentinel: a category with `parent == 0` is a forest root.
pub const ROOT: i64 = 0;

/// Attributes for a new category node.
#[derive(Debug, Clone, Default)]
pub struct CategoryAttrs {
    pub name: String,
    pub idnumber: Option<String>,
    pub description: String,
    pub descriptionformat: i64,
    pub visible: bool,
    pub theme: String,
}

impl CategoryAttrs {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            descriptionformat: 1,
            visible: true,
            ..Default::default()
        }
    }
}

/// Insert a category under `parent` (or as a root for [`ROOT`]), placing it
/// after the parent's existing children in the global order.
pub fn insert_category(
    conn: &Connection,
    parent: i64,
    attrs: &CategoryAttrs,
) -> Result<i64, CatalogError> {
    let parent_path = if parent == ROOT {
        String::new()
    } else {
        node_path(conn, parent)?
    };

    if let Some(idnumber) = &attrs.idnumber {
        let clash: Option<i64> = conn
            .query_row(
                "SELECT id FROM categories WHERE idnumber = ?1",
                [idnumber],
                |row| row.get(0),
            )
            .optional()?;
        if clash.is_some() {
            return Err(CatalogError::Uniqueness(format!(
                "category idnumber '{}' already exists",
                idnumber
            )));
        }
    }

    let ts = now_iso();
    // Provisional sortorder past the end of the forest; the renumber pass
    // below settles it into the depth-first position.
    let next: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sortorder), 0) + 1 FROM categories",
        [],
        |row| row.get(0),
    )?;
    conn.execute(
        "INSERT INTO categories
           (name, idnumber, description, descriptionformat, parent, path, sortorder,
            visible, visibleold, theme, timecreated, timemodified)
         VALUES (?1, ?2, ?3, ?4, ?5, '', ?6, ?7, ?7, ?8, ?9, ?9)",
        params![
            attrs.name,
            attrs.idnumber,
            attrs.description,
            attrs.descriptionformat,
            parent,
            next,
            attrs.visible as i64,
            attrs.theme,
            ts
        ],
    )?;
    let id = conn.last_insert_rowid();

    let path = format!("{}/{}", parent_path, id);
    conn.execute(
        "UPDATE categories SET path = ?1 WHERE id = ?2",
        params![path, id],
    )?;

    renumber_forest(conn)?;
    Ok(id)
}

/// Move `node` (and its whole subtree) under `new_parent`, rewriting every
/// descendant path and renumbering so the node lands after the new parent's
/// last existing child.
pub fn move_subtree(conn: &Connection, node: i64, new_parent: i64) -> Result<(), CatalogError> {
    let old_path = node_path(conn, node)?;

    let new_parent_path = if new_parent == ROOT {
        String::new()
    } else {
        let p = node_path(conn, new_parent)?;
        if new_parent == node || p.starts_with(&format!("{}/", old_path)) {
            return Err(CatalogError::Cycle(format!(
                "category {} cannot become a child of {}",
                node, new_parent
            )));
        }
        p
    };

    let new_path = format!("{}/{}", new_parent_path, node);
    let ts = now_iso();

    conn.execute(
        "UPDATE categories SET parent = ?1, path = ?2, timemodified = ?3 WHERE id = ?4",
        params![new_parent, new_path, ts, node],
    )?;
    // Descendants keep their suffix; only the prefix changes.
    conn.execute(
        "UPDATE categories
            SET path = ?1 || SUBSTR(path, ?2)
          WHERE path LIKE ?3",
        params![
            new_path,
            old_path.len() as i64 + 1,
            format!("{}/%", old_path)
        ],
    )?;

    // Push the moved node past the end so the depth-first renumber places it
    // after the new parent's existing children.
    let next: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sortorder), 0) + 1 FROM categories",
        [],
        |row| row.get(0),
    )?;
    conn.execute(
        "UPDATE categories SET sortorder = ?1 WHERE id = ?2",
        params![next, node],
    )?;

    renumber_forest(conn)
}

/// Delete a category node.
///
/// Recursive: removes the node, every descendant category, and every course
/// they own (including section/module/plugin content). Non-recursive:
/// rejected with `NotEmpty` while the node still owns courses; otherwise the
/// direct children are reparented to the node's former parent first.
pub fn delete_subtree(
    conn: &Connection,
    registry: &PluginRegistry,
    node: i64,
    recursive: bool,
) -> Result<(), CatalogError> {
    let (path, parent): (String, i64) = conn
        .query_row(
            "SELECT path, parent FROM categories WHERE id = ?1",
            [node],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?
        .ok_or_else(|| CatalogError::MissingRecord(format!("category {}", node)))?;

    if recursive {
        let subtree = subtree_ids(conn, node, &path)?;
        for catid in &subtree {
            let mut stmt = conn.prepare("SELECT id FROM courses WHERE category = ?1")?;
            let courses: Vec<i64> = stmt
                .query_map([catid], |row| row.get(0))?
                .collect::<Result<_, _>>()?;
            for courseid in courses {
                course::purge_course(conn, registry, courseid)?;
            }
        }
        for catid in subtree.iter().rev() {
            conn.execute("DELETE FROM categories WHERE id = ?1", [catid])?;
        }
    } else {
        let owned: i64 = conn.query_row(
            "SELECT COUNT(*) FROM courses WHERE category = ?1",
            [node],
            |row| row.get(0),
        )?;
        if owned > 0 {
            return Err(CatalogError::NotEmpty(format!(
                "category {} still owns {} course(s); delete recursively or relocate them first",
                node, owned
            )));
        }

        let mut stmt = conn.prepare("SELECT id FROM categories WHERE parent = ?1 ORDER BY sortorder")?;
        let children: Vec<i64> = stmt
            .query_map([node], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        for child in children {
            move_subtree(conn, child, parent)?;
        }
        conn.execute("DELETE FROM categories WHERE id = ?1", [node])?;
    }

    renumber_forest(conn)
}

/// Recompute contiguous sortorder for the direct children of `parent_id`,
/// preserving their relative order. The lowest existing child sortorder is
/// kept as the base of the run.
pub fn renumber_range(conn: &Connection, parent_id: i64) -> Result<(), CatalogError> {
    let mut stmt =
        conn.prepare("SELECT id, sortorder FROM categories WHERE parent = ?1 ORDER BY sortorder, id")?;
    let children: Vec<(i64, i64)> = stmt
        .query_map([parent_id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<_, _>>()?;
    let Some(base) = children.iter().map(|(_, so)| *so).min() else {
        return Ok(());
    };
    for (i, (id, current)) in children.iter().enumerate() {
        let wanted = base + i as i64;
        if *current != wanted {
            conn.execute(
                "UPDATE categories SET sortorder = ?1 WHERE id = ?2",
                params![wanted, id],
            )?;
        }
    }
    Ok(())
}

/// Reassign a dense depth-first numbering over the whole forest. Sibling
/// order is the current sortorder (creation order unless explicitly moved),
/// with id as the tie-break.
pub fn renumber_forest(conn: &Connection) -> Result<(), CatalogError> {
    let mut stmt = conn.prepare("SELECT id, parent, sortorder FROM categories")?;
    let rows: Vec<(i64, i64, i64)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<Result<_, _>>()?;

    let mut children: HashMap<i64, Vec<(i64, i64)>> = HashMap::new();
    for (id, parent, sortorder) in &rows {
        children.entry(*parent).or_default().push((*sortorder, *id));
    }
    for list in children.values_mut() {
        list.sort();
    }

    let mut order = Vec::with_capacity(rows.len());
    let mut stack: Vec<i64> = children
        .get(&ROOT)
        .map(|roots| roots.iter().rev().map(|(_, id)| *id).collect())
        .unwrap_or_default();
    while let Some(id) = stack.pop() {
        order.push(id);
        if let Some(kids) = children.get(&id) {
            stack.extend(kids.iter().rev().map(|(_, id)| *id));
        }
    }

    let current: HashMap<i64, i64> = rows.iter().map(|(id, _, so)| (*id, *so)).collect();
    for (i, id) in order.iter().enumerate() {
        let wanted = i as i64 + 1;
        if current.get(id) != Some(&wanted) {
            conn.execute(
                "UPDATE categories SET sortorder = ?1 WHERE id = ?2",
                params![wanted, id],
            )?;
        }
    }
    Ok(())
}

/// Materialized path of a category, or `MissingRecord`.
pub fn node_path(conn: &Connection, id: i64) -> Result<String, CatalogError> {
    conn.query_row("SELECT path FROM categories WHERE id = ?1", [id], |row| {
        row.get(0)
    })
    .optional()?
    .ok_or_else(|| CatalogError::MissingRecord(format!("category {}", id)))
}

/// The node plus every descendant, in depth-first (sortorder) order.
pub fn subtree_ids(conn: &Connection, id: i64, path: &str) -> Result<Vec<i64>, CatalogError> {
    let mut stmt = conn.prepare(
        "SELECT id FROM categories WHERE id = ?1 OR path LIKE ?2 ORDER BY sortorder",
    )?;
    let ids = stmt
        .query_map(params![id, format!("{}/%", path)], |row| row.get(0))?
        .collect::<Result<_, _>>()?;
    Ok(ids)
}
