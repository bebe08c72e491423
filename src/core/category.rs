//! Category manager: batch create/read/update/delete over the category
//! forest, with per-item capability checks. Structural mutation is delegated
//! to the tree store; this layer owns the call contracts (batch semantics,
//! filters, visibility cascade).

use crate::core::broker::DbBroker;
use crate::core::capability::{
    context_chain, require_in_chain, Actor, CapabilityGate, Context, CAP_CATEGORY_MANAGE,
};
use crate::core::error::CatalogError;
use crate::core::modplugin::PluginRegistry;
use crate::core::store::Store;
use crate::core::time::now_iso;
use crate::core::tree::{self, CategoryAttrs};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySpec {
    pub name: String,
    /// Parent category id; 0 creates a forest root.
    #[serde(default)]
    pub parent: i64,
    #[serde(default)]
    pub idnumber: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub descriptionformat: Option<i64>,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub visible: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub id: i64,
    pub name: String,
    pub idnumber: Option<String>,
    pub description: String,
    pub descriptionformat: i64,
    pub parent: i64,
    pub path: String,
    pub sortorder: i64,
    pub visible: bool,
    pub theme: String,
    pub timecreated: String,
    pub timemodified: String,
}

/// Partial update; absent fields are left alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryUpdate {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub idnumber: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub descriptionformat: Option<i64>,
    #[serde(default)]
    pub parent: Option<i64>,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub visible: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryDelete {
    pub id: i64,
    #[serde(default)]
    pub recursive: bool,
}

/// One AND-ed filter constraint for [`get_categories`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Criterion {
    pub key: String,
    pub value: String,
}

impl Criterion {
    pub fn new(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

/// Create categories in input order. The capability is checked per item in
/// the target parent's context before any insert for that item; the call
/// raises on the first unauthorized item and earlier inserts in the same
/// call stay committed. A later spec may name an earlier spec's fresh id as
/// its parent.
pub fn create_categories(
    store: &Store,
    gate: &dyn CapabilityGate,
    actor: &Actor,
    specs: &[CategorySpec],
) -> Result<Vec<CategoryRecord>, CatalogError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(&store.db_path(), &actor.name, "category.create", |conn| {
        let mut created = Vec::with_capacity(specs.len());
        for spec in specs {
            let chain = if spec.parent == tree::ROOT {
                vec![Context::System]
            } else {
                context_chain(conn, &Context::Category(spec.parent))?
            };
            require_in_chain(gate, actor, &chain, CAP_CATEGORY_MANAGE)?;

            if spec.name.trim().is_empty() {
                return Err(CatalogError::Validation(
                    "category name must not be empty".to_string(),
                ));
            }

            let attrs = CategoryAttrs {
                name: spec.name.clone(),
                idnumber: spec.idnumber.clone(),
                description: spec.description.clone().unwrap_or_default(),
                descriptionformat: spec.descriptionformat.unwrap_or(1),
                visible: spec.visible.unwrap_or(true),
                theme: spec.theme.clone().unwrap_or_default(),
            };
            let id = tree::insert_category(conn, spec.parent, &attrs)?;
            created.push(get_category(conn, id)?);
        }
        Ok(created)
    })
}

/// Filter categories by AND-ed criteria. Permitted keys: id, idnumber,
/// name, parent, visible. Searching by idnumber or name can expose
/// non-visible categories and therefore needs `category:manage`.
pub fn get_categories(
    store: &Store,
    gate: &dyn CapabilityGate,
    actor: &Actor,
    criteria: &[Criterion],
    include_subcategories: bool,
) -> Result<Vec<CategoryRecord>, CatalogError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(&store.db_path(), &actor.name, "category.get", |conn| {
        let mut selectors: Vec<(&str, &str)> = Vec::new();
        let mut visible_filter: Option<bool> = None;
        for criterion in criteria {
            match criterion.key.as_str() {
                "id" | "idnumber" | "name" | "parent" => {
                    selectors.push((criterion.key.as_str(), criterion.value.as_str()));
                }
                "visible" => {
                    visible_filter = Some(criterion.value != "0");
                }
                other => {
                    return Err(CatalogError::Validation(format!(
                        "unsupported search criterion '{}'",
                        other
                    )));
                }
            }
        }

        if selectors
            .iter()
            .any(|(key, _)| *key == "idnumber" || *key == "name")
        {
            require_in_chain(gate, actor, &[Context::System], CAP_CATEGORY_MANAGE)?;
        }

        let mut sql = String::from("SELECT id FROM categories WHERE 1=1");
        let mut args: Vec<String> = Vec::new();
        for (key, value) in &selectors {
            match *key {
                "id" => sql.push_str(" AND id = ?"),
                "idnumber" => sql.push_str(" AND idnumber = ?"),
                "name" => sql.push_str(" AND name = ?"),
                "parent" => sql.push_str(" AND parent = ?"),
                _ => unreachable!(),
            }
            args.push((*value).to_string());
        }
        if let Some(visible) = visible_filter {
            sql.push_str(" AND visible = ?");
            args.push(if visible { "1" } else { "0" }.to_string());
        }
        sql.push_str(" ORDER BY sortorder");

        let mut stmt = conn.prepare(&sql)?;
        let matched: Vec<i64> = stmt
            .query_map(rusqlite::params_from_iter(args.iter()), |row| row.get(0))?
            .collect::<Result<_, _>>()?;

        let mut ids = matched.clone();
        if include_subcategories {
            for id in matched {
                let path = tree::node_path(conn, id)?;
                for descendant in tree::subtree_ids(conn, id, &path)? {
                    if descendant == id {
                        continue;
                    }
                    let record = get_category(conn, descendant)?;
                    if let Some(visible) = visible_filter {
                        if record.visible != visible {
                            continue;
                        }
                    }
                    ids.push(descendant);
                }
            }
        }

        ids.sort_unstable();
        ids.dedup();
        let mut out: Vec<CategoryRecord> = ids
            .into_iter()
            .map(|id| get_category(conn, id))
            .collect::<Result<_, _>>()?;
        out.sort_by_key(|record| record.sortorder);
        Ok(out)
    })
}

/// Apply partial updates per item; a parent change moves the whole subtree.
/// Raises on the first failing item; earlier items stay applied.
pub fn update_categories(
    store: &Store,
    gate: &dyn CapabilityGate,
    actor: &Actor,
    updates: &[CategoryUpdate],
) -> Result<(), CatalogError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(&store.db_path(), &actor.name, "category.update", |conn| {
        for update in updates {
            let current = get_category(conn, update.id)?;
            let chain = context_chain(conn, &Context::Category(update.id))?;
            require_in_chain(gate, actor, &chain, CAP_CATEGORY_MANAGE)?;

            if let Some(idnumber) = &update.idnumber {
                let clash: Option<i64> = conn
                    .query_row(
                        "SELECT id FROM categories WHERE idnumber = ?1 AND id != ?2",
                        params![idnumber, update.id],
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
            conn.execute(
                "UPDATE categories SET
                    name = COALESCE(?1, name),
                    idnumber = COALESCE(?2, idnumber),
                    description = COALESCE(?3, description),
                    descriptionformat = COALESCE(?4, descriptionformat),
                    theme = COALESCE(?5, theme),
                    timemodified = ?6
                 WHERE id = ?7",
                params![
                    update.name,
                    update.idnumber,
                    update.description,
                    update.descriptionformat,
                    update.theme,
                    ts,
                    update.id
                ],
            )?;

            if let Some(new_parent) = update.parent {
                if new_parent != current.parent {
                    let tx = conn.transaction()?;
                    tree::move_subtree(&tx, update.id, new_parent)?;
                    tx.commit()?;
                }
            }

            if let Some(visible) = update.visible {
                if visible != current.visible {
                    let tx = conn.transaction()?;
                    set_visibility(&tx, update.id, visible)?;
                    tx.commit()?;
                }
            }
        }
        Ok(())
    })
}

/// Delete categories per item, checking the capability before each mutation.
pub fn delete_categories(
    store: &Store,
    gate: &dyn CapabilityGate,
    actor: &Actor,
    registry: &PluginRegistry,
    deletes: &[CategoryDelete],
) -> Result<(), CatalogError> {
    let broker = DbBroker::new(&store.root);
    broker.with_conn(&store.db_path(), &actor.name, "category.delete", |conn| {
        for delete in deletes {
            let chain = context_chain(conn, &Context::Category(delete.id))?;
            require_in_chain(gate, actor, &chain, CAP_CATEGORY_MANAGE)?;

            let tx = conn.transaction()?;
            tree::delete_subtree(&tx, registry, delete.id, delete.recursive)?;
            tx.commit()?;
        }
        Ok(())
    })
}

/// Hide or show a category, cascading to descendants and owned courses.
/// Hiding remembers each descendant's prior visibility in `visibleold`;
/// showing restores only descendants that were visible before the hide.
pub fn set_visibility(conn: &Connection, id: i64, visible: bool) -> Result<(), CatalogError> {
    let path = tree::node_path(conn, id)?;
    let ts = now_iso();

    conn.execute(
        "UPDATE categories SET visible = ?1, visibleold = ?1, timemodified = ?2 WHERE id = ?3",
        params![visible as i64, ts, id],
    )?;

    if visible {
        conn.execute(
            "UPDATE categories SET visible = visibleold, timemodified = ?1 WHERE path LIKE ?2",
            params![ts, format!("{}/%", path)],
        )?;
        conn.execute(
            "UPDATE courses SET visible = 1, timemodified = ?1
             WHERE category IN (SELECT id FROM categories WHERE (id = ?2 OR path LIKE ?3) AND visible = 1)",
            params![ts, id, format!("{}/%", path)],
        )?;
    } else {
        conn.execute(
            "UPDATE categories SET visibleold = visible, visible = 0, timemodified = ?1
             WHERE path LIKE ?2",
            params![ts, format!("{}/%", path)],
        )?;
        conn.execute(
            "UPDATE courses SET visible = 0, timemodified = ?1
             WHERE category IN (SELECT id FROM categories WHERE id = ?2 OR path LIKE ?3)",
            params![ts, id, format!("{}/%", path)],
        )?;
    }
    Ok(())
}

pub fn get_category(conn: &Connection, id: i64) -> Result<CategoryRecord, CatalogError> {
    conn.query_row(
        "SELECT id, name, idnumber, description, descriptionformat, parent, path,
                sortorder, visible, theme, timecreated, timemodified
           FROM categories WHERE id = ?1",
        [id],
        |row| {
            Ok(CategoryRecord {
                id: row.get(0)?,
                name: row.get(1)?,
                idnumber: row.get(2)?,
                description: row.get(3)?,
                descriptionformat: row.get(4)?,
                parent: row.get(5)?,
                path: row.get(6)?,
                sortorder: row.get(7)?,
                visible: row.get::<_, i64>(8)? != 0,
                theme: row.get(9)?,
                timecreated: row.get(10)?,
                timemodified: row.get(11)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| CatalogError::MissingRecord(format!("category {}", id)))
}
