//! The remote-facing surface. Each external function validates input,
//! delegates to a manager, and cleans its return value against a declared
//! output schema before anything leaves the process: undeclared fields are
//! stripped, leaf values are coerced to the declared type, and a missing
//! required field is an internal contract violation.

use crate::core::capability::{Actor, CapabilityGate};
use crate::core::category::{self, Criterion};
use crate::core::contents::{self, ContentsOption};
use crate::core::course::{self, CourseUpdate};
use crate::core::error::CatalogError;
use crate::core::import::{self, DuplicateOptions, ImportOptions};
use crate::core::modplugin::PluginRegistry;
use crate::core::store::Store;
use serde_json::{json, Map, Value};

/// Declarative output schema, mirroring the shape of the value it cleans.
#[derive(Debug, Clone)]
pub enum Schema {
    Int,
    Text,
    Bool,
    List(Box<Schema>),
    Structure(Vec<Field>),
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: &'static str,
    pub schema: Schema,
    pub required: bool,
}

impl Field {
    pub fn required(name: &'static str, schema: Schema) -> Self {
        Field {
            name,
            schema,
            required: true,
        }
    }

    pub fn optional(name: &'static str, schema: Schema) -> Self {
        Field {
            name,
            schema,
            required: false,
        }
    }
}

/// Clean `value` against `schema`: keep only declared structure fields,
/// coerce scalars, recurse into lists. A declared required field missing
/// from the value is an error rather than a silent hole.
pub fn clean_returnvalue(schema: &Schema, value: &Value) -> Result<Value, CatalogError> {
    match schema {
        Schema::Int => match value {
            Value::Number(n) if n.is_i64() => Ok(value.clone()),
            Value::Bool(b) => Ok(json!(*b as i64)),
            Value::String(s) => s.parse::<i64>().map(|n| json!(n)).map_err(|_| {
                CatalogError::Validation(format!("'{}' is not an integer", s))
            }),
            other => Err(CatalogError::Validation(format!(
                "expected integer, got {}",
                other
            ))),
        },
        Schema::Text => match value {
            Value::String(_) => Ok(value.clone()),
            Value::Number(n) => Ok(json!(n.to_string())),
            Value::Null => Ok(json!("")),
            other => Err(CatalogError::Validation(format!(
                "expected text, got {}",
                other
            ))),
        },
        Schema::Bool => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::Number(n) => Ok(json!(n.as_i64().unwrap_or(0) != 0)),
            other => Err(CatalogError::Validation(format!(
                "expected bool, got {}",
                other
            ))),
        },
        Schema::List(inner) => {
            let items = value.as_array().ok_or_else(|| {
                CatalogError::Validation(format!("expected list, got {}", value))
            })?;
            let cleaned: Result<Vec<Value>, _> =
                items.iter().map(|item| clean_returnvalue(inner, item)).collect();
            Ok(Value::Array(cleaned?))
        }
        Schema::Structure(fields) => {
            let object = value.as_object().ok_or_else(|| {
                CatalogError::Validation(format!("expected structure, got {}", value))
            })?;
            let mut cleaned = Map::new();
            for field in fields {
                match object.get(field.name) {
                    Some(found) => {
                        cleaned.insert(
                            field.name.to_string(),
                            clean_returnvalue(&field.schema, found)?,
                        );
                    }
                    None if field.required => {
                        return Err(CatalogError::Validation(format!(
                            "missing required field '{}'",
                            field.name
                        )))
                    }
                    None => {}
                }
            }
            Ok(Value::Object(cleaned))
        }
    }
}

fn category_schema() -> Schema {
    // Internal bookkeeping (path, sortorder internals, visibleold,
    // timestamps) stays inside; callers see the curated shape.
    Schema::List(Box::new(Schema::Structure(vec![
        Field::required("id", Schema::Int),
        Field::required("name", Schema::Text),
        Field::optional("idnumber", Schema::Text),
        Field::required("description", Schema::Text),
        Field::required("descriptionformat", Schema::Int),
        Field::required("parent", Schema::Int),
        Field::required("sortorder", Schema::Int),
        Field::required("visible", Schema::Int),
        Field::optional("theme", Schema::Text),
    ])))
}

fn course_schema() -> Schema {
    Schema::List(Box::new(Schema::Structure(vec![
        Field::required("id", Schema::Int),
        Field::required("categoryid", Schema::Int),
        Field::required("fullname", Schema::Text),
        Field::required("shortname", Schema::Text),
        Field::optional("idnumber", Schema::Text),
        Field::required("summary", Schema::Text),
        Field::required("summaryformat", Schema::Int),
        Field::required("format", Schema::Text),
        Field::required("numsections", Schema::Int),
        Field::required("visible", Schema::Int),
        Field::required("lang", Schema::Text),
        Field::required("enablecompletion", Schema::Int),
        Field::required(
            "courseformatoptions",
            Schema::List(Box::new(Schema::Structure(vec![
                Field::required("name", Schema::Text),
                Field::required("value", Schema::Text),
            ]))),
        ),
    ])))
}

fn contents_schema() -> Schema {
    Schema::List(Box::new(Schema::Structure(vec![
        Field::required("id", Schema::Int),
        Field::required("section", Schema::Int),
        Field::required("name", Schema::Text),
        Field::required("summary", Schema::Text),
        Field::required("visible", Schema::Int),
        Field::required(
            "modules",
            Schema::List(Box::new(Schema::Structure(vec![
                Field::required("id", Schema::Int),
                Field::required("name", Schema::Text),
                Field::required("modname", Schema::Text),
                Field::required("instance", Schema::Int),
                Field::required("visible", Schema::Int),
                Field::required("description", Schema::Text),
            ]))),
        ),
    ])))
}

fn warnings_schema() -> Schema {
    Schema::Structure(vec![Field::required(
        "warnings",
        Schema::List(Box::new(Schema::Structure(vec![
            Field::required("item", Schema::Text),
            Field::required("warningcode", Schema::Text),
            Field::required("message", Schema::Text),
        ]))),
    )])
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, CatalogError> {
    serde_json::to_value(value)
        .map_err(|err| CatalogError::Validation(format!("serialization failed: {}", err)))
}

pub fn create_categories(
    store: &Store,
    gate: &dyn CapabilityGate,
    actor: &Actor,
    specs: &[category::CategorySpec],
) -> Result<Value, CatalogError> {
    let records = category::create_categories(store, gate, actor, specs)?;
    clean_returnvalue(&category_schema(), &to_value(&records)?)
}

pub fn get_categories(
    store: &Store,
    gate: &dyn CapabilityGate,
    actor: &Actor,
    criteria: &[Criterion],
    include_subcategories: bool,
) -> Result<Value, CatalogError> {
    let records = category::get_categories(store, gate, actor, criteria, include_subcategories)?;
    clean_returnvalue(&category_schema(), &to_value(&records)?)
}

pub fn update_categories(
    store: &Store,
    gate: &dyn CapabilityGate,
    actor: &Actor,
    updates: &[category::CategoryUpdate],
) -> Result<(), CatalogError> {
    category::update_categories(store, gate, actor, updates)
}

pub fn delete_categories(
    store: &Store,
    gate: &dyn CapabilityGate,
    actor: &Actor,
    registry: &PluginRegistry,
    deletes: &[category::CategoryDelete],
) -> Result<(), CatalogError> {
    category::delete_categories(store, gate, actor, registry, deletes)
}

pub fn create_courses(
    store: &Store,
    gate: &dyn CapabilityGate,
    actor: &Actor,
    specs: &[course::CourseSpec],
) -> Result<Value, CatalogError> {
    let records = course::create_courses(store, gate, actor, specs)?;
    clean_returnvalue(&course_schema(), &to_value(&records)?)
}

pub fn get_courses(store: &Store, actor: &Actor, ids: &[i64]) -> Result<Value, CatalogError> {
    let records = course::get_courses(store, actor, ids)?;
    clean_returnvalue(&course_schema(), &to_value(&records)?)
}

pub fn update_courses(
    store: &Store,
    gate: &dyn CapabilityGate,
    actor: &Actor,
    updates: &[CourseUpdate],
) -> Result<Value, CatalogError> {
    let result = course::update_courses(store, gate, actor, updates)?;
    clean_returnvalue(&warnings_schema(), &to_value(&result)?)
}

pub fn delete_courses(
    store: &Store,
    actor: &Actor,
    registry: &PluginRegistry,
    ids: &[i64],
) -> Result<(), CatalogError> {
    course::delete_courses(store, actor, registry, ids)
}

pub fn get_course_contents(
    store: &Store,
    gate: &dyn CapabilityGate,
    actor: &Actor,
    registry: &PluginRegistry,
    courseid: i64,
    options: &[ContentsOption],
) -> Result<Value, CatalogError> {
    let sections =
        contents::get_course_contents(store, gate, actor, registry, courseid, options)?;
    clean_returnvalue(&contents_schema(), &to_value(&sections)?)
}

pub fn delete_modules(
    store: &Store,
    gate: &dyn CapabilityGate,
    actor: &Actor,
    registry: &PluginRegistry,
    cmids: &[i64],
) -> Result<(), CatalogError> {
    course::delete_modules(store, gate, actor, registry, cmids)
}

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
    import::import_course(
        store,
        gate,
        actor,
        registry,
        source,
        target,
        delete_content,
        options,
    )
}

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
) -> Result<Value, CatalogError> {
    let record = import::duplicate_course(
        store, gate, actor, registry, source, fullname, shortname, categoryid, options,
    )?;
    let schema = Schema::Structure(vec![
        Field::required("id", Schema::Int),
        Field::required("shortname", Schema::Text),
    ]);
    clean_returnvalue(&schema, &to_value(&record)?)
}
