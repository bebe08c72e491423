//! CLI struct definitions and dispatch for the `curricula` binary.
//!
//! The CLI is the local authoring surface: it runs as an admin actor
//! through an open gate, since anyone with shell access to the store root
//! already owns the database file. Remote-style capability enforcement
//! lives behind [`crate::core::external`] for embedding callers.

use crate::core::capability::{Actor, OpenGate};
use crate::core::category::{CategoryDelete, CategorySpec, CategoryUpdate, Criterion};
use crate::core::contents::ContentsOption;
use crate::core::course::{CourseSpec, CourseUpdate};
use crate::core::db::initialize_catalog_db;
use crate::core::error::CatalogError;
use crate::core::external;
use crate::core::format::FormatOption;
use crate::core::import::{DuplicateOptions, ImportOptions};
use crate::core::modplugin::PluginRegistry;
use crate::core::store::Store;
use crate::core::course;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "curricula",
    version = env!("CARGO_PKG_VERSION"),
    about = "Local-first course catalog: categories, courses, sections and activity modules in one SQLite store"
)]
pub struct Cli {
    /// Store root directory (holds catalog.db and site.toml).
    #[clap(long, global = true, default_value = ".curricula")]
    pub root: PathBuf,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the store root and initialize the catalog database
    Init,
    /// Category operations
    Category {
        #[clap(subcommand)]
        command: CategoryCommand,
    },
    /// Course operations
    Course {
        #[clap(subcommand)]
        command: CourseCommand,
    },
    /// Activity module operations
    Module {
        #[clap(subcommand)]
        command: ModuleCommand,
    },
    /// Copy content from one course into another
    Import {
        /// Source course id
        source: i64,
        /// Target course id
        target: i64,
        /// Purge the target's content first (0 or 1)
        #[clap(long, default_value_t = 0)]
        delete_content: i64,
        /// Skip activity modules
        #[clap(long)]
        no_activities: bool,
        /// Skip block instances
        #[clap(long)]
        no_blocks: bool,
        /// Skip filter settings
        #[clap(long)]
        no_filters: bool,
    },
    /// Materialize a new course from an existing one
    Duplicate {
        /// Source course id
        source: i64,
        #[clap(long)]
        fullname: String,
        #[clap(long)]
        shortname: String,
        /// Target category id
        #[clap(long)]
        category: i64,
        /// Carry enrolments over
        #[clap(long)]
        users: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum CategoryCommand {
    /// Add a category
    Add {
        name: String,
        /// Parent category id (0 for a new root)
        #[clap(long, default_value_t = 0)]
        parent: i64,
        #[clap(long)]
        idnumber: Option<String>,
        #[clap(long)]
        description: Option<String>,
        /// Create hidden
        #[clap(long)]
        hidden: bool,
    },
    /// List categories, optionally filtered
    List {
        /// Filter as key=value (id, idnumber, name, parent, visible)
        #[clap(long)]
        filter: Vec<String>,
        /// Include descendants of matched categories
        #[clap(long)]
        subtree: bool,
    },
    /// Update a category
    Update {
        id: i64,
        #[clap(long)]
        name: Option<String>,
        #[clap(long)]
        idnumber: Option<String>,
        #[clap(long)]
        description: Option<String>,
        /// Move under a new parent (0 for root level)
        #[clap(long)]
        parent: Option<i64>,
        #[clap(long)]
        visible: Option<bool>,
    },
    /// Delete a category
    Delete {
        id: i64,
        /// Delete the whole subtree including its courses
        #[clap(long)]
        recursive: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum CourseCommand {
    /// Add a course
    Add {
        #[clap(long)]
        category: i64,
        #[clap(long)]
        fullname: String,
        #[clap(long)]
        shortname: String,
        #[clap(long)]
        idnumber: Option<String>,
        #[clap(long)]
        summary: Option<String>,
        /// Course format ('topics' or 'weeks')
        #[clap(long)]
        format: Option<String>,
        #[clap(long)]
        numsections: Option<i64>,
        /// Format option as name=value, repeatable
        #[clap(long)]
        option: Vec<String>,
    },
    /// List courses (all, or the given ids)
    List {
        ids: Vec<i64>,
    },
    /// Update course fields
    Update {
        id: i64,
        #[clap(long)]
        fullname: Option<String>,
        #[clap(long)]
        shortname: Option<String>,
        #[clap(long)]
        idnumber: Option<String>,
        #[clap(long)]
        summary: Option<String>,
        #[clap(long)]
        category: Option<i64>,
        #[clap(long)]
        visible: Option<bool>,
    },
    /// Delete courses with all their content
    Delete {
        ids: Vec<i64>,
    },
    /// Show a course's sections and modules
    Contents {
        id: i64,
        /// Restrict to one section
        #[clap(long)]
        section: Option<i64>,
        /// Skip module listings
        #[clap(long)]
        exclude_modules: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ModuleCommand {
    /// Add an activity module to a course section
    Add {
        #[clap(long)]
        course: i64,
        /// Module type (forum, page, label, url, quiz)
        #[clap(long)]
        modname: String,
        #[clap(long)]
        name: String,
        #[clap(long, default_value = "")]
        intro: String,
        #[clap(long, default_value_t = 0)]
        section: i64,
        /// Surface the intro in contents listings
        #[clap(long)]
        show_description: bool,
    },
    /// Delete course modules by id
    Delete {
        cmids: Vec<i64>,
    },
}

pub fn run() -> Result<(), CatalogError> {
    let cli = Cli::parse();
    let store = Store::new(&cli.root);
    let registry = PluginRegistry::with_builtins();
    let gate = OpenGate;
    let actor = Actor::admin("cli");

    match cli.command {
        Command::Init => {
            std::fs::create_dir_all(&store.root)?;
            initialize_catalog_db(&store, &registry)?;
            println!("Initialized catalog store at {}", store.root.display());
            Ok(())
        }
        Command::Category { command } => run_category(&store, &gate, &actor, &registry, command),
        Command::Course { command } => run_course(&store, &gate, &actor, &registry, command),
        Command::Module { command } => run_module(&store, &gate, &actor, &registry, command),
        Command::Import {
            source,
            target,
            delete_content,
            no_activities,
            no_blocks,
            no_filters,
        } => {
            let options = ImportOptions {
                activities: !no_activities,
                blocks: !no_blocks,
                filters: !no_filters,
            };
            external::import_course(
                &store,
                &gate,
                &actor,
                &registry,
                source,
                target,
                delete_content,
                &options,
            )?;
            println!("Imported course {} into {}", source, target);
            Ok(())
        }
        Command::Duplicate {
            source,
            fullname,
            shortname,
            category,
            users,
        } => {
            let options = DuplicateOptions {
                users,
                visible: None,
            };
            let result = external::duplicate_course(
                &store, &gate, &actor, &registry, source, &fullname, &shortname, category,
                &options,
            )?;
            print_json(&result)
        }
    }
}

fn run_category(
    store: &Store,
    gate: &OpenGate,
    actor: &Actor,
    registry: &PluginRegistry,
    command: CategoryCommand,
) -> Result<(), CatalogError> {
    match command {
        CategoryCommand::Add {
            name,
            parent,
            idnumber,
            description,
            hidden,
        } => {
            let spec = CategorySpec {
                name,
                parent,
                idnumber,
                description,
                descriptionformat: None,
                theme: None,
                visible: Some(!hidden),
            };
            let result = external::create_categories(store, gate, actor, &[spec])?;
            print_json(&result)
        }
        CategoryCommand::List { filter, subtree } => {
            let criteria = filter
                .iter()
                .map(|raw| parse_pair(raw).map(|(k, v)| Criterion::new(&k, &v)))
                .collect::<Result<Vec<_>, _>>()?;
            let result = external::get_categories(store, gate, actor, &criteria, subtree)?;
            print_json(&result)
        }
        CategoryCommand::Update {
            id,
            name,
            idnumber,
            description,
            parent,
            visible,
        } => {
            let update = CategoryUpdate {
                id,
                name,
                idnumber,
                description,
                descriptionformat: None,
                parent,
                theme: None,
                visible,
            };
            external::update_categories(store, gate, actor, &[update])?;
            println!("Updated category {}", id);
            Ok(())
        }
        CategoryCommand::Delete { id, recursive } => {
            external::delete_categories(
                store,
                gate,
                actor,
                registry,
                &[CategoryDelete { id, recursive }],
            )?;
            println!("Deleted category {}", id);
            Ok(())
        }
    }
}

fn run_course(
    store: &Store,
    gate: &OpenGate,
    actor: &Actor,
    registry: &PluginRegistry,
    command: CourseCommand,
) -> Result<(), CatalogError> {
    match command {
        CourseCommand::Add {
            category,
            fullname,
            shortname,
            idnumber,
            summary,
            format,
            numsections,
            option,
        } => {
            let courseformatoptions = option
                .iter()
                .map(|raw| parse_pair(raw).map(|(k, v)| FormatOption::new(&k, &v)))
                .collect::<Result<Vec<_>, _>>()?;
            let spec = CourseSpec {
                fullname,
                shortname,
                categoryid: category,
                idnumber,
                summary,
                summaryformat: None,
                format,
                numsections,
                visible: None,
                lang: None,
                theme: None,
                enablecompletion: None,
                courseformatoptions,
            };
            let result = external::create_courses(store, gate, actor, &[spec])?;
            print_json(&result)
        }
        CourseCommand::List { ids } => {
            let result = external::get_courses(store, actor, &ids)?;
            print_json(&result)
        }
        CourseCommand::Update {
            id,
            fullname,
            shortname,
            idnumber,
            summary,
            category,
            visible,
        } => {
            let update = CourseUpdate {
                id,
                fullname,
                shortname,
                categoryid: category,
                idnumber,
                summary,
                summaryformat: None,
                visible,
            };
            let result = external::update_courses(store, gate, actor, &[update])?;
            print_json(&result)
        }
        CourseCommand::Delete { ids } => {
            external::delete_courses(store, actor, registry, &ids)?;
            println!("Deleted {} course(s)", ids.len());
            Ok(())
        }
        CourseCommand::Contents {
            id,
            section,
            exclude_modules,
        } => {
            let mut options = Vec::new();
            if let Some(section) = section {
                options.push(ContentsOption::new("sectionnumber", &section.to_string()));
            }
            if exclude_modules {
                options.push(ContentsOption::new("excludemodules", "1"));
            }
            let result =
                external::get_course_contents(store, gate, actor, registry, id, &options)?;
            print_json(&result)
        }
    }
}

fn run_module(
    store: &Store,
    gate: &OpenGate,
    actor: &Actor,
    registry: &PluginRegistry,
    command: ModuleCommand,
) -> Result<(), CatalogError> {
    match command {
        ModuleCommand::Add {
            course,
            modname,
            name,
            intro,
            section,
            show_description,
        } => {
            let cmid = course::add_module(
                store,
                actor,
                registry,
                course,
                &modname,
                &name,
                &intro,
                section,
                show_description,
            )?;
            println!("Added {} module as course module {}", modname, cmid);
            Ok(())
        }
        ModuleCommand::Delete { cmids } => {
            external::delete_modules(store, gate, actor, registry, &cmids)?;
            println!("Deleted {} module(s)", cmids.len());
            Ok(())
        }
    }
}

fn parse_pair(raw: &str) -> Result<(String, String), CatalogError> {
    match raw.split_once('=') {
        Some((key, value)) => Ok((key.to_string(), value.to_string())),
        None => Err(CatalogError::Validation(format!(
            "'{}' is not a key=value pair",
            raw
        ))),
    }
}

fn print_json(value: &serde_json::Value) -> Result<(), CatalogError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| CatalogError::Validation(format!("output serialization: {}", err)))?;
    println!("{}", rendered);
    Ok(())
}
