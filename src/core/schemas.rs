//! Centralized database schema definitions for the catalog store.
//!
//! The catalog lives in a single SQLite database (`catalog.db`):
//! the category forest, courses with their sections/modules/format
//! options, block and filter configuration, and enrolments. Module
//! plugins own their `mod_<type>` tables and create them on install.

pub const CATALOG_DB_NAME: &str = "catalog.db";

pub const CATALOG_DB_SCHEMA_CATEGORIES: &str = "
    CREATE TABLE IF NOT EXISTS categories (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        idnumber TEXT UNIQUE,
        description TEXT NOT NULL DEFAULT '',
        descriptionformat INTEGER NOT NULL DEFAULT 1,
        parent INTEGER NOT NULL DEFAULT 0,
        path TEXT NOT NULL DEFAULT '',
        sortorder INTEGER NOT NULL DEFAULT 0,
        visible INTEGER NOT NULL DEFAULT 1,
        visibleold INTEGER NOT NULL DEFAULT 1,
        theme TEXT NOT NULL DEFAULT '',
        timecreated TEXT NOT NULL,
        timemodified TEXT NOT NULL
    )
";
pub const CATALOG_DB_SCHEMA_INDEX_CATEGORY_PARENT: &str =
    "CREATE INDEX IF NOT EXISTS idx_categories_parent ON categories(parent)";
pub const CATALOG_DB_SCHEMA_INDEX_CATEGORY_PATH: &str =
    "CREATE INDEX IF NOT EXISTS idx_categories_path ON categories(path)";

pub const CATALOG_DB_SCHEMA_COURSES: &str = "
    CREATE TABLE IF NOT EXISTS courses (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        category INTEGER NOT NULL,
        fullname TEXT NOT NULL,
        shortname TEXT NOT NULL UNIQUE,
        idnumber TEXT UNIQUE,
        summary TEXT NOT NULL DEFAULT '',
        summaryformat INTEGER NOT NULL DEFAULT 1,
        format TEXT NOT NULL DEFAULT 'topics',
        numsections INTEGER NOT NULL DEFAULT 5,
        visible INTEGER NOT NULL DEFAULT 1,
        lang TEXT NOT NULL DEFAULT '',
        theme TEXT NOT NULL DEFAULT '',
        enablecompletion INTEGER NOT NULL DEFAULT 0,
        timecreated TEXT NOT NULL,
        timemodified TEXT NOT NULL,
        FOREIGN KEY(category) REFERENCES categories(id)
    )
";
pub const CATALOG_DB_SCHEMA_INDEX_COURSE_CATEGORY: &str =
    "CREATE INDEX IF NOT EXISTS idx_courses_category ON courses(category)";

pub const CATALOG_DB_SCHEMA_FORMAT_OPTIONS: &str = "
    CREATE TABLE IF NOT EXISTS course_format_options (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        courseid INTEGER NOT NULL,
        format TEXT NOT NULL,
        name TEXT NOT NULL,
        value TEXT NOT NULL,
        UNIQUE(courseid, format, name),
        FOREIGN KEY(courseid) REFERENCES courses(id) ON DELETE CASCADE
    )
";

pub const CATALOG_DB_SCHEMA_SECTIONS: &str = "
    CREATE TABLE IF NOT EXISTS course_sections (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        course INTEGER NOT NULL,
        section INTEGER NOT NULL,
        name TEXT NOT NULL DEFAULT '',
        summary TEXT NOT NULL DEFAULT '',
        visible INTEGER NOT NULL DEFAULT 1,
        UNIQUE(course, section),
        FOREIGN KEY(course) REFERENCES courses(id) ON DELETE CASCADE
    )
";

pub const CATALOG_DB_SCHEMA_MODULES: &str = "
    CREATE TABLE IF NOT EXISTS course_modules (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        course INTEGER NOT NULL,
        section INTEGER NOT NULL,
        modname TEXT NOT NULL,
        instance INTEGER NOT NULL,
        visible INTEGER NOT NULL DEFAULT 1,
        showdescription INTEGER NOT NULL DEFAULT 0,
        FOREIGN KEY(course) REFERENCES courses(id) ON DELETE CASCADE,
        FOREIGN KEY(section) REFERENCES course_sections(id) ON DELETE CASCADE
    )
";
pub const CATALOG_DB_SCHEMA_INDEX_MODULES_COURSE: &str =
    "CREATE INDEX IF NOT EXISTS idx_course_modules_course ON course_modules(course)";

pub const CATALOG_DB_SCHEMA_BLOCKS: &str = "
    CREATE TABLE IF NOT EXISTS block_instances (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        course INTEGER NOT NULL,
        blockname TEXT NOT NULL,
        FOREIGN KEY(course) REFERENCES courses(id) ON DELETE CASCADE
    )
";

pub const CATALOG_DB_SCHEMA_FILTERS: &str = "
    CREATE TABLE IF NOT EXISTS course_filters (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        course INTEGER NOT NULL,
        filter TEXT NOT NULL,
        active INTEGER NOT NULL DEFAULT 1,
        FOREIGN KEY(course) REFERENCES courses(id) ON DELETE CASCADE
    )
";

pub const CATALOG_DB_SCHEMA_ENROLMENTS: &str = "
    CREATE TABLE IF NOT EXISTS enrolments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        courseid INTEGER NOT NULL,
        actor TEXT NOT NULL,
        UNIQUE(courseid, actor),
        FOREIGN KEY(courseid) REFERENCES courses(id) ON DELETE CASCADE
    )
";
