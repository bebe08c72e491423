use curricula::core::capability::{
    Actor, Context, OpenGate, RoleTable, CAP_COURSE_CHANGESUMMARY, CAP_COURSE_CREATE,
    CAP_COURSE_MANAGEACTIVITIES, CAP_COURSE_UPDATE, CAP_COURSE_VIEW,
};
use curricula::core::category::{create_categories, CategorySpec};
use curricula::core::contents::{get_course_contents, ContentsOption};
use curricula::core::course::{
    add_module, create_courses, delete_courses, delete_modules, enrol, get_courses,
    update_courses, CourseSpec, CourseUpdate,
};
use curricula::core::db::initialize_catalog_db;
use curricula::core::format::FormatOption;
use curricula::core::modplugin::PluginRegistry;
use curricula::core::store::Store;
use tempfile::tempdir;

fn setup() -> (tempfile::TempDir, Store, PluginRegistry, i64) {
    let tmp = tempdir().unwrap();
    let store = Store::new(tmp.path());
    let registry = PluginRegistry::with_builtins();
    initialize_catalog_db(&store, &registry).unwrap();
    let category = create_categories(
        &store,
        &OpenGate,
        &Actor::admin("admin"),
        &[CategorySpec {
            name: "Science".to_string(),
            parent: 0,
            idnumber: None,
            description: None,
            descriptionformat: None,
            theme: None,
            visible: None,
        }],
    )
    .unwrap()[0]
        .id;
    (tmp, store, registry, category)
}

fn spec(category: i64, fullname: &str, shortname: &str) -> CourseSpec {
    CourseSpec {
        fullname: fullname.to_string(),
        shortname: shortname.to_string(),
        categoryid: category,
        idnumber: None,
        summary: None,
        summaryformat: None,
        format: None,
        numsections: None,
        visible: None,
        lang: None,
        theme: None,
        enablecompletion: None,
        courseformatoptions: Vec::new(),
    }
}

#[test]
fn test_create_course_applies_site_defaults() {
    let (_tmp, store, _registry, category) = setup();
    let admin = Actor::admin("admin");

    let created =
        create_courses(&store, &OpenGate, &admin, &[spec(category, "Physics", "phys")]).unwrap();
    assert_eq!(created.len(), 1);
    let course = &created[0];
    assert_eq!(course.format, "topics");
    assert_eq!(course.numsections, 5);
    assert_eq!(course.summaryformat, 1);
    assert!(course.visible);
    assert!(!course.enablecompletion);
}

#[test]
fn test_create_course_with_format_options() {
    let (_tmp, store, registry, category) = setup();
    let admin = Actor::admin("admin");

    let mut physics = spec(category, "Physics", "phys");
    physics.format = Some("weeks".to_string());
    physics.courseformatoptions = vec![FormatOption::new("numsections", "8")];
    let created = create_courses(&store, &OpenGate, &admin, &[physics]).unwrap();
    let course = &created[0];
    assert_eq!(course.format, "weeks");
    assert_eq!(course.numsections, 8);
    assert!(course
        .courseformatoptions
        .iter()
        .any(|o| o.name == "numsections" && o.value == "8"));

    // Sections 0 (general) through 8 exist.
    let contents =
        get_course_contents(&store, &OpenGate, &admin, &registry, course.id, &[]).unwrap();
    assert_eq!(contents.len(), 9);
    assert_eq!(contents[0].section, 0);
}

#[test]
fn test_create_course_rejects_unknown_format_option() {
    let (_tmp, store, _registry, category) = setup();
    let admin = Actor::admin("admin");

    let mut bad = spec(category, "Physics", "phys");
    bad.courseformatoptions = vec![FormatOption::new("sidebar", "1")];
    let err = create_courses(&store, &OpenGate, &admin, &[bad]).unwrap_err();
    assert_eq!(err.code(), "invalidparameter");
}

#[test]
fn test_create_course_needs_capability_in_category_chain() {
    let (_tmp, store, _registry, category) = setup();
    let user = Actor::named("bob");

    let gate = RoleTable::new();
    let err = create_courses(&store, &gate, &user, &[spec(category, "Nope", "nope")]).unwrap_err();
    assert_eq!(err.code(), "nopermissions");

    let mut gate = RoleTable::new();
    gate.grant("bob", Context::Category(category), CAP_COURSE_CREATE);
    create_courses(&store, &gate, &user, &[spec(category, "Yes", "yes")]).unwrap();
}

#[test]
fn test_visible_request_without_capability_falls_back() {
    let (_tmp, store, _registry, category) = setup();
    let user = Actor::named("bob");
    let mut gate = RoleTable::new();
    gate.grant("bob", Context::System, CAP_COURSE_CREATE);

    // bob asks for a hidden course but holds no visibility capability; the
    // course silently takes the (visible) category's state instead.
    let mut wanted_hidden = spec(category, "Physics", "phys");
    wanted_hidden.visible = Some(false);
    let created = create_courses(&store, &gate, &user, &[wanted_hidden]).unwrap();
    assert!(created[0].visible);
}

#[test]
fn test_duplicate_shortname_rejected() {
    let (_tmp, store, _registry, category) = setup();
    let admin = Actor::admin("admin");

    create_courses(&store, &OpenGate, &admin, &[spec(category, "One", "same")]).unwrap();
    let err = create_courses(&store, &OpenGate, &admin, &[spec(category, "Two", "same")])
        .unwrap_err();
    assert_eq!(err.code(), "duplicatevalue");
}

#[test]
fn test_get_courses_empty_ids_returns_all() {
    let (_tmp, store, _registry, category) = setup();
    let admin = Actor::admin("admin");
    create_courses(
        &store,
        &OpenGate,
        &admin,
        &[spec(category, "One", "one"), spec(category, "Two", "two")],
    )
    .unwrap();

    let all = get_courses(&store, &admin, &[]).unwrap();
    assert_eq!(all.len(), 2);
    let one = get_courses(&store, &admin, &[all[0].id]).unwrap();
    assert_eq!(one.len(), 1);
    assert_eq!(one[0].shortname, "one");
}

#[test]
fn test_update_without_field_capability_warns_and_skips() {
    let (_tmp, store, _registry, category) = setup();
    let admin = Actor::admin("admin");
    let course =
        create_courses(&store, &OpenGate, &admin, &[spec(category, "Physics", "phys")]).unwrap()
            [0]
        .id;

    // carol may update but not rename.
    let mut gate = RoleTable::new();
    gate.grant("carol", Context::System, CAP_COURSE_UPDATE);
    gate.grant("carol", Context::System, CAP_COURSE_CHANGESUMMARY);
    let carol = Actor::named("carol");

    let result = update_courses(
        &store,
        &gate,
        &carol,
        &[CourseUpdate {
            id: course,
            fullname: Some("Renamed".to_string()),
            summary: Some("New summary".to_string()),
            ..Default::default()
        }],
    )
    .unwrap();

    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].warningcode, "nopermissions");
    assert_eq!(result.warnings[0].item, course.to_string());

    // The authorized field landed, the forbidden one did not.
    let after = &get_courses(&store, &admin, &[course]).unwrap()[0];
    assert_eq!(after.fullname, "Physics");
    assert_eq!(after.summary, "New summary");
}

#[test]
fn test_update_without_base_capability_warns_once() {
    let (_tmp, store, _registry, category) = setup();
    let admin = Actor::admin("admin");
    let course =
        create_courses(&store, &OpenGate, &admin, &[spec(category, "Physics", "phys")]).unwrap()
            [0]
        .id;

    let gate = RoleTable::new();
    let eve = Actor::named("eve");
    let result = update_courses(
        &store,
        &gate,
        &eve,
        &[CourseUpdate {
            id: course,
            fullname: Some("Taken over".to_string()),
            summary: Some("x".to_string()),
            ..Default::default()
        }],
    )
    .unwrap();

    assert_eq!(result.warnings.len(), 1);
    let after = &get_courses(&store, &admin, &[course]).unwrap()[0];
    assert_eq!(after.fullname, "Physics");
}

#[test]
fn test_update_invalid_summaryformat_warns_and_keeps_old() {
    let (_tmp, store, _registry, category) = setup();
    let admin = Actor::admin("admin");
    let course =
        create_courses(&store, &OpenGate, &admin, &[spec(category, "Physics", "phys")]).unwrap()
            [0]
        .id;

    let result = update_courses(
        &store,
        &OpenGate,
        &admin,
        &[CourseUpdate {
            id: course,
            summaryformat: Some(10),
            summary: Some("kept".to_string()),
            ..Default::default()
        }],
    )
    .unwrap();

    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].warningcode, "invalidsummaryformat");
    let after = &get_courses(&store, &admin, &[course]).unwrap()[0];
    assert_eq!(after.summaryformat, 1);
    assert_eq!(after.summary, "kept");
}

#[test]
fn test_update_unknown_course_raises() {
    let (_tmp, store, _registry, _category) = setup();
    let err = update_courses(
        &store,
        &OpenGate,
        &Actor::admin("admin"),
        &[CourseUpdate {
            id: 999,
            fullname: Some("ghost".to_string()),
            ..Default::default()
        }],
    )
    .unwrap_err();
    assert_eq!(err.code(), "invalidrecord");
}

#[test]
fn test_delete_course_requires_enrolment_or_admin() {
    let (_tmp, store, registry, category) = setup();
    let admin = Actor::admin("admin");
    let created = create_courses(
        &store,
        &OpenGate,
        &admin,
        &[spec(category, "One", "one"), spec(category, "Two", "two")],
    )
    .unwrap();

    let stranger = Actor::named("eve");
    let err = delete_courses(&store, &stranger, &registry, &[created[0].id]).unwrap_err();
    assert_eq!(err.code(), "requirelogin");

    enrol(&store, created[0].id, "eve").unwrap();
    delete_courses(&store, &stranger, &registry, &[created[0].id]).unwrap();

    // Admin needs no enrolment.
    delete_courses(&store, &admin, &registry, &[created[1].id]).unwrap();
    assert!(get_courses(&store, &admin, &[]).unwrap().is_empty());
}

#[test]
fn test_delete_modules_is_all_or_nothing() {
    let (_tmp, store, registry, category) = setup();
    let admin = Actor::admin("admin");
    let course =
        create_courses(&store, &OpenGate, &admin, &[spec(category, "Physics", "phys")]).unwrap()
            [0]
        .id;

    let cm1 = add_module(&store, &admin, &registry, course, "forum", "F", "", 1, false).unwrap();
    let cm2 = add_module(&store, &admin, &registry, course, "page", "P", "", 1, false).unwrap();

    // One unknown id poisons the whole batch; both modules survive.
    let err = delete_modules(&store, &OpenGate, &admin, &registry, &[cm1, 999]).unwrap_err();
    assert_eq!(err.code(), "invalidrecord");
    let contents =
        get_course_contents(&store, &OpenGate, &admin, &registry, course, &[]).unwrap();
    let modules: usize = contents.iter().map(|s| s.modules.len()).sum();
    assert_eq!(modules, 2);

    delete_modules(&store, &OpenGate, &admin, &registry, &[cm1, cm2]).unwrap();
    let contents =
        get_course_contents(&store, &OpenGate, &admin, &registry, course, &[]).unwrap();
    let modules: usize = contents.iter().map(|s| s.modules.len()).sum();
    assert_eq!(modules, 0);
}

#[test]
fn test_delete_modules_checks_enrolment_and_capability() {
    let (_tmp, store, registry, category) = setup();
    let admin = Actor::admin("admin");
    let course =
        create_courses(&store, &OpenGate, &admin, &[spec(category, "Physics", "phys")]).unwrap()
            [0]
        .id;
    let cmid = add_module(&store, &admin, &registry, course, "forum", "F", "", 1, false).unwrap();

    // Not enrolled: access error even with the capability.
    let mut gate = RoleTable::new();
    gate.grant("dave", Context::System, CAP_COURSE_MANAGEACTIVITIES);
    let dave = Actor::named("dave");
    let err = delete_modules(&store, &gate, &dave, &registry, &[cmid]).unwrap_err();
    assert_eq!(err.code(), "requirelogin");

    // Enrolled but capability-less: permission error.
    enrol(&store, course, "dave").unwrap();
    let bare = RoleTable::new();
    let err = delete_modules(&store, &bare, &dave, &registry, &[cmid]).unwrap_err();
    assert_eq!(err.code(), "nopermissions");

    // Enrolled with the capability: allowed.
    delete_modules(&store, &gate, &dave, &registry, &[cmid]).unwrap();
}

#[test]
fn test_contents_requires_view_and_honors_filters() {
    let (_tmp, store, registry, category) = setup();
    let admin = Actor::admin("admin");
    let course =
        create_courses(&store, &OpenGate, &admin, &[spec(category, "Physics", "phys")]).unwrap()
            [0]
        .id;
    add_module(&store, &admin, &registry, course, "forum", "F", "", 1, false).unwrap();
    add_module(&store, &admin, &registry, course, "page", "P", "", 2, false).unwrap();

    let gate = RoleTable::new();
    let user = Actor::named("frank");
    let err = get_course_contents(&store, &gate, &user, &registry, course, &[]).unwrap_err();
    assert_eq!(err.code(), "nopermissions");

    let mut gate = RoleTable::new();
    gate.grant("frank", Context::Course(course), CAP_COURSE_VIEW);
    let all = get_course_contents(&store, &gate, &user, &registry, course, &[]).unwrap();
    assert_eq!(all.len(), 6);
    assert_eq!(all[1].modules.len(), 1);
    assert_eq!(all[1].modules[0].modname, "forum");

    let one_section = get_course_contents(
        &store,
        &gate,
        &user,
        &registry,
        course,
        &[ContentsOption::new("sectionnumber", "2")],
    )
    .unwrap();
    assert_eq!(one_section.len(), 1);
    assert_eq!(one_section[0].modules[0].name, "P");

    let bare = get_course_contents(
        &store,
        &gate,
        &user,
        &registry,
        course,
        &[ContentsOption::new("excludemodules", "1")],
    )
    .unwrap();
    assert!(bare.iter().all(|s| s.modules.is_empty()));
}

#[test]
fn test_contents_description_gated_and_sanitized() {
    let (_tmp, store, registry, category) = setup();
    let admin = Actor::admin("admin");
    let course =
        create_courses(&store, &OpenGate, &admin, &[spec(category, "Physics", "phys")]).unwrap()
            [0]
        .id;
    let intro = "<p>Read this</p><script>alert('x')</script>";
    add_module(&store, &admin, &registry, course, "page", "Shown", intro, 1, true).unwrap();
    add_module(&store, &admin, &registry, course, "page", "Quiet", intro, 1, false).unwrap();

    let contents =
        get_course_contents(&store, &OpenGate, &admin, &registry, course, &[]).unwrap();
    let section = &contents[1];
    assert_eq!(section.modules[0].description, "<p>Read this</p>");
    assert_eq!(section.modules[1].description, "");
}
