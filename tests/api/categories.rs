use curricula::core::capability::{Actor, Context, OpenGate, RoleTable, CAP_CATEGORY_MANAGE};
use curricula::core::category::{
    create_categories, delete_categories, get_categories, update_categories, CategoryDelete,
    CategorySpec, CategoryUpdate, Criterion,
};
use curricula::core::db::initialize_catalog_db;
use curricula::core::modplugin::PluginRegistry;
use curricula::core::store::Store;
use tempfile::tempdir;

fn setup() -> (tempfile::TempDir, Store, PluginRegistry) {
    let tmp = tempdir().unwrap();
    let store = Store::new(tmp.path());
    let registry = PluginRegistry::with_builtins();
    initialize_catalog_db(&store, &registry).unwrap();
    (tmp, store, registry)
}

fn spec(name: &str, parent: i64) -> CategorySpec {
    CategorySpec {
        name: name.to_string(),
        parent,
        idnumber: None,
        description: None,
        descriptionformat: None,
        theme: None,
        visible: None,
    }
}

#[test]
fn test_create_categories_batch() {
    let (_tmp, store, _registry) = setup();
    let gate = OpenGate;
    let admin = Actor::admin("admin");

    let created = create_categories(
        &store,
        &gate,
        &admin,
        &[
            spec("Science", 0),
            spec("Humanities", 0),
            CategorySpec {
                idnumber: Some("PHYS".to_string()),
                ..spec("Physics", 0)
            },
        ],
    )
    .unwrap();
    assert_eq!(created.len(), 3);
    assert_eq!(created[0].name, "Science");
    assert_eq!(created[1].name, "Humanities");
    assert_eq!(created[0].parent, 0);
    assert_eq!(created[0].path, format!("/{}", created[0].id));
    assert!(created[0].visible);
}

#[test]
fn test_child_sorts_between_its_parent_and_next_root() {
    let (_tmp, store, _registry) = setup();
    let gate = OpenGate;
    let admin = Actor::admin("admin");

    let roots = create_categories(&store, &gate, &admin, &[spec("A", 0), spec("B", 0)]).unwrap();
    let a = roots[0].id;
    let b = roots[1].id;
    let child = create_categories(&store, &gate, &admin, &[spec("C", a)]).unwrap()[0].id;

    let all = get_categories(&store, &gate, &admin, &[], false).unwrap();
    let order: Vec<i64> = all.iter().map(|c| c.id).collect();
    assert_eq!(order, vec![a, child, b]);
}

#[test]
fn test_create_requires_manage_capability() {
    let (_tmp, store, _registry) = setup();
    let gate = RoleTable::new();
    let user = Actor::named("eve");

    let err = create_categories(&store, &gate, &user, &[spec("Nope", 0)]).unwrap_err();
    assert_eq!(err.code(), "nopermissions");

    // A grant at system scope opens creation anywhere.
    let mut gate = RoleTable::new();
    gate.grant("eve", Context::System, CAP_CATEGORY_MANAGE);
    create_categories(&store, &gate, &user, &[spec("Yes", 0)]).unwrap();
}

#[test]
fn test_parent_grant_covers_descendants() {
    let (_tmp, store, _registry) = setup();
    let admin = Actor::admin("admin");
    let root = create_categories(&store, &OpenGate, &admin, &[spec("Root", 0)]).unwrap()[0].id;

    let mut gate = RoleTable::new();
    gate.grant("ann", Context::Category(root), CAP_CATEGORY_MANAGE);
    let ann = Actor::named("ann");

    // Allowed under the granted category, denied at top level.
    let child =
        create_categories(&store, &gate, &ann, &[spec("Child", root)]).unwrap()[0].id;
    create_categories(&store, &gate, &ann, &[spec("Grandchild", child)]).unwrap();
    let err = create_categories(&store, &gate, &ann, &[spec("Top", 0)]).unwrap_err();
    assert_eq!(err.code(), "nopermissions");
}

#[test]
fn test_get_categories_filters() {
    let (_tmp, store, _registry) = setup();
    let gate = OpenGate;
    let admin = Actor::admin("admin");

    let visible = create_categories(&store, &gate, &admin, &[spec("Shown", 0)]).unwrap()[0].id;
    let hidden_spec = CategorySpec {
        visible: Some(false),
        ..spec("Hidden", 0)
    };
    create_categories(&store, &gate, &admin, &[hidden_spec]).unwrap();

    let shown = get_categories(&store, &gate, &admin, &[Criterion::new("visible", "1")], false)
        .unwrap();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].id, visible);

    let err = get_categories(&store, &gate, &admin, &[Criterion::new("colour", "red")], false)
        .unwrap_err();
    assert_eq!(err.code(), "invalidparameter");
}

#[test]
fn test_search_by_name_needs_manage() {
    let (_tmp, store, _registry) = setup();
    let admin = Actor::admin("admin");
    create_categories(&store, &OpenGate, &admin, &[spec("Secret", 0)]).unwrap();

    let gate = RoleTable::new();
    let user = Actor::named("eve");
    let err = get_categories(&store, &gate, &user, &[Criterion::new("name", "Secret")], false)
        .unwrap_err();
    assert_eq!(err.code(), "nopermissions");

    // Plain id lookup stays open.
    get_categories(&store, &gate, &user, &[Criterion::new("id", "1")], false).unwrap();
}

#[test]
fn test_include_subcategories_expands_matches() {
    let (_tmp, store, _registry) = setup();
    let gate = OpenGate;
    let admin = Actor::admin("admin");

    let root = create_categories(&store, &gate, &admin, &[spec("Root", 0)]).unwrap()[0].id;
    let child = create_categories(&store, &gate, &admin, &[spec("Child", root)]).unwrap()[0].id;
    create_categories(&store, &gate, &admin, &[spec("Grandchild", child)]).unwrap();

    let flat =
        get_categories(&store, &gate, &admin, &[Criterion::new("id", &root.to_string())], false)
            .unwrap();
    assert_eq!(flat.len(), 1);

    let deep =
        get_categories(&store, &gate, &admin, &[Criterion::new("id", &root.to_string())], true)
            .unwrap();
    assert_eq!(deep.len(), 3);
}

#[test]
fn test_update_moves_subtree() {
    let (_tmp, store, _registry) = setup();
    let gate = OpenGate;
    let admin = Actor::admin("admin");

    let roots = create_categories(&store, &gate, &admin, &[spec("A", 0), spec("B", 0)]).unwrap();
    let a = roots[0].id;
    let b = roots[1].id;
    let child = create_categories(&store, &gate, &admin, &[spec("C", a)]).unwrap()[0].id;

    update_categories(
        &store,
        &gate,
        &admin,
        &[CategoryUpdate {
            id: child,
            parent: Some(b),
            ..Default::default()
        }],
    )
    .unwrap();

    let moved = get_categories(&store, &gate, &admin, &[Criterion::new("id", &child.to_string())], false)
        .unwrap();
    assert_eq!(moved[0].parent, b);
    assert_eq!(moved[0].path, format!("/{}/{}", b, child));
}

#[test]
fn test_update_rejects_duplicate_idnumber() {
    let (_tmp, store, _registry) = setup();
    let gate = OpenGate;
    let admin = Actor::admin("admin");

    let first = CategorySpec {
        idnumber: Some("TAKEN".to_string()),
        ..spec("First", 0)
    };
    let second = spec("Second", 0);
    let created = create_categories(&store, &gate, &admin, &[first, second]).unwrap();

    let err = update_categories(
        &store,
        &gate,
        &admin,
        &[CategoryUpdate {
            id: created[1].id,
            idnumber: Some("TAKEN".to_string()),
            ..Default::default()
        }],
    )
    .unwrap_err();
    assert_eq!(err.code(), "duplicatevalue");
}

#[test]
fn test_delete_recursive_and_reparenting() {
    let (_tmp, store, registry) = setup();
    let gate = OpenGate;
    let admin = Actor::admin("admin");

    let root = create_categories(&store, &gate, &admin, &[spec("Root", 0)]).unwrap()[0].id;
    let child = create_categories(&store, &gate, &admin, &[spec("Child", root)]).unwrap()[0].id;
    let grandchild =
        create_categories(&store, &gate, &admin, &[spec("Grandchild", child)]).unwrap()[0].id;

    // Non-recursive delete of the middle layer lifts its children up.
    delete_categories(
        &store,
        &gate,
        &admin,
        &registry,
        &[CategoryDelete {
            id: child,
            recursive: false,
        }],
    )
    .unwrap();
    let remaining = get_categories(&store, &gate, &admin, &[], false).unwrap();
    let ids: Vec<i64> = remaining.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![root, grandchild]);

    // Recursive delete takes the whole subtree.
    delete_categories(
        &store,
        &gate,
        &admin,
        &registry,
        &[CategoryDelete {
            id: root,
            recursive: true,
        }],
    )
    .unwrap();
    assert!(get_categories(&store, &gate, &admin, &[], false).unwrap().is_empty());
}

#[test]
fn test_hide_and_show_restores_prior_visibility() {
    let (_tmp, store, _registry) = setup();
    let gate = OpenGate;
    let admin = Actor::admin("admin");

    let root = create_categories(&store, &gate, &admin, &[spec("Root", 0)]).unwrap()[0].id;
    let shown = create_categories(&store, &gate, &admin, &[spec("Shown", root)]).unwrap()[0].id;
    let hidden_spec = CategorySpec {
        visible: Some(false),
        ..spec("AlwaysHidden", root)
    };
    let hidden = create_categories(&store, &gate, &admin, &[hidden_spec]).unwrap()[0].id;

    let hide = CategoryUpdate {
        id: root,
        visible: Some(false),
        ..Default::default()
    };
    update_categories(&store, &gate, &admin, &[hide]).unwrap();
    let all = get_categories(&store, &gate, &admin, &[Criterion::new("visible", "1")], false)
        .unwrap();
    assert!(all.is_empty());

    let show = CategoryUpdate {
        id: root,
        visible: Some(true),
        ..Default::default()
    };
    update_categories(&store, &gate, &admin, &[show]).unwrap();
    let visible_now: Vec<i64> = get_categories(
        &store,
        &gate,
        &admin,
        &[Criterion::new("visible", "1")],
        false,
    )
    .unwrap()
    .iter()
    .map(|c| c.id)
    .collect();
    // The child hidden before the cascade stays hidden afterwards.
    assert!(visible_now.contains(&root));
    assert!(visible_now.contains(&shown));
    assert!(!visible_now.contains(&hidden));
}

#[test]
fn test_batch_create_aborts_on_empty_name() {
    let (_tmp, store, _registry) = setup();
    let gate = OpenGate;
    let admin = Actor::admin("admin");

    let err = create_categories(&store, &gate, &admin, &[spec("Ok", 0), spec("  ", 0)])
        .unwrap_err();
    assert_eq!(err.code(), "invalidparameter");
    // The first item of the batch was already committed.
    let remaining = get_categories(&store, &gate, &admin, &[], false).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].name, "Ok");
}
