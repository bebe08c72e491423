use curricula::core::db::{db_connect, initialize_catalog_db};
use curricula::core::modplugin::PluginRegistry;
use curricula::core::store::Store;
use curricula::core::tree::{
    self, delete_subtree, insert_category, move_subtree, renumber_range, CategoryAttrs, ROOT,
};
use rusqlite::Connection;
use tempfile::tempdir;

fn setup() -> (tempfile::TempDir, Connection) {
    let tmp = tempdir().unwrap();
    let store = Store::new(tmp.path());
    let registry = PluginRegistry::with_builtins();
    initialize_catalog_db(&store, &registry).unwrap();
    let conn = db_connect(&store.db_path().to_string_lossy()).unwrap();
    (tmp, conn)
}

fn add(conn: &Connection, parent: i64, name: &str) -> i64 {
    insert_category(conn, parent, &CategoryAttrs::named(name)).unwrap()
}

fn sortorder(conn: &Connection, id: i64) -> i64 {
    conn.query_row("SELECT sortorder FROM categories WHERE id = ?1", [id], |r| {
        r.get(0)
    })
    .unwrap()
}

fn path(conn: &Connection, id: i64) -> String {
    conn.query_row("SELECT path FROM categories WHERE id = ?1", [id], |r| {
        r.get(0)
    })
    .unwrap()
}

#[test]
fn test_sortorder_is_dense_depth_first() {
    let (_tmp, conn) = setup();

    // Two roots, each with children, built out of order.
    let a = add(&conn, ROOT, "A");
    let b = add(&conn, ROOT, "B");
    let a1 = add(&conn, a, "A1");
    let b1 = add(&conn, b, "B1");
    let a2 = add(&conn, a, "A2");

    // Depth-first: A, A1, A2, B, B1 with no gaps.
    let expected = [a, a1, a2, b, b1];
    for (rank, id) in expected.iter().enumerate() {
        assert_eq!(sortorder(&conn, *id), rank as i64 + 1, "node {}", id);
    }
}

#[test]
fn test_new_root_sorts_after_existing_forest() {
    let (_tmp, conn) = setup();
    let a = add(&conn, ROOT, "A");
    let _a1 = add(&conn, a, "A1");
    let b = add(&conn, ROOT, "B");
    assert_eq!(sortorder(&conn, b), 3);
}

#[test]
fn test_move_rewrites_descendant_paths() {
    let (_tmp, conn) = setup();
    let a = add(&conn, ROOT, "A");
    let b = add(&conn, ROOT, "B");
    let child = add(&conn, a, "child");
    let grandchild = add(&conn, child, "grandchild");

    assert_eq!(path(&conn, grandchild), format!("/{}/{}/{}", a, child, grandchild));

    move_subtree(&conn, child, b).unwrap();

    assert_eq!(path(&conn, child), format!("/{}/{}", b, child));
    assert_eq!(path(&conn, grandchild), format!("/{}/{}/{}", b, child, grandchild));
    // The moved subtree keeps its internal order and follows B.
    assert!(sortorder(&conn, b) < sortorder(&conn, child));
    assert!(sortorder(&conn, child) < sortorder(&conn, grandchild));
}

#[test]
fn test_move_round_trip_restores_exact_paths() {
    let (_tmp, conn) = setup();
    let a = add(&conn, ROOT, "A");
    let b = add(&conn, ROOT, "B");
    let child = add(&conn, a, "child");
    let before = path(&conn, child);

    move_subtree(&conn, child, b).unwrap();
    move_subtree(&conn, child, a).unwrap();

    assert_eq!(path(&conn, child), before);
}

#[test]
fn test_move_into_own_subtree_is_cyclic() {
    let (_tmp, conn) = setup();
    let a = add(&conn, ROOT, "A");
    let child = add(&conn, a, "child");
    let grandchild = add(&conn, child, "grandchild");

    let err = move_subtree(&conn, a, grandchild).unwrap_err();
    assert_eq!(err.code(), "cyclicparent");
    let err = move_subtree(&conn, a, a).unwrap_err();
    assert_eq!(err.code(), "cyclicparent");
    // Nothing moved.
    assert_eq!(path(&conn, a), format!("/{}", a));
}

#[test]
fn test_nonrecursive_delete_reparents_children() {
    let (_tmp, conn) = setup();
    let registry = PluginRegistry::with_builtins();
    let a = add(&conn, ROOT, "A");
    let child = add(&conn, a, "child");
    let grandchild = add(&conn, child, "grandchild");

    delete_subtree(&conn, &registry, child, false).unwrap();

    // grandchild now hangs off A directly.
    let parent: i64 = conn
        .query_row("SELECT parent FROM categories WHERE id = ?1", [grandchild], |r| {
            r.get(0)
        })
        .unwrap();
    assert_eq!(parent, a);
    assert_eq!(path(&conn, grandchild), format!("/{}/{}", a, grandchild));
}

#[test]
fn test_nonrecursive_delete_refuses_courses() {
    let (_tmp, conn) = setup();
    let registry = PluginRegistry::with_builtins();
    let a = add(&conn, ROOT, "A");
    conn.execute(
        "INSERT INTO courses (category, fullname, shortname, summary, summaryformat,
                              timecreated, timemodified)
         VALUES (?1, 'C', 'c', '', 1, '0Z', '0Z')",
        [a],
    )
    .unwrap();

    let err = delete_subtree(&conn, &registry, a, false).unwrap_err();
    assert_eq!(err.code(), "categorynotempty");

    // Recursive delete takes the course down with it.
    delete_subtree(&conn, &registry, a, true).unwrap();
    let courses: i64 = conn
        .query_row("SELECT COUNT(*) FROM courses", [], |r| r.get(0))
        .unwrap();
    assert_eq!(courses, 0);
}

#[test]
fn test_renumber_range_closes_gaps_among_siblings() {
    let (_tmp, conn) = setup();
    let a = add(&conn, ROOT, "A");
    let c1 = add(&conn, a, "c1");
    let c2 = add(&conn, a, "c2");
    let c3 = add(&conn, a, "c3");

    // Punch a hole in the middle.
    conn.execute("DELETE FROM categories WHERE id = ?1", [c2]).unwrap();
    renumber_range(&conn, a).unwrap();

    let s1 = sortorder(&conn, c1);
    let s3 = sortorder(&conn, c3);
    assert_eq!(s3, s1 + 1);
}

#[test]
fn test_subtree_ids_covers_node_and_descendants() {
    let (_tmp, conn) = setup();
    let a = add(&conn, ROOT, "A");
    let child = add(&conn, a, "child");
    let grandchild = add(&conn, child, "grandchild");
    let _b = add(&conn, ROOT, "B");

    let ids = tree::subtree_ids(&conn, a, &path(&conn, a)).unwrap();
    assert_eq!(ids, vec![a, child, grandchild]);
}
