#![allow(missing_docs)]

use std::fs;
use std::path::PathBuf;

use rusqlite::Connection;
use tablecraft::backend::{
    is_sqlite_file, key_index_name, key_trigger_name, Backend, BackendOptions, ErrorKind, Flow,
    MemoryMode, SeekError, StoreMode, ViewSpec, SPILL_FILE_NAME,
};
use tempfile::TempDir;

fn setup_db(name: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join(format!("{name}.db"));
    let conn = Connection::open(&path).expect("create db");
    conn.execute_batch(
        "CREATE TABLE people(name TEXT);
         INSERT INTO people(name) VALUES ('ada'), ('grace'), ('edsger');",
    )
    .expect("seed");
    (dir, path)
}

fn scratch_opts(dir: &TempDir) -> BackendOptions {
    BackendOptions::default().scratch_root(dir.path().join("scratch"))
}

#[test]
fn sqlite_file_opens_in_connected_mode() {
    let (dir, path) = setup_db("connected");
    assert!(is_sqlite_file(&path));
    let backend = Backend::open(Some(&path), &scratch_opts(&dir)).expect("open");
    assert_eq!(backend.store_mode(), Some(StoreMode::Connected));
    assert_eq!(backend.db_path(), Some(path.as_path()));
    assert!(backend.scratch_dir().is_none());
    assert!(backend.table_exists("people").expect("tables"));
    assert!(!dir.path().join("scratch").exists());
}

#[test]
fn non_sqlite_input_falls_back_to_ephemeral_store() {
    let dir = TempDir::new().expect("tempdir");
    let text = dir.path().join("notes.csv");
    fs::write(&text, "a,b\n1,2\n").expect("write text");
    assert!(!is_sqlite_file(&text));

    let backend = Backend::open(Some(&text), &scratch_opts(&dir)).expect("open");
    assert_eq!(backend.store_mode(), Some(StoreMode::Ephemeral));
    let scratch = backend.scratch_dir().expect("scratch dir");
    assert!(scratch.starts_with(dir.path().join("scratch")));
    assert!(scratch.join(SPILL_FILE_NAME).exists());
    assert!(backend.table_names().expect("tables").is_empty());
    assert_eq!(fs::read_to_string(&text).expect("read"), "a,b\n1,2\n");
}

#[test]
fn missing_path_opens_ephemeral_store() {
    let dir = TempDir::new().expect("tempdir");
    let absent = dir.path().join("absent.db");
    let backend = Backend::open(Some(&absent), &scratch_opts(&dir)).expect("open");
    assert_eq!(backend.store_mode(), Some(StoreMode::Ephemeral));
    assert!(!absent.exists());
}

#[test]
fn ephemeral_stores_do_not_share_directories() {
    let dir = TempDir::new().expect("tempdir");
    let opts = scratch_opts(&dir);
    let a = Backend::open(None, &opts).expect("first");
    let b = Backend::open(None, &opts).expect("second");
    assert_ne!(a.scratch_dir(), b.scratch_dir());
}

#[test]
fn close_removes_scratch_and_is_idempotent() {
    let dir = TempDir::new().expect("tempdir");
    let mut backend = Backend::open(None, &scratch_opts(&dir)).expect("open");
    let scratch = backend.scratch_dir().expect("scratch").to_path_buf();
    assert!(scratch.exists());

    backend.close().expect("close");
    assert!(!scratch.exists());
    assert!(backend.is_closed());
    assert_eq!(backend.store_mode(), None);
    backend.close().expect("second close");

    let err = backend.table_names().expect_err("closed");
    assert!(matches!(err, SeekError::NotReady(_)));
    assert_eq!(err.kind(), ErrorKind::State);
}

#[test]
fn drop_removes_scratch() {
    let dir = TempDir::new().expect("tempdir");
    let backend = Backend::open(None, &scratch_opts(&dir)).expect("open");
    let scratch = backend.scratch_dir().expect("scratch").to_path_buf();
    drop(backend);
    assert!(!scratch.exists());
}

#[test]
fn close_keeps_connected_file() {
    let (dir, path) = setup_db("keep");
    let mut backend = Backend::open(Some(&path), &scratch_opts(&dir)).expect("open");
    backend.close().expect("close");
    assert!(path.exists());
    assert!(is_sqlite_file(&path));
}

#[test]
fn memory_modes_set_cache_budget() {
    let dir = TempDir::new().expect("tempdir");
    for (mode, kib) in [
        (MemoryMode::Auto, 16 * 1024),
        (MemoryMode::LowRam, 8 * 1024),
        (MemoryMode::Normal, 32 * 1024),
    ] {
        let mut backend =
            Backend::open(None, &scratch_opts(&dir).mode(mode)).expect("open");
        assert_eq!(backend.memory_mode(), mode);
        let conn = backend.raw_connection().expect("connection");
        let cache: i64 = conn
            .pragma_query_value(None, "cache_size", |row| row.get(0))
            .expect("cache_size");
        assert_eq!(cache, -kib);
        let journal: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .expect("journal_mode");
        assert_eq!(journal.to_lowercase(), "wal");
        let synchronous: i64 = conn
            .pragma_query_value(None, "synchronous", |row| row.get(0))
            .expect("synchronous");
        assert_eq!(synchronous, 1);
    }
}

#[test]
fn stable_key_persists_in_connected_file() {
    let (dir, path) = setup_db("persist");
    let mut backend = Backend::open(Some(&path), &scratch_opts(&dir)).expect("open");
    backend.ensure_stable_key("people", "_id").expect("key");
    backend.close().expect("close");

    let conn = Connection::open(&path).expect("reopen");
    let objects: Vec<String> = conn
        .prepare("SELECT name FROM sqlite_master WHERE tbl_name = 'people' AND type IN ('index', 'trigger') ORDER BY name")
        .expect("prepare")
        .query_map([], |row| row.get(0))
        .expect("query")
        .collect::<rusqlite::Result<_>>()
        .expect("collect");
    assert_eq!(
        objects,
        vec![
            key_index_name("people", "_id"),
            key_trigger_name("people", "_id")
        ]
    );
    let max: i64 = conn
        .query_row("SELECT MAX(_id) FROM people", [], |row| row.get(0))
        .expect("max key");
    assert_eq!(max, 3);
}

#[test]
fn view_is_temporary() {
    let (dir, path) = setup_db("temp-view");
    let mut backend = Backend::open(Some(&path), &scratch_opts(&dir)).expect("open");
    backend.ensure_stable_key("people", "_id").expect("key");
    backend
        .set_view(ViewSpec::new("people"), None)
        .expect("view");
    backend.close().expect("close");

    let conn = Connection::open(&path).expect("reopen");
    let views: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'view'",
            [],
            |row| row.get(0),
        )
        .expect("count views");
    assert_eq!(views, 0);
}

#[test]
fn save_as_writes_a_standalone_copy() {
    let dir = TempDir::new().expect("tempdir");
    let mut backend = Backend::open(None, &scratch_opts(&dir)).expect("open");
    backend.ensure_table("t", "val INTEGER").expect("table");
    backend
        .raw_connection()
        .expect("connection")
        .execute_batch("INSERT INTO t(val) VALUES (1), (2), (3)")
        .expect("insert");

    let dest = dir.path().join("out").join("saved.db");
    backend.save_as(&dest).expect("save");
    assert!(is_sqlite_file(&dest));
    let conn = Connection::open(&dest).expect("open copy");
    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
        .expect("count");
    assert_eq!(rows, 3);

    let err = backend.save_as(&dest).expect_err("destination exists");
    assert_eq!(err.kind(), ErrorKind::Io);
    match err {
        SeekError::Io { op, path, source } => {
            assert_eq!(op, "save_as");
            assert_eq!(path, dest);
            assert_eq!(source.kind(), std::io::ErrorKind::AlreadyExists);
        }
        other => panic!("unexpected error: {other}"),
    }

    let live = backend.db_path().expect("live path").to_path_buf();
    let err = backend.save_as(&live).expect_err("same file");
    assert_eq!(err.kind(), ErrorKind::Io);
}

#[test]
fn reads_require_a_view() {
    let (dir, path) = setup_db("no-view");
    let backend = Backend::open(Some(&path), &scratch_opts(&dir)).expect("open");
    for err in [
        backend.seek_first(5, |_| Flow::Continue).expect_err("first"),
        backend.seek_after(1, 5, |_| Flow::Continue).expect_err("after"),
        backend.seek_before(9, 5, |_| Flow::Continue).expect_err("before"),
        backend.seek_by_id(1, 5, |_| Flow::Continue).expect_err("by id"),
        backend.count().expect_err("count"),
    ] {
        assert!(matches!(err, SeekError::NoView { .. }), "{err}");
    }
}

#[test]
fn ddl_failures_are_classified() {
    let (dir, path) = setup_db("ddl");
    let mut backend = Backend::open(Some(&path), &scratch_opts(&dir)).expect("open");
    let err = backend
        .ensure_table("broken", "val INTEGER,,")
        .expect_err("bad column list");
    assert_eq!(err.kind(), ErrorKind::Ddl);

    let err = backend
        .ensure_stable_key("missing", "_id")
        .expect_err("no such table");
    assert_eq!(err.kind(), ErrorKind::Ddl);

    let err = backend
        .set_view(ViewSpec::new("missing"), None)
        .expect_err("no such table");
    assert_eq!(err.kind(), ErrorKind::Ddl);
}

#[test]
fn ensure_table_is_idempotent() {
    let dir = TempDir::new().expect("tempdir");
    let mut backend = Backend::open(None, &scratch_opts(&dir)).expect("open");
    backend.ensure_table("t", "val INTEGER").expect("create");
    backend
        .raw_connection()
        .expect("connection")
        .execute_batch("INSERT INTO t(val) VALUES (41)")
        .expect("insert");
    backend
        .ensure_table("t", "val INTEGER")
        .expect("second call on existing table");
    backend
        .ensure_table("t", "other TEXT, columns REAL")
        .expect("existing table is left as-is");

    assert_eq!(backend.table_names().expect("tables"), vec!["t".to_string()]);
    let val: i64 = backend
        .raw_connection()
        .expect("connection")
        .query_row("SELECT val FROM t", [], |row| row.get(0))
        .expect("row kept");
    assert_eq!(val, 41);
}

#[test]
fn unusable_scratch_root_fails_with_io_kind() {
    let dir = TempDir::new().expect("tempdir");
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, "not a directory").expect("write blocker");
    let root = blocker.join("scratch");
    let err = Backend::open(None, &BackendOptions::default().scratch_root(&root))
        .expect_err("root under a file");
    assert_eq!(err.kind(), ErrorKind::Io);
    assert!(err.to_string().contains(&root.display().to_string()), "{err}");
}
