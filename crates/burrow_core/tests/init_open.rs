use burrow_core::{
    initialize, resolve_db_location, ConnectionLayer, EngineOptions, InitError, InitOptions,
    OpenError, PathError,
};
use rusqlite::{Connection, ErrorCode};
use std::path::{Path, PathBuf};

#[test]
fn initialize_twice_with_empty_migrations_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("app.sqlite");

    let first = initialize(options_at(&db_path)).unwrap();
    assert_queryable(first.connection());
    assert!(first.applied_migrations().unwrap().is_empty());
    drop(first);

    let second = initialize(options_at(&db_path)).unwrap();
    assert_queryable(second.connection());
    assert!(second.applied_migrations().unwrap().is_empty());
    second.close().unwrap();
}

#[test]
fn default_resolution_places_db_under_app_data_dir_with_one_suffix() {
    let plain = resolve_db_location("burrow-tests", "notes", None).unwrap();
    let suffixed = resolve_db_location("burrow-tests", "notes.sqlite", None).unwrap();

    assert_eq!(plain, suffixed);
    assert!(plain.file_path.starts_with(&plain.data_dir));
    assert_eq!(
        plain.file_path.file_name().and_then(|name| name.to_str()),
        Some("notes.sqlite")
    );
}

#[test]
fn blank_application_name_fails_in_the_path_stage() {
    let mut options = InitOptions::new("   ", "notes");
    options.path = Some(PathBuf::from("/tmp/never-used.sqlite"));

    let err = initialize(options).unwrap_err();
    assert!(matches!(
        err,
        InitError::Path(PathError::EmptyApplicationName)
    ));
}

#[test]
fn explicit_path_naming_a_directory_fails_with_native_cantopen() {
    let dir = tempfile::tempdir().unwrap();

    // First open creates the nested directory for its database file.
    let nested_db = dir.path().join("foo").join("app.sqlite");
    let handle = initialize(options_at(&nested_db)).unwrap();
    assert_queryable(handle.connection());
    drop(handle);

    // The database name is never appended to an explicit path, so pointing
    // at the now-existing directory is an engine-level refusal.
    let err = initialize(options_at(&dir.path().join("foo"))).unwrap_err();
    match err {
        InitError::Open(OpenError::Engine(engine_err)) => {
            assert_eq!(engine_err.sqlite_error_code(), Some(ErrorCode::CannotOpen));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn create_if_missing_off_refuses_to_create_a_new_file() {
    let dir = tempfile::tempdir().unwrap();

    let mut options = options_at(&dir.path().join("absent.sqlite"));
    options.engine = EngineOptions {
        create_if_missing: false,
        ..EngineOptions::default()
    };

    let err = initialize(options).unwrap_err();
    match err {
        InitError::Open(OpenError::Engine(engine_err)) => {
            assert_eq!(engine_err.sqlite_error_code(), Some(ErrorCode::CannotOpen));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn caller_casing_layers_are_replaced_by_the_canonical_one() {
    let dir = tempfile::tempdir().unwrap();

    let mut options = options_at(&dir.path().join("layered.sqlite"));
    options.layers = vec![Box::new(RivalCasingLayer), Box::new(StrictLikeLayer)];

    let handle = initialize(options).unwrap();
    assert_eq!(handle.layer_names(), vec!["strict_like", "camel_case"]);

    let camel: String = handle
        .connection()
        .query_row("SELECT app_ident('user_id');", [], |row| row.get(0))
        .unwrap();
    assert_eq!(camel, "userId");

    let snake: String = handle
        .connection()
        .query_row("SELECT storage_ident('userId');", [], |row| row.get(0))
        .unwrap();
    assert_eq!(snake, "user_id");
}

struct RivalCasingLayer;

impl ConnectionLayer for RivalCasingLayer {
    fn name(&self) -> &'static str {
        "rival_casing"
    }

    fn is_casing_layer(&self) -> bool {
        true
    }

    fn install(&self, _conn: &Connection) -> rusqlite::Result<()> {
        panic!("a caller casing layer must never be installed");
    }
}

struct StrictLikeLayer;

impl ConnectionLayer for StrictLikeLayer {
    fn name(&self) -> &'static str {
        "strict_like"
    }

    fn install(&self, conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch("PRAGMA case_sensitive_like = ON;")
    }
}

fn options_at(db_path: &Path) -> InitOptions {
    let mut options = InitOptions::new("burrow-tests", "app");
    options.path = Some(db_path.to_path_buf());
    options
}

fn assert_queryable(conn: &Connection) {
    let version: String = conn
        .query_row("SELECT sqlite_version();", [], |row| row.get(0))
        .unwrap();
    assert!(!version.is_empty());
}
