use super::{normalize_database_url, prepare_database_url, resolve_settings, Settings};

use std::collections::HashMap;

fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn defaults_apply_without_file_or_env() {
    let settings = resolve_settings(&HashMap::new(), &HashMap::new());
    let defaults = Settings::default();
    assert_eq!(settings.bind_addr, "127.0.0.1:8080");
    assert_eq!(settings.database_url, defaults.database_url);
    assert_eq!(settings.public_url, "http://127.0.0.1:8080/storage");
    assert_eq!(settings.cache_ttl_seconds, 3600);
}

#[test]
fn env_overrides_file_and_prefixed_env_wins() {
    let file = map(&[
        ("bind_addr", "0.0.0.0:9000"),
        ("storage_root", "/srv/files"),
        ("jwt_ttl_seconds", "60"),
    ]);
    let env = map(&[
        ("SERVER_BIND", "0.0.0.0:9001"),
        ("APP__BIND_ADDR", "0.0.0.0:9002"),
        ("JWT_SECRET", "plain"),
        ("APP__CACHE_TTL_SECONDS", "5"),
        ("APP__JWT_TTL_SECONDS", "not-a-number"),
    ]);

    let settings = resolve_settings(&file, &env);
    assert_eq!(settings.bind_addr, "0.0.0.0:9002");
    assert_eq!(settings.storage_root, "/srv/files");
    assert_eq!(settings.jwt_secret, "plain");
    assert_eq!(settings.cache_ttl_seconds, 5);
    assert_eq!(settings.jwt_ttl_seconds, 60);
}

#[test]
fn normalizes_plain_file_path_to_sqlite_url() {
    assert_eq!(
        normalize_database_url("./data/test.db"),
        "sqlite://./data/test.db"
    );
    assert_eq!(normalize_database_url("sqlite:cms.db"), "sqlite://cms.db");
    assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
    assert_eq!(normalize_database_url("  "), Settings::default().database_url);
}

#[test]
fn creates_parent_dir_for_sqlite_url() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("data").join("test.db");

    prepare_database_url(db_path.to_string_lossy().as_ref()).expect("prepare db url");
    assert!(dir.path().join("data").exists());
}

#[tokio::test]
async fn prepared_database_url_creates_openable_sqlite_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("nested").join("cms.db");

    let prepared = prepare_database_url(db_path.to_string_lossy().as_ref()).expect("prepare");
    let storage = storage::Storage::new(&prepared).await.expect("open sqlite");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should be created: {}",
        db_path.display()
    );
}
