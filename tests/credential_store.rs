mod common;

use std::fs;

use whirlpool_session::errors::Error;
use whirlpool_session::{CredentialStore, FileCredentialStore, MemoryCredentialStore};

use common::{at, credential, temp_store};

#[test]
fn missing_file_loads_as_absent() {
    let (_dir, path) = temp_store("missing");
    let store = FileCredentialStore::new(path);
    assert!(store.load().expect("absent is not an error").is_none());
}

#[test]
fn save_then_load_round_trips_every_field() {
    let (_dir, path) = temp_store("roundtrip");
    let store = FileCredentialStore::new(&path);
    let saved = credential("access", "refresh", at(1_700_003_600));

    store.save(&saved).expect("save");
    let loaded = store.load().expect("load").expect("present");

    assert_eq!(loaded, saved);
    assert_eq!(loaded.account_id(), "12345");
    assert_eq!(loaded.said_list(), &serde_json::json!(["WPR1"]));
}

#[test]
fn save_replaces_previous_record_without_leaving_temp_files() {
    let (_dir, path) = temp_store("replace");
    let store = FileCredentialStore::new(&path);
    store
        .save(&credential("first", "r1", at(1_700_000_100)))
        .unwrap();
    store
        .save(&credential("second", "r2", at(1_700_000_200)))
        .unwrap();

    let loaded = store.load().unwrap().unwrap();
    assert_eq!(loaded.access_token(), "second");

    let tmp = path.with_file_name(format!(
        "{}.tmp",
        path.file_name().unwrap().to_string_lossy()
    ));
    assert!(!tmp.exists(), "temp file should be renamed away");
}

#[test]
fn persisted_format_uses_wire_field_names() {
    let (_dir, path) = temp_store("format");
    let store = FileCredentialStore::new(&path);
    store
        .save(&credential("access", "refresh", at(1_700_003_600)))
        .unwrap();

    let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["access_token"], "access");
    assert_eq!(raw["refresh_token"], "refresh");
    assert_eq!(raw["expire_date"], 1_700_003_600);
    assert_eq!(raw["accountId"], "12345");
    assert_eq!(raw["SAID"], serde_json::json!(["WPR1"]));
}

#[test]
fn legacy_record_with_fractional_expiry_loads() {
    let (_dir, path) = temp_store("legacy");
    fs::write(
        &path,
        r#"{"access_token": "a", "refresh_token": "r", "expire_date": 1700003600.512, "accountId": 777, "SAID": ["X"]}"#,
    )
    .unwrap();

    let loaded = FileCredentialStore::new(&path).load().unwrap().unwrap();
    assert_eq!(loaded.expire_date(), at(1_700_003_600));
    assert_eq!(loaded.account_id(), "777");
}

#[test]
fn malformed_record_is_reported_as_corrupt() {
    let (_dir, path) = temp_store("corrupt");
    fs::write(&path, "{ not json").unwrap();

    match FileCredentialStore::new(&path).load() {
        Err(Error::CorruptStore { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("expected CorruptStore, got {:?}", other),
    }
}

#[test]
fn write_failure_surfaces_io_error() {
    let (dir, _) = temp_store("nodir");
    let path = dir.path().join("nested").join("auth.json");

    let err = FileCredentialStore::new(&path)
        .save(&credential("a", "r", at(1_700_000_000)))
        .expect_err("parent directory does not exist");
    assert!(matches!(err, Error::Io(_)));
}

#[test]
fn memory_store_round_trips() {
    let store = MemoryCredentialStore::new();
    assert!(store.load().unwrap().is_none());

    let saved = credential("a", "r", at(1_700_000_000));
    store.save(&saved).unwrap();
    assert_eq!(store.load().unwrap(), Some(saved));
}

#[test]
fn out_of_range_expiry_is_reported_as_corrupt() {
    let (_dir, path) = temp_store("far-future");
    fs::write(
        &path,
        r#"{"access_token": "a", "refresh_token": "r", "expire_date": 1e300}"#,
    )
    .unwrap();

    let err = FileCredentialStore::new(&path)
        .load()
        .expect_err("expiry outside the timestamp range");
    assert!(matches!(err, Error::CorruptStore { .. }), "got {:?}", err);
}
