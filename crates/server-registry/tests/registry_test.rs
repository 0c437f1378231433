use common::{HostError, ServerEntry, ServerFields, ServerMode};
use server_registry::{load_entries, RegistryStore};
use std::collections::BTreeSet;
use std::fs;

fn entry(name: &str, mode: ServerMode, port: u16) -> ServerEntry {
    ServerEntry::new(name, mode, "192.168.1.20", port, 2.5)
}

#[test]
fn missing_file_is_an_empty_registry() {
    let dir = tempfile::tempdir().unwrap();
    let store = RegistryStore::open(dir.path().join("servers.json")).unwrap();
    assert!(store.list().is_empty());
    assert!(!store.path().exists());
}

#[test]
fn list_matches_surviving_set_after_creates_and_deletes() {
    let dir = tempfile::tempdir().unwrap();
    let store = RegistryStore::open(dir.path().join("servers.json")).unwrap();

    for (i, name) in ["a", "b", "c", "d", "e"].iter().enumerate() {
        store
            .create(entry(name, ServerMode::Storage, 6000 + i as u16))
            .unwrap();
    }
    store.remove("b").unwrap();
    store.remove("e").unwrap();
    store.create(entry("f", ServerMode::Neuro, 6010)).unwrap();

    let names: BTreeSet<String> = store.list().into_iter().map(|e| e.name).collect();
    let expected: BTreeSet<String> = ["a", "c", "d", "f"].iter().map(|s| s.to_string()).collect();
    assert_eq!(names, expected);

    // Same set survives a reopen.
    let reopened = RegistryStore::open(store.path()).unwrap();
    let names: BTreeSet<String> = reopened.list().into_iter().map(|e| e.name).collect();
    assert_eq!(names, expected);
}

#[test]
fn duplicate_name_is_rejected_and_registry_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("servers.json");
    let store = RegistryStore::open(&path).unwrap();

    store.create(entry("blog", ServerMode::Site, 8080)).unwrap();
    let before = fs::read(&path).unwrap();

    let err = store
        .create(entry("blog", ServerMode::Storage, 9090))
        .unwrap_err();
    assert!(matches!(err, HostError::DuplicateName { ref name } if name == "blog"));

    assert_eq!(fs::read(&path).unwrap(), before);
    assert_eq!(store.list(), vec![entry("blog", ServerMode::Site, 8080)]);
}

#[test]
fn update_and_remove_require_existing_name() {
    let dir = tempfile::tempdir().unwrap();
    let store = RegistryStore::open(dir.path().join("servers.json")).unwrap();

    assert!(store
        .update("ghost", entry("ghost", ServerMode::Site, 1))
        .unwrap_err()
        .is_not_found());
    assert!(store.remove("ghost").unwrap_err().is_not_found());
    assert!(store
        .edit("ghost", &ServerFields::default())
        .unwrap_err()
        .is_not_found());
}

#[test]
fn update_keeps_the_key_name() {
    let dir = tempfile::tempdir().unwrap();
    let store = RegistryStore::open(dir.path().join("servers.json")).unwrap();
    store.create(entry("blog", ServerMode::Site, 8080)).unwrap();

    let renamed = entry("other", ServerMode::Storage, 8081);
    let stored = store.update("blog", renamed).unwrap();
    assert_eq!(stored.name, "blog");
    assert_eq!(stored.mode, ServerMode::Storage);
    assert!(store.get("other").is_err());
}

#[test]
fn edit_overwrites_only_given_fields_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("servers.json");
    let store = RegistryStore::open(&path).unwrap();
    store.create(entry("files", ServerMode::Storage, 5000)).unwrap();

    let fields = ServerFields {
        port: Some(5001),
        max_gb: Some(10.0),
        ..ServerFields::default()
    };
    store.edit("files", &fields).unwrap();

    let persisted = load_entries(&path).unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].port, 5001);
    assert_eq!(persisted[0].max_gb, 10.0);
    assert_eq!(persisted[0].mode, ServerMode::Storage);
    assert_eq!(persisted[0].host, "192.168.1.20");
}

#[test]
fn corrupt_file_is_reported_not_recovered() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("servers.json");
    fs::write(&path, "[{\"name\": \"blog\", ").unwrap();

    match RegistryStore::open(&path) {
        Err(HostError::CorruptRegistry { path: reported, .. }) => assert_eq!(reported, path),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("corrupt registry loaded"),
    }
    // Nothing was rewritten behind the caller's back.
    assert_eq!(fs::read_to_string(&path).unwrap(), "[{\"name\": \"blog\", ");
}

#[test]
fn save_of_load_is_byte_stable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("servers.json");
    let store = RegistryStore::open(&path).unwrap();
    store.create(entry("blog", ServerMode::Site, 8080)).unwrap();
    store.create(entry("vault", ServerMode::Storage, 8081)).unwrap();

    let loaded = store.load().unwrap();
    store.save(&loaded).unwrap();
    let first = fs::read(&path).unwrap();

    let loaded = store.load().unwrap();
    store.save(&loaded).unwrap();
    let second = fs::read(&path).unwrap();

    assert_eq!(first, second);
    assert!(!dir.path().join("servers.json.tmp").exists());
}

#[test]
fn reads_files_written_without_quota() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("servers.json");
    fs::write(
        &path,
        r#"[
  {"name": "blog", "mode": "site", "port": 8080, "host": "10.0.0.5"}
]"#,
    )
    .unwrap();

    let store = RegistryStore::open(&path).unwrap();
    let blog = store.get("blog").unwrap();
    assert_eq!(blog.max_gb, common::DEFAULT_MAX_GB);
    assert_eq!(blog.host, "10.0.0.5");
}

#[test]
fn concurrent_edits_of_different_fields_both_land() {
    let dir = tempfile::tempdir().unwrap();
    let store = std::sync::Arc::new(RegistryStore::open(dir.path().join("servers.json")).unwrap());
    store.create(entry("blog", ServerMode::Site, 8080)).unwrap();

    let ports = {
        let store = store.clone();
        std::thread::spawn(move || {
            for port in 9000..9100u16 {
                let fields = ServerFields {
                    port: Some(port),
                    ..ServerFields::default()
                };
                store.edit("blog", &fields).unwrap();
            }
        })
    };
    let sizes = {
        let store = store.clone();
        std::thread::spawn(move || {
            for step in 1..=100u32 {
                let fields = ServerFields {
                    max_gb: Some(f64::from(step)),
                    ..ServerFields::default()
                };
                store.edit("blog", &fields).unwrap();
            }
        })
    };
    ports.join().unwrap();
    sizes.join().unwrap();

    let blog = store.get("blog").unwrap();
    assert_eq!(blog.port, 9099);
    assert_eq!(blog.max_gb, 100.0);
    assert_eq!(load_entries(store.path()).unwrap(), vec![blog]);
}
