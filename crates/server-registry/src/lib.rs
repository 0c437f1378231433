//! Durable name → configuration mapping for managed servers.
//!
//! The registry is a JSON array of [`ServerEntry`] objects. Every mutation is
//! applied to a copy of the in-memory list, persisted, and only then committed,
//! so a failed write leaves both the file and the in-memory view untouched.
//! Writes go to a sibling temporary file that is renamed over the target.

use common::{HostError, HostResult, ServerEntry, ServerFields};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

pub struct RegistryStore {
    path: PathBuf,
    // Single writer: every mutation holds this across persist.
    entries: Mutex<Vec<ServerEntry>>,
}

impl RegistryStore {
    /// Open the registry at `path`, loading any persisted entries.
    pub fn open<P: AsRef<Path>>(path: P) -> HostResult<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = load_entries(&path)?;
        info!(path = %path.display(), entries = entries.len(), "registry loaded");

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the persisted state from disk.
    pub fn load(&self) -> HostResult<Vec<ServerEntry>> {
        load_entries(&self.path)
    }

    /// Replace the whole registry with `entries`.
    pub fn save(&self, entries: &[ServerEntry]) -> HostResult<()> {
        let mut guard = self.lock();
        save_entries(&self.path, entries)?;
        *guard = entries.to_vec();
        Ok(())
    }

    pub fn list(&self) -> Vec<ServerEntry> {
        self.lock().clone()
    }

    pub fn get(&self, name: &str) -> HostResult<ServerEntry> {
        self.lock()
            .iter()
            .find(|entry| entry.name == name)
            .cloned()
            .ok_or_else(|| HostError::not_found(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().iter().any(|entry| entry.name == name)
    }

    /// Append `entry`; fails with `DuplicateName` if the name is taken.
    pub fn create(&self, entry: ServerEntry) -> HostResult<ServerEntry> {
        common::validate_name(&entry.name)?;
        self.mutate(|entries| {
            if entries.iter().any(|existing| existing.name == entry.name) {
                return Err(HostError::duplicate(&entry.name));
            }
            entries.push(entry.clone());
            Ok(entry.clone())
        })
        .map(|entry| {
            info!(name = %entry.name, mode = %entry.mode, port = entry.port, "server registered");
            entry
        })
    }

    /// Replace the entry keyed by `name`. The stored name never changes.
    pub fn update(&self, name: &str, mut entry: ServerEntry) -> HostResult<ServerEntry> {
        entry.name = name.to_string();
        self.mutate(|entries| {
            let slot = entries
                .iter_mut()
                .find(|existing| existing.name == name)
                .ok_or_else(|| HostError::not_found(name))?;
            *slot = entry.clone();
            Ok(entry.clone())
        })
        .map(|entry| {
            info!(name, "server updated");
            entry
        })
    }

    /// Overwrite only the fields present in `fields`.
    pub fn edit(&self, name: &str, fields: &ServerFields) -> HostResult<ServerEntry> {
        self.mutate(|entries| {
            let slot = entries
                .iter_mut()
                .find(|existing| existing.name == name)
                .ok_or_else(|| HostError::not_found(name))?;
            slot.apply(fields);
            Ok(slot.clone())
        })
        .map(|entry| {
            info!(name, "server edited");
            entry
        })
    }

    /// Drop the entry keyed by `name`. Neither its directories nor a running
    /// instance are touched.
    pub fn remove(&self, name: &str) -> HostResult<ServerEntry> {
        self.mutate(|entries| {
            let index = entries
                .iter()
                .position(|existing| existing.name == name)
                .ok_or_else(|| HostError::not_found(name))?;
            Ok(entries.remove(index))
        })
        .map(|entry| {
            info!(name, "server removed from registry");
            entry
        })
    }

    /// Other entries that claim the same port. Informational only.
    pub fn port_users(&self, port: u16, except: &str) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|entry| entry.port == port && entry.name != except)
            .map(|entry| entry.name.clone())
            .collect()
    }

    fn mutate<T>(
        &self,
        op: impl FnOnce(&mut Vec<ServerEntry>) -> HostResult<T>,
    ) -> HostResult<T> {
        let mut guard = self.lock();
        let mut staged = guard.clone();
        let out = op(&mut staged)?;
        save_entries(&self.path, &staged)?;
        *guard = staged;
        Ok(out)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ServerEntry>> {
        self.entries.lock().expect("registry mutex poisoned")
    }
}

/// Read the entries persisted at `path`; a missing file is an empty registry.
pub fn load_entries(path: &Path) -> HostResult<Vec<ServerEntry>> {
    if !path.exists() {
        debug!(path = %path.display(), "no registry file yet");
        return Ok(Vec::new());
    }

    let data = fs::read_to_string(path)
        .map_err(|e| HostError::io(format!("reading {}", path.display()), e))?;
    serde_json::from_str(&data).map_err(|source| HostError::CorruptRegistry {
        path: path.to_path_buf(),
        source,
    })
}

/// Serialise `entries` and atomically replace the file at `path`.
pub fn save_entries(path: &Path, entries: &[ServerEntry]) -> HostResult<()> {
    let mut json = serde_json::to_string_pretty(entries)
        .map_err(|e| encode_error(path, e))?;
    json.push('\n');

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| HostError::io(format!("creating {}", parent.display()), e))?;
    }

    let tmp = temp_path(path);
    let write = || -> std::io::Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    };

    write().map_err(|e| {
        let _ = fs::remove_file(&tmp);
        HostError::io(format!("writing {}", path.display()), e)
    })?;

    debug!(path = %path.display(), entries = entries.len(), "registry persisted");
    Ok(())
}

// Encoding failures say nothing about the file on disk, so they are not
// reported as a corrupt registry.
fn encode_error(path: &Path, err: serde_json::Error) -> HostError {
    HostError::io(format!("encoding {}", path.display()), err.into())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "registry".into());
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ServerMode;
    use tracing_test::traced_test;

    fn entry(name: &str, port: u16) -> ServerEntry {
        ServerEntry::new(name, ServerMode::Site, "127.0.0.1", port, 1.0)
    }

    #[test]
    fn temp_file_sits_next_to_target() {
        assert_eq!(
            temp_path(Path::new("/srv/servers.json")),
            PathBuf::from("/srv/servers.json.tmp")
        );
    }

    #[test]
    fn failed_persist_leaves_memory_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("servers.json");
        let store = RegistryStore::open(&path).unwrap();
        store.create(entry("blog", 8080)).unwrap();

        // A directory squatting on the temp path makes the next write fail.
        fs::create_dir(temp_path(&path)).unwrap();
        assert!(matches!(
            store.create(entry("shop", 8081)),
            Err(HostError::Io { .. })
        ));
        assert_eq!(store.list(), vec![entry("blog", 8080)]);
        assert_eq!(store.load().unwrap(), vec![entry("blog", 8080)]);
    }

    #[test]
    fn encoding_failure_is_not_a_corrupt_registry() {
        let err = serde_json::from_str::<u8>("x").unwrap_err();
        let mapped = encode_error(Path::new("/srv/servers.json"), err);
        assert!(matches!(mapped, HostError::Io { .. }));
        assert!(mapped.to_string().starts_with("IO error while encoding /srv/servers.json"));
    }

    #[test]
    #[traced_test]
    fn mutations_are_logged() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::open(dir.path().join("servers.json")).unwrap();
        store.create(entry("blog", 8080)).unwrap();
        store.remove("blog").unwrap();

        assert!(logs_contain("server registered"));
        assert!(logs_contain("server removed from registry"));
    }

    #[test]
    fn port_users_excludes_self() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::open(dir.path().join("servers.json")).unwrap();
        store.create(entry("blog", 8080)).unwrap();
        store.create(entry("shop", 8080)).unwrap();
        store.create(entry("files", 9000)).unwrap();

        assert_eq!(store.port_users(8080, "blog"), vec!["shop".to_string()]);
        assert!(store.port_users(9000, "files").is_empty());
    }
}
