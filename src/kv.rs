use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Host-provided persistent key-value capability. Injected by reference so
/// stores never reach for ambient globals.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, KvError>;
    fn set(&self, key: &str, value: &str) -> Result<(), KvError>;
    fn delete(&self, key: &str) -> Result<(), KvError>;
}

/// File-backed store keeping a single JSON object map on disk. Every access
/// goes through one mutex, so a read can never observe a half-written file
/// and read-modify-write cycles cannot interleave if the host ever
/// parallelizes commands.
pub struct FileKvStore {
    path: PathBuf,
    file_lock: Mutex<()>,
}

impl FileKvStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            file_lock: Mutex::new(()),
        }
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>, KvError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => return Err(KvError::Io(err)),
        };
        Ok(serde_json::from_str(&contents)?)
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<(), KvError> {
        if let Some(parent) = self.path.parent() {
            ensure_dir(parent)?;
        }
        let payload = serde_json::to_string_pretty(map)?;
        fs::write(&self.path, payload)?;
        set_file_permissions(&self.path, 0o600)?;
        Ok(())
    }
}

impl KvStore for FileKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let _guard = lock(&self.file_lock);
        Ok(self.read_map()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        let _guard = lock(&self.file_lock);
        let mut map = self.read_map()?;
        map.insert(key.to_string(), value.to_string());
        self.write_map(&map)
    }

    fn delete(&self, key: &str) -> Result<(), KvError> {
        let _guard = lock(&self.file_lock);
        let mut map = self.read_map()?;
        if map.remove(key).is_some() {
            self.write_map(&map)?;
        }
        Ok(())
    }
}

/// In-memory store for hosts whose key-value primitive is session-scoped,
/// and for tests.
#[derive(Default)]
pub struct MemoryKv {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        Ok(lock(&self.map).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        lock(&self.map).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), KvError> {
        lock(&self.map).remove(key);
        Ok(())
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn ensure_dir(path: &Path) -> Result<(), io::Error> {
    fs::create_dir_all(path)?;
    set_dir_permissions(path, 0o700)?;
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path, mode: u32) -> Result<(), io::Error> {
    use std::os::unix::fs::PermissionsExt;
    let perm = fs::Permissions::from_mode(mode);
    fs::set_permissions(path, perm)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path, mode: u32) -> Result<(), io::Error> {
    use std::os::unix::fs::PermissionsExt;
    let perm = fs::Permissions::from_mode(mode);
    fs::set_permissions(path, perm)
}

#[cfg(not(unix))]
fn set_file_permissions(_path: &Path, _mode: u32) -> Result<(), io::Error> {
    Ok(())
}

#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path, _mode: u32) -> Result<(), io::Error> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> FileKvStore {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "telepane-kv-test-{}-{}.json",
            std::process::id(),
            rand::random::<u64>()
        ));
        FileKvStore::new(path)
    }

    #[test]
    fn file_store_round_trips_values() {
        let store = temp_store();
        assert!(store.get("missing").expect("get").is_none());

        store.set("alpha", "one").expect("set");
        store.set("beta", "two").expect("set");
        assert_eq!(store.get("alpha").expect("get").as_deref(), Some("one"));

        store.delete("alpha").expect("delete");
        assert!(store.get("alpha").expect("get").is_none());
        assert_eq!(store.get("beta").expect("get").as_deref(), Some("two"));

        let _ = fs::remove_file(&store.path);
    }

    #[test]
    fn concurrent_reads_never_observe_a_partial_write() {
        let store = std::sync::Arc::new(temp_store());
        store.set("counter", "0").expect("seed");

        let writer = {
            let store = store.clone();
            std::thread::spawn(move || {
                for n in 0..200 {
                    store.set("counter", &n.to_string()).expect("set");
                }
            })
        };
        let reader = {
            let store = store.clone();
            std::thread::spawn(move || {
                for _ in 0..200 {
                    let value = store.get("counter").expect("get").expect("seeded");
                    value.parse::<u32>().expect("whole value");
                }
            })
        };
        writer.join().expect("writer");
        reader.join().expect("reader");

        let _ = fs::remove_file(&store.path);
    }

    #[test]
    fn deleting_a_missing_key_is_a_no_op() {
        let store = MemoryKv::new();
        store.delete("never-set").expect("delete");
        assert!(store.get("never-set").expect("get").is_none());
    }
}
