// Storage backends shared by the response cache and the geocode cache.
// Values are opaque JSON strings keyed by a filesystem-safe name.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tracing::debug;

/// File extension for stored entries
const ENTRY_EXTENSION: &str = "json";

/// Key-value storage for serialized cache entries.
///
/// Keys are hex digests or other filesystem-safe names. Implementations must
/// tolerate concurrent calls for distinct keys.
pub trait Store: Send + Sync {
    /// Read the raw contents stored under `key`.
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// Write `contents` under `key`, replacing any previous value.
    fn write(&self, key: &str, contents: &str) -> Result<()>;

    /// Remove `key`. Returns whether anything was removed.
    fn remove(&self, key: &str) -> Result<bool>;

    /// All keys currently stored.
    fn keys(&self) -> Result<Vec<String>>;

    /// Size in bytes of the value stored under `key` (0 if absent).
    fn size(&self, key: &str) -> Result<u64>;
}

/// One `<key>.json` file per entry under a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create cache directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", key, ENTRY_EXTENSION))
    }
}

impl Store for FileStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read cache file {}", path.display()))?;
        Ok(Some(contents))
    }

    fn write(&self, key: &str, contents: &str) -> Result<()> {
        let path = self.entry_path(key);

        // Write via temp file so readers never observe a partial entry
        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path)
            .with_context(|| format!("Failed to create {}", temp_path.display()))?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
        fs::rename(&temp_path, &path)
            .with_context(|| format!("Failed to move cache file into {}", path.display()))?;

        debug!(path = %path.display(), bytes = contents.len(), "Wrote cache file");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)
            .with_context(|| format!("Failed to delete cache file {}", path.display()))?;
        Ok(true)
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn size(&self, key: &str) -> Result<u64> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(0);
        }
        Ok(fs::metadata(&path)?.len())
    }
}

/// Process-local store, used for tests and as the front layer of [`LayeredStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("Memory store lock poisoned"))
    }
}

impl Store for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn write(&self, key: &str, contents: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), contents.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.lock()?.remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.lock()?.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    fn size(&self, key: &str) -> Result<u64> {
        Ok(self.lock()?.get(key).map(|v| v.len() as u64).unwrap_or(0))
    }
}

/// In-memory map in front of a backing store.
///
/// Reads fill the memory layer from the backing store, writes go to both, so
/// the backing store stays the single source of truth across processes.
pub struct LayeredStore {
    memory: MemoryStore,
    backing: Arc<dyn Store>,
}

impl LayeredStore {
    pub fn new(backing: Arc<dyn Store>) -> Self {
        Self {
            memory: MemoryStore::new(),
            backing,
        }
    }
}

impl Store for LayeredStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        if let Some(hit) = self.memory.read(key)? {
            return Ok(Some(hit));
        }
        let value = self.backing.read(key)?;
        if let Some(ref contents) = value {
            self.memory.write(key, contents)?;
        }
        Ok(value)
    }

    fn write(&self, key: &str, contents: &str) -> Result<()> {
        self.backing.write(key, contents)?;
        self.memory.write(key, contents)
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let in_memory = self.memory.remove(key)?;
        let in_backing = self.backing.remove(key)?;
        Ok(in_memory || in_backing)
    }

    fn keys(&self) -> Result<Vec<String>> {
        self.backing.keys()
    }

    fn size(&self, key: &str) -> Result<u64> {
        self.backing.size(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        assert_eq!(store.read("abc").unwrap(), None);
        store.write("abc", r#"{"a":1}"#).unwrap();
        assert_eq!(store.read("abc").unwrap().as_deref(), Some(r#"{"a":1}"#));
        assert_eq!(store.size("abc").unwrap(), 7);
        assert_eq!(store.keys().unwrap(), vec!["abc".to_string()]);

        assert!(store.remove("abc").unwrap());
        assert!(!store.remove("abc").unwrap());
        assert!(store.keys().unwrap().is_empty());
    }

    #[test]
    fn test_file_store_ignores_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        std::fs::write(dir.path().join("leftover.tmp"), "partial").unwrap();
        store.write("k1", "{}").unwrap();

        assert_eq!(store.keys().unwrap(), vec!["k1".to_string()]);
    }

    #[test]
    fn test_layered_store_reads_through_and_writes_through() {
        let backing = Arc::new(MemoryStore::new());
        backing.write("pre", "existing").unwrap();

        let layered = LayeredStore::new(backing.clone());
        assert_eq!(layered.read("pre").unwrap().as_deref(), Some("existing"));

        layered.write("new", "value").unwrap();
        assert_eq!(backing.read("new").unwrap().as_deref(), Some("value"));

        assert!(layered.remove("pre").unwrap());
        assert_eq!(layered.read("pre").unwrap(), None);
        assert_eq!(backing.read("pre").unwrap(), None);
    }
}
