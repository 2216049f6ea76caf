//! Key-value persistence delegate
//!
//! The repository and settings store never touch bytes directly; they read and
//! write whole documents by namespace key through [`KeyValueStore`]. The store
//! has no transactional isolation, so callers treat load -> mutate -> write as
//! a critical section.

use crate::{Error, Result};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Namespace key holding the scans collection document
pub const SCANS_KEY: &str = "scans";

/// Namespace key holding the settings document
pub const SETTINGS_KEY: &str = "settings";

/// Document store addressed by namespace key
pub trait KeyValueStore: Send + Sync {
    /// Read the document stored under `key`, `None` if nothing is stored
    ///
    /// Stored bytes that are not text fail with [`Error::MalformedStoredData`].
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// Replace the document stored under `key`
    ///
    /// Fails with [`Error::Persistence`] when the backend refuses the write.
    fn write(&self, key: &str, value: &str) -> Result<()>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn read(&self, key: &str) -> Result<Option<String>> {
        (**self).read(key)
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        (**self).write(key, value)
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for &T {
    fn read(&self, key: &str) -> Result<Option<String>> {
        (**self).read(key)
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        (**self).write(key, value)
    }
}

#[derive(Default)]
struct MemoryInner {
    data: HashMap<String, String>,
    quota_bytes: Option<usize>,
}

/// In-memory storage (for testing and demos)
///
/// Clones share the same underlying map. An optional byte quota makes writes
/// fail the way a full browser store would.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<MemoryInner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that rejects writes once the total stored bytes would exceed `quota_bytes`
    pub fn with_quota(quota_bytes: usize) -> Self {
        let store = Self::new();
        store.set_quota(Some(quota_bytes));
        store
    }

    /// Change or remove the byte quota
    pub fn set_quota(&self, quota_bytes: Option<usize>) {
        if let Ok(mut inner) = self.inner.write() {
            inner.quota_bytes = quota_bytes;
        }
    }

    /// Seed a raw document, bypassing the quota
    pub fn insert_raw(&self, key: &str, value: &str) {
        if let Ok(mut inner) = self.inner.write() {
            inner.data.insert(key.to_string(), value.to_string());
        }
    }
}

impl KeyValueStore for InMemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let inner = self
            .inner
            .read()
            .map_err(|_| Error::Persistence("in-memory store lock poisoned".to_string()))?;
        Ok(inner.data.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| Error::Persistence("in-memory store lock poisoned".to_string()))?;

        if let Some(quota) = inner.quota_bytes {
            let others: usize = inner
                .data
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = others + key.len() + value.len();
            if needed > quota {
                return Err(Error::Persistence(format!(
                    "quota exceeded: {} bytes needed, {} allowed",
                    needed, quota
                )));
            }
        }

        inner.data.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// File-backed storage: one `<key>.json` file per namespace in a directory
///
/// Writes go to a temporary sibling file that is then renamed over the
/// target, so a crash never leaves a half-written document behind.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the documents
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the document for `key`
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl KeyValueStore for FileStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Io(e)),
        };
        String::from_utf8(bytes).map(Some).map_err(|e| {
            Error::MalformedStoredData(format!("{} is not valid UTF-8: {}", path.display(), e))
        })
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let temp_path = path.with_extension("json.tmp");

        let result = std::fs::create_dir_all(&self.dir)
            .and_then(|_| write_synced(&temp_path, value.as_bytes()))
            .and_then(|_| std::fs::rename(&temp_path, &path));

        match result {
            Ok(()) => {
                debug!("Wrote {} bytes to {}", value.len(), path.display());
                Ok(())
            }
            Err(e) => {
                let _ = std::fs::remove_file(&temp_path);
                Err(Error::Persistence(format!(
                    "write to {} failed: {}",
                    path.display(),
                    e
                )))
            }
        }
    }
}

/// Write and flush to disk so a rename never exposes a truncated file
fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Keys become file names, so only a conservative character set is allowed
fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(Error::Persistence(format!("invalid store key: {:?}", key)))
    }
}
