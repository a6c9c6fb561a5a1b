use anyhow::{Context, Result, anyhow};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Durable string key/value store backing the bearer token and UI preferences.
pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let guard = self.entries.lock().map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(guard.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut guard = self.entries.lock().map_err(|_| anyhow!("memory store lock poisoned"))?;
        guard.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut guard = self.entries.lock().map_err(|_| anyhow!("memory store lock poisoned"))?;
        guard.remove(key);
        Ok(())
    }
}

/// Single JSON object on disk, rewritten on every change.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("failed to read state file {}", path.display()))?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw)
                    .with_context(|| format!("state file {} is not a JSON object", path.display()))?
            }
        } else {
            BTreeMap::new()
        };

        debug!(path = %path.display(), keys = entries.len(), "opened state file");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let staging = self.path.with_extension("tmp");
        fs::write(&staging, serde_json::to_vec_pretty(entries)?)?;
        fs::rename(&staging, &self.path)
            .with_context(|| format!("failed to replace state file {}", self.path.display()))?;
        Ok(())
    }
}

impl LocalStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let guard = self.entries.lock().map_err(|_| anyhow!("file store lock poisoned"))?;
        Ok(guard.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut guard = self.entries.lock().map_err(|_| anyhow!("file store lock poisoned"))?;
        guard.insert(key.to_owned(), value.to_owned());
        self.persist(&guard)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut guard = self.entries.lock().map_err(|_| anyhow!("file store lock poisoned"))?;
        if guard.remove(key).is_some() {
            self.persist(&guard)?;
        }
        Ok(())
    }
}
