use crate::error::{StorageError, StorageResult};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Trait for session storage backends.
///
/// Implementations must be safe to share across threads.
pub trait SessionStorage: Send + Sync {
    /// Store a value under the given key, replacing any existing value.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Retrieve the value stored under the given key.
    fn get(&self, key: &str) -> StorageResult<String>;

    /// Delete the value stored under the given key.
    fn delete(&self, key: &str) -> StorageResult<()>;

    /// Check whether a value exists for the given key.
    fn has(&self, key: &str) -> StorageResult<bool> {
        match self.get(key) {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// In-memory storage backend.
///
/// Session state lives only as long as the process, which matches how
/// a browser tab holds its OIDC session.
#[derive(Default)]
pub struct MemoryStorage {
    data: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemoryStorage {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut data = self
            .data
            .lock()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<String> {
        let data = self
            .data
            .lock()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        data.get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        let mut data = self
            .data
            .lock()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        data.remove(key);
        Ok(())
    }
}

/// File-backed storage, one JSON-encoded file per key.
pub struct FileStorage {
    base_dir: PathBuf,
}

impl FileStorage {
    pub fn new(base_dir: PathBuf) -> StorageResult<Self> {
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys may contain path separators, sanitize into one flat name
        let name: String = key
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '.' { c } else { '_' })
            .collect();
        self.base_dir.join(format!("{name}.json"))
    }
}

impl SessionStorage for FileStorage {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        std::fs::write(self.path_for(key), value)?;
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<String> {
        let path = self.path_for(key);
        if !path.exists() {
            return Err(StorageError::NotFound(key.to_string()));
        }
        Ok(std::fs::read_to_string(path)?)
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.path_for(key);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}
