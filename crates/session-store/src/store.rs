use crate::error::{StorageError, StorageResult};
use crate::keys::StorageKeys;
use crate::storage::SessionStorage;
use crate::user::StoredUser;

/// Manages the persisted user record over a storage backend.
///
/// Records are JSON-encoded so any backend that stores strings works.
pub struct SessionStore {
    storage: Box<dyn SessionStorage>,
}

impl SessionStore {
    pub fn new(storage: Box<dyn SessionStorage>) -> Self {
        Self { storage }
    }

    /// Persist the authenticated user.
    pub fn set_user(&self, user: &StoredUser) -> StorageResult<()> {
        let encoded = serde_json::to_string(user)?;
        self.storage.set(StorageKeys::USER, &encoded)?;
        tracing::debug!("Stored user session");
        Ok(())
    }

    /// Get the persisted user, if one exists.
    pub fn get_user(&self) -> StorageResult<Option<StoredUser>> {
        match self.storage.get(StorageKeys::USER) {
            Ok(encoded) => {
                let user: StoredUser = serde_json::from_str(&encoded)?;
                Ok(Some(user))
            }
            Err(StorageError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Remove the persisted user.
    pub fn clear_user(&self) -> StorageResult<()> {
        self.storage.delete(StorageKeys::USER)?;
        tracing::debug!("Cleared user session");
        Ok(())
    }

    /// Check whether a user record exists.
    pub fn has_user(&self) -> StorageResult<bool> {
        self.storage.has(StorageKeys::USER)
    }
}
