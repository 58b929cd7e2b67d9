//! Wallet preference in `window.localStorage`

use crate::error::StorageError;
use crate::provider::WalletKind;
use crate::storage::PreferenceStore;

#[derive(Debug, Clone)]
pub struct LocalStoragePreferences {
    key: String,
}

impl LocalStoragePreferences {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    fn storage(&self) -> Result<web_sys::Storage, StorageError> {
        web_sys::window()
            .ok_or_else(|| StorageError::Unavailable("no window".into()))?
            .local_storage()
            .map_err(|e| StorageError::Unavailable(format!("{e:?}")))?
            .ok_or_else(|| StorageError::Unavailable("localStorage disabled".into()))
    }
}

impl PreferenceStore for LocalStoragePreferences {
    fn load(&self) -> Result<Option<WalletKind>, StorageError> {
        let raw = self
            .storage()?
            .get_item(&self.key)
            .map_err(|e| StorageError::Unavailable(format!("{e:?}")))?;
        Ok(raw.and_then(|s| s.parse::<WalletKind>().ok()))
    }

    fn store(&self, kind: WalletKind) -> Result<(), StorageError> {
        self.storage()?
            .set_item(&self.key, kind.as_str())
            .map_err(|e| StorageError::Unavailable(format!("{e:?}")))
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.storage()?
            .remove_item(&self.key)
            .map_err(|e| StorageError::Unavailable(format!("{e:?}")))
    }
}
