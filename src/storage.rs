//! Last-used wallet preference
//!
//! The only state that outlives a session: which wallet family connected
//! last. Browsers keep it in localStorage, native builds in a small JSON file
//! under the app data directory.

use crate::error::StorageError;
use crate::provider::WalletKind;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

pub trait PreferenceStore {
    fn load(&self) -> Result<Option<WalletKind>, StorageError>;
    fn store(&self, kind: WalletKind) -> Result<(), StorageError>;
    fn clear(&self) -> Result<(), StorageError>;
}

/// In-process preference. Clones share the same slot.
#[derive(Clone, Default)]
pub struct MemoryPreferences {
    slot: Rc<RefCell<Option<WalletKind>>>,
    unavailable: Rc<Cell<bool>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(kind: WalletKind) -> Self {
        let prefs = Self::default();
        *prefs.slot.borrow_mut() = Some(kind);
        prefs
    }

    pub fn get(&self) -> Option<WalletKind> {
        *self.slot.borrow()
    }

    /// Make every access fail, like storage blocked by privacy settings.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.set(unavailable);
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.unavailable.get() {
            return Err(StorageError::Unavailable("storage disabled".into()));
        }
        Ok(())
    }
}

impl PreferenceStore for MemoryPreferences {
    fn load(&self) -> Result<Option<WalletKind>, StorageError> {
        self.check()?;
        Ok(self.get())
    }

    fn store(&self, kind: WalletKind) -> Result<(), StorageError> {
        self.check()?;
        *self.slot.borrow_mut() = Some(kind);
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.check()?;
        *self.slot.borrow_mut() = None;
        Ok(())
    }
}

#[cfg(feature = "native")]
pub use file::FilePreferences;

#[cfg(feature = "native")]
mod file {
    use super::*;
    use serde_json::{Map, Value};
    use std::path::{Path, PathBuf};

    /// JSON object of preference keys, at
    /// `$SWAPVERSE_ROOT/<app>/data/preferences.json` (or the platform data dir).
    #[derive(Debug, Clone)]
    pub struct FilePreferences {
        path: PathBuf,
        key: String,
    }

    impl FilePreferences {
        pub fn load(app: &str, key: impl Into<String>) -> Self {
            Self { path: preferences_path(app), key: key.into() }
        }

        pub fn at(path: impl Into<PathBuf>, key: impl Into<String>) -> Self {
            Self { path: path.into(), key: key.into() }
        }

        pub fn path(&self) -> &Path {
            &self.path
        }

        fn read(&self) -> Result<Map<String, Value>, StorageError> {
            if !self.path.exists() {
                return Ok(Map::new());
            }
            let raw = std::fs::read_to_string(&self.path)?;
            match serde_json::from_str::<Value>(&raw)? {
                Value::Object(map) => Ok(map),
                _ => Ok(Map::new()),
            }
        }

        fn write(&self, map: &Map<String, Value>) -> Result<(), StorageError> {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&self.path, serde_json::to_string_pretty(map)?)?;
            Ok(())
        }
    }

    impl PreferenceStore for FilePreferences {
        fn load(&self) -> Result<Option<WalletKind>, StorageError> {
            let map = self.read()?;
            Ok(map.get(&self.key).and_then(Value::as_str).and_then(|s| s.parse::<WalletKind>().ok()))
        }

        fn store(&self, kind: WalletKind) -> Result<(), StorageError> {
            let mut map = self.read()?;
            map.insert(self.key.clone(), Value::String(kind.as_str().into()));
            self.write(&map)
        }

        fn clear(&self) -> Result<(), StorageError> {
            let mut map = self.read()?;
            if map.remove(&self.key).is_some() {
                self.write(&map)?;
            }
            Ok(())
        }
    }

    fn preferences_path(app: &str) -> PathBuf {
        let root = std::env::var("SWAPVERSE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")));
        root.join(app).join("data").join("preferences.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_preferences_share_slot_between_clones() {
        let prefs = MemoryPreferences::new();
        let view = prefs.clone();
        prefs.store(WalletKind::Phantom).unwrap();
        assert_eq!(view.get(), Some(WalletKind::Phantom));
        prefs.clear().unwrap();
        assert_eq!(view.load().unwrap(), None);

        prefs.set_unavailable(true);
        assert!(prefs.store(WalletKind::MetaMask).is_err());
    }

    #[cfg(feature = "native")]
    #[test]
    fn file_preferences_keep_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, r#"{"theme":"dark"}"#).unwrap();

        let prefs = FilePreferences::at(&path, "swapverse_wallet");
        assert_eq!(prefs.load().unwrap(), None);
        prefs.store(WalletKind::MetaMask).unwrap();
        assert_eq!(prefs.load().unwrap(), Some(WalletKind::MetaMask));
        prefs.clear().unwrap();

        let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw, serde_json::json!({"theme": "dark"}));
    }
}
