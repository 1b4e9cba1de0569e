//! File-based repository implementations
//!
//! The store is a single pretty-printed JSON object on disk; each
//! repository owns one key in it.

use super::traits::ConfigRepository;
use crate::error::AnchorResult;
use crate::ledger::LedgerConfig;
use serde_json::{Map, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Storage keys
const LEDGER_CONFIG_KEY: &str = "ledger_config";

/// JSON key-value file shared by the file repositories
struct JsonStore {
    path: PathBuf,
    // serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl JsonStore {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    fn read_all(&self) -> AnchorResult<Map<String, Value>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(Map::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&self, entries: &Map<String, Value>) -> AnchorResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, serde_json::to_string_pretty(entries)?)?;
        Ok(())
    }

    fn get(&self, key: &str) -> AnchorResult<Option<Value>> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: Value) -> AnchorResult<()> {
        let _guard = self.write_lock.lock()?;
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value);
        self.write_all(&entries)
    }

    fn delete(&self, key: &str) -> AnchorResult<()> {
        let _guard = self.write_lock.lock()?;
        let mut entries = self.read_all()?;
        if entries.remove(key).is_some() {
            self.write_all(&entries)?;
        }
        Ok(())
    }
}

/// File-based configuration repository
pub struct FileConfigRepository {
    store: JsonStore,
}

impl FileConfigRepository {
    /// Create a new file-based config repository
    pub fn new(store_path: PathBuf) -> Self {
        Self {
            store: JsonStore::new(store_path),
        }
    }

    pub fn path(&self) -> &Path {
        &self.store.path
    }
}

impl ConfigRepository for FileConfigRepository {
    fn save_config(&self, config: &LedgerConfig) -> AnchorResult<()> {
        let json = serde_json::to_value(config)?;
        self.store.set(LEDGER_CONFIG_KEY, json)?;
        tracing::debug!(path = %self.store.path.display(), "ledger config saved");
        Ok(())
    }

    fn load_config(&self) -> AnchorResult<Option<LedgerConfig>> {
        if let Some(value) = self.store.get(LEDGER_CONFIG_KEY)? {
            let config: LedgerConfig = serde_json::from_value(value)?;
            Ok(Some(config))
        } else {
            Ok(None)
        }
    }

    fn delete_config(&self) -> AnchorResult<()> {
        self.store.delete(LEDGER_CONFIG_KEY)
    }
}
