//! Durable key/value persistence for the typing settings.
//!
//! The store is modelled on a flash key/value namespace: a handful of
//! integer and string entries under fixed short keys. `Settings::load`
//! falls back to the documented defaults for any key that is missing.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde_json::Value;
use thiserror::Error;

use crate::model::{Settings, TypingConfig};

pub const KEY_BASE_DELAY: &str = "base_delay";
pub const KEY_DELAY_VARIANCE: &str = "delay_var";
pub const KEY_ERROR_RATE: &str = "error_rate";
pub const KEY_LONG_PAUSE_CHANCE: &str = "long_pause";
pub const KEY_START_DELAY: &str = "start_delay";
pub const KEY_PAYLOAD: &str = "payload";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read settings file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to write settings file {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("settings file {path} is not a JSON object: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

pub trait ConfigStore {
    fn get_i32(&self, key: &str) -> Option<i32>;
    fn get_str(&self, key: &str) -> Option<String>;
    fn set_i32(&mut self, key: &str, value: i32) -> Result<(), StoreError>;
    fn set_str(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
}

impl Settings {
    pub fn load(store: &dyn ConfigStore) -> Self {
        let defaults = TypingConfig::default();
        let config = TypingConfig {
            base_delay: store
                .get_i32(KEY_BASE_DELAY)
                .unwrap_or(defaults.base_delay),
            delay_variance: store
                .get_i32(KEY_DELAY_VARIANCE)
                .unwrap_or(defaults.delay_variance),
            error_rate: store
                .get_i32(KEY_ERROR_RATE)
                .unwrap_or(defaults.error_rate),
            long_pause_chance: store
                .get_i32(KEY_LONG_PAUSE_CHANCE)
                .unwrap_or(defaults.long_pause_chance),
            start_delay: store
                .get_i32(KEY_START_DELAY)
                .unwrap_or(defaults.start_delay),
        };
        let payload = store
            .get_str(KEY_PAYLOAD)
            .unwrap_or_else(|| Settings::default().payload);

        Self { config, payload }
    }

    pub fn save_config(&self, store: &mut dyn ConfigStore) -> Result<(), StoreError> {
        store.set_i32(KEY_BASE_DELAY, self.config.base_delay)?;
        store.set_i32(KEY_DELAY_VARIANCE, self.config.delay_variance)?;
        store.set_i32(KEY_ERROR_RATE, self.config.error_rate)?;
        store.set_i32(KEY_LONG_PAUSE_CHANCE, self.config.long_pause_chance)?;
        store.set_i32(KEY_START_DELAY, self.config.start_delay)
    }

    pub fn save_payload(&self, store: &mut dyn ConfigStore) -> Result<(), StoreError> {
        store.set_str(KEY_PAYLOAD, &self.payload)
    }
}

fn entry_i32(entries: &BTreeMap<String, Value>, key: &str) -> Option<i32> {
    entries
        .get(key)
        .and_then(Value::as_i64)
        .and_then(|v| i32::try_from(v).ok())
}

fn entry_str(entries: &BTreeMap<String, Value>, key: &str) -> Option<String> {
    entries.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Settings kept in a single JSON object on disk.
///
/// Every `set_*` rewrites the whole file through a temporary sibling and a
/// rename, so a crash mid-write leaves the previous contents intact.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: BTreeMap<String, Value>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(json) if json.trim().is_empty() => BTreeMap::new(),
            Ok(json) => serde_json::from_str(&json).map_err(|source| StoreError::Parse {
                path: path.clone(),
                source,
            })?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(StoreError::Read { path, source }),
        };

        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StoreError> {
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        let json = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| write_err(io::Error::new(io::ErrorKind::InvalidData, e)))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, json).map_err(write_err)?;
        fs::rename(&tmp, &self.path).map_err(write_err)
    }
}

impl ConfigStore for JsonFileStore {
    fn get_i32(&self, key: &str) -> Option<i32> {
        entry_i32(&self.entries, key)
    }

    fn get_str(&self, key: &str) -> Option<String> {
        entry_str(&self.entries, key)
    }

    fn set_i32(&mut self, key: &str, value: i32) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), Value::from(value));
        self.flush()
    }

    fn set_str(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), Value::from(value));
        self.flush()
    }
}

/// Volatile store. Clones share their entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Rc<RefCell<BTreeMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl ConfigStore for MemoryStore {
    fn get_i32(&self, key: &str) -> Option<i32> {
        entry_i32(&self.entries.borrow(), key)
    }

    fn get_str(&self, key: &str) -> Option<String> {
        entry_str(&self.entries.borrow(), key)
    }

    fn set_i32(&mut self, key: &str, value: i32) -> Result<(), StoreError> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), Value::from(value));
        Ok(())
    }

    fn set_str(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), Value::from(value));
        Ok(())
    }
}
