//! Preference Store Capability
//!
//! A string-keyed store holding float and flag values. Subscribers receive
//! the current snapshot immediately and one full snapshot per change, in
//! change order. Two implementations are provided: an in-memory store for
//! tests and headless runs, and a JSON file store for real deployments.
//!
//! # Storage Location (file store)
//! - Linux: `~/.config/appfader/volumes.json`
//! - Windows: `%APPDATA%\appfader\volumes.json`
//! - macOS: `~/Library/Application Support/appfader/volumes.json`

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::PlatformError;

/// A persisted preference value.
///
/// Untagged so the JSON file stays a flat map of plain values. `Flag` is
/// listed first so booleans never match the float arm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrefValue {
    Flag(bool),
    Float(f32),
}

/// Full key-value snapshot of the store.
pub type PrefSnapshot = BTreeMap<String, PrefValue>;

pub type SnapshotListener = Box<dyn Fn(PrefSnapshot) + Send + 'static>;

/// Persisted key-value store capability.
pub trait PreferenceStore: Send + Sync {
    /// Register for snapshots. The current snapshot is delivered
    /// immediately, then one per change, in change order.
    ///
    /// Listeners must not call back into the store.
    fn subscribe(&self, listener: SnapshotListener);

    /// Transactionally upsert a single key.
    fn edit(&self, key: &str, value: PrefValue) -> Result<(), PlatformError>;
}

/// In-memory preference store.
pub struct MemoryPreferenceStore {
    values: Mutex<PrefSnapshot>,
    listeners: Mutex<Vec<SnapshotListener>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::with_values(PrefSnapshot::new())
    }

    /// Create a store pre-seeded with `values`.
    pub fn with_values(values: PrefSnapshot) -> Self {
        Self {
            values: Mutex::new(values),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Read a single value (inspection helper).
    pub fn get(&self, key: &str) -> Option<PrefValue> {
        self.values.lock().get(key).copied()
    }

    fn notify(&self, snapshot: PrefSnapshot) {
        for listener in self.listeners.lock().iter() {
            listener(snapshot.clone());
        }
    }
}

impl Default for MemoryPreferenceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn subscribe(&self, listener: SnapshotListener) {
        let current = self.values.lock().clone();
        listener(current);
        self.listeners.lock().push(listener);
    }

    fn edit(&self, key: &str, value: PrefValue) -> Result<(), PlatformError> {
        let snapshot = {
            let mut values = self.values.lock();
            values.insert(key.to_string(), value);
            values.clone()
        };
        self.notify(snapshot);
        Ok(())
    }
}

/// JSON file preference store.
///
/// The whole store is one flat JSON object, rewritten on every edit. A
/// missing or corrupt file falls back to an empty snapshot.
pub struct JsonPreferenceStore {
    path: PathBuf,
    values: Mutex<PrefSnapshot>,
    listeners: Mutex<Vec<SnapshotListener>>,
}

impl JsonPreferenceStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: PathBuf) -> Self {
        let values = Self::load(&path);
        Self {
            path,
            values: Mutex::new(values),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Open the store at the platform-specific default location.
    pub fn open_default() -> Result<Self, PlatformError> {
        let path = Self::default_path()
            .ok_or_else(|| PlatformError::StoreIo("could not determine config path".into()))?;
        Ok(Self::open(path))
    }

    /// The platform-specific default store path.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "appfader", "appfader")
            .map(|proj| proj.config_dir().join("volumes.json"))
    }

    fn load(path: &Path) -> PrefSnapshot {
        if path.exists() {
            match fs::File::open(path) {
                Ok(file) => match serde_json::from_reader(file) {
                    Ok(values) => {
                        info!("Preferences loaded from {:?}", path);
                        return values;
                    }
                    Err(e) => {
                        error!("Failed to parse preference file: {}", e);
                    }
                },
                Err(e) => {
                    error!("Failed to open preference file: {}", e);
                }
            }
        }

        PrefSnapshot::new()
    }

    fn save(&self, values: &PrefSnapshot) -> Result<(), PlatformError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| PlatformError::StoreIo(e.to_string()))?;
        }

        let file =
            fs::File::create(&self.path).map_err(|e| PlatformError::StoreIo(e.to_string()))?;
        serde_json::to_writer_pretty(file, values)?;

        Ok(())
    }

    fn notify(&self, snapshot: PrefSnapshot) {
        for listener in self.listeners.lock().iter() {
            listener(snapshot.clone());
        }
    }
}

impl PreferenceStore for JsonPreferenceStore {
    fn subscribe(&self, listener: SnapshotListener) {
        let current = self.values.lock().clone();
        listener(current);
        self.listeners.lock().push(listener);
    }

    fn edit(&self, key: &str, value: PrefValue) -> Result<(), PlatformError> {
        let snapshot = {
            let mut values = self.values.lock();
            values.insert(key.to_string(), value);
            values.clone()
        };
        self.save(&snapshot)?;
        self.notify(snapshot);
        Ok(())
    }
}
