//! Ticket settings and the key-value store they live in
//!
//! The store holds raw JSON values. [`Settings::from_value`] turns the
//! value under [`SETTINGS_KEY`] into a typed snapshot; the engine takes
//! a fresh snapshot for every operation and never writes settings back.

use crate::error::{Error, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info};

/// Store key holding the ticket settings object.
pub const SETTINGS_KEY: &str = "tickets-settings";

const DEFAULT_PERIOD_MINUTES: u32 = 5;
const DEFAULT_SYNC_FOLDER: &str = "INBOX";

/// Typed snapshot of the ticket settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Prefix the ticket ID is appended to when building a ticket URL.
    pub ticket_url_template: Option<String>,
    pub opened_folder_path: Option<String>,
    pub closed_folder_path: Option<String>,
    /// Folders scanned for ticket mail, already split and normalized.
    pub sync_folder_paths: Vec<String>,
    /// Raw `autoSyncTime`; see [`Settings::period_minutes`].
    pub auto_sync_time: Option<Value>,
    pub auto_sync_enabled: bool,
    pub debug_mode: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ticket_url_template: None,
            opened_folder_path: None,
            closed_folder_path: None,
            sync_folder_paths: vec![DEFAULT_SYNC_FOLDER.to_string()],
            auto_sync_time: None,
            auto_sync_enabled: false,
            debug_mode: false,
        }
    }
}

impl Settings {
    /// Parse the raw store value.
    ///
    /// Field names follow the stored object: `ticketURL`,
    /// `openedFolder`, `closedFolder`, `syncFolders`,
    /// `openFoldersAutoSync`, `autoSyncTime`, `debugMode`. Flags are on
    /// only for `true` or `"true"`. Blank strings count as unset. The
    /// period is kept raw so that a bad value only fails the scheduler.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a JSON object.
    pub fn from_value(value: &Value) -> Result<Self> {
        let Some(map) = value.as_object() else {
            return Err(Error::Config(format!(
                "'{SETTINGS_KEY}' must be an object, got {value}"
            )));
        };

        let sync_folder_paths = text(map, "syncFolders")
            .map_or_else(|| vec![DEFAULT_SYNC_FOLDER.to_string()], |s| split_folder_list(&s));

        Ok(Self {
            ticket_url_template: text(map, "ticketURL"),
            opened_folder_path: text(map, "openedFolder"),
            closed_folder_path: text(map, "closedFolder"),
            sync_folder_paths,
            auto_sync_time: map.get("autoSyncTime").cloned(),
            auto_sync_enabled: flag(map.get("openFoldersAutoSync")),
            debug_mode: flag(map.get("debugMode")),
        })
    }

    /// Take a snapshot from the store. A missing key yields the
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored value is not a JSON object.
    pub fn load(store: &dyn SettingsStore) -> Result<Self> {
        store
            .get(SETTINGS_KEY)
            .map_or_else(|| Ok(Self::default()), |value| Self::from_value(&value))
    }

    /// Auto-sync period in minutes. Absent or blank means 5. Strings
    /// are read up to the first non-digit, so `"10min"` is 10.
    ///
    /// # Errors
    ///
    /// Returns an error if the value has no leading digits or is zero.
    pub fn period_minutes(&self) -> Result<u32> {
        period(self.auto_sync_time.as_ref())
    }

    /// Both lifecycle roots, or a configuration error naming what is
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns an error if either root is unset.
    pub fn lifecycle_roots(&self) -> Result<(&str, &str)> {
        match (&self.opened_folder_path, &self.closed_folder_path) {
            (Some(opened), Some(closed)) => Ok((opened, closed)),
            _ => Err(Error::Config(
                "Opened/Closed folder paths are not configured in settings.".into(),
            )),
        }
    }
}

/// Split comma/semicolon separated folder input into normalized paths.
#[must_use]
pub fn split_folder_list(input: &str) -> Vec<String> {
    input
        .split([',', ';'])
        .map(crate::folder::normalize_path)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

fn text(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

fn flag(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s == "true",
        _ => false,
    }
}

fn period(value: Option<&Value>) -> Result<u32> {
    let minutes = match value {
        None | Some(Value::Null) => return Ok(DEFAULT_PERIOD_MINUTES),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(DEFAULT_PERIOD_MINUTES),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            let end = trimmed
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(trimmed.len());
            trimmed[..end]
                .parse::<u32>()
                .map_err(|e| Error::Config(format!("Invalid autoSyncTime '{s}': {e}")))?
        }
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| Error::Config(format!("Invalid autoSyncTime {n}")))?,
        Some(other) => {
            return Err(Error::Config(format!("Invalid autoSyncTime {other}")));
        }
    };
    if minutes == 0 {
        return Err(Error::Config("autoSyncTime must be at least 1 minute".into()));
    }
    Ok(minutes)
}

/// Generic key-value store with change notifications.
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    /// # Errors
    ///
    /// Returns an error if the value cannot be persisted.
    fn set(&self, key: &str, value: Value) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the removal cannot be persisted.
    fn remove(&self, key: &str) -> Result<()>;

    /// A receiver that is marked changed whenever `key` is set or
    /// removed. It always carries the full new value.
    fn subscribe(&self, key: &str) -> watch::Receiver<Option<Value>>;
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, watch::Sender<Option<Value>>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-populated with a ticket settings object.
    #[must_use]
    pub fn with_settings(settings: Value) -> Self {
        let store = Self::new();
        store.put(SETTINGS_KEY, Some(settings));
        store
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, watch::Sender<Option<Value>>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn put(&self, key: &str, value: Option<Value>) {
        self.entries()
            .entry(key.to_string())
            .or_insert_with(|| watch::channel(None).0)
            .send_replace(value);
    }

    fn snapshot(&self) -> Map<String, Value> {
        self.entries()
            .iter()
            .filter_map(|(k, tx)| tx.borrow().clone().map(|v| (k.clone(), v)))
            .collect()
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries().get(key).and_then(|tx| tx.borrow().clone())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        self.put(key, Some(value));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        if self.entries().contains_key(key) {
            self.put(key, None);
        }
        Ok(())
    }

    fn subscribe(&self, key: &str) -> watch::Receiver<Option<Value>> {
        self.entries()
            .entry(key.to_string())
            .or_insert_with(|| watch::channel(None).0)
            .subscribe()
    }
}

/// Store persisted as a single JSON object on disk.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    memory: MemoryStore,
}

impl FileStore {
    /// Open the store, reading the file if it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or does
    /// not hold a JSON object.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self {
            path: path.into(),
            memory: MemoryStore::new(),
        };
        for (key, value) in read_object(&store.path)? {
            store.memory.put(&key, Some(value));
        }
        debug!("Opened settings file {}", store.path.display());
        Ok(store)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file and notify subscribers of every key whose value
    /// differs from what was loaded before.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not hold a
    /// JSON object.
    pub fn reload(&self) -> Result<()> {
        let on_disk = read_object(&self.path)?;
        let current = self.memory.snapshot();

        for (key, value) in &on_disk {
            if current.get(key) != Some(value) {
                self.memory.put(key, Some(value.clone()));
            }
        }
        for key in current.keys().filter(|k| !on_disk.contains_key(*k)) {
            self.memory.put(key, None);
        }
        info!("Reloaded settings from {}", self.path.display());
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        let body = serde_json::to_string_pretty(&Value::Object(self.memory.snapshot()))
            .map_err(|e| Error::Config(format!("Cannot serialize settings: {e}")))?;
        std::fs::write(&self.path, body)?;
        Ok(())
    }
}

impl SettingsStore for FileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.memory.get(key)
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        self.memory.set(key, value)?;
        self.persist()
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.memory.remove(key)?;
        self.persist()
    }

    fn subscribe(&self, key: &str) -> watch::Receiver<Option<Value>> {
        self.memory.subscribe(key)
    }
}

fn read_object(path: &Path) -> Result<Map<String, Value>> {
    let body = match std::fs::read_to_string(path) {
        Ok(body) => body,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
        Err(e) => return Err(e.into()),
    };
    if body.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str(&body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(Error::Config(format!(
            "{} does not contain a JSON object",
            path.display()
        ))),
        Err(e) => Err(Error::Config(format!("Invalid {}: {e}", path.display()))),
    }
}
