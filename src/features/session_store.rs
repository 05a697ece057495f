//! Persistent session store: the only state that survives a navigation or a
//! process restart.
//!
//! The backing contract is a flat key/value map with synchronous
//! `get` / `set` / `clear`, every write durable before it returns. A run may be
//! killed between any two writes; fields that must move together go through
//! `set_many`, which lands as one write.
//!
//! [`JsonFileStore`] keeps the map in `~/.listing-scout/session.json` and
//! rewrites it atomically (write-to-temp then rename) on every change so a
//! reader never observes a partial file. [`SessionStore`] layers typed session
//! accessors on top of any backend.

use crate::core::error::StoreError;
use crate::core::types::{ExportFormat, Mode, Record, Session, SessionCursor};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

// ─────────────────────────────────────────────────────────────────────────────
// Backends
// ─────────────────────────────────────────────────────────────────────────────

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
    fn clear(&self) -> Result<(), StoreError>;

    /// Write several keys as one durable change. Backends that can persist a
    /// batch atomically override this.
    fn set_many(&self, entries: Vec<(&str, Value)>) -> Result<(), StoreError> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }
}

/// In-process map. State lives as long as the value does.
#[derive(Default)]
pub struct MemoryStore {
    map: Mutex<Map<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.map.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        if let Ok(mut map) = self.map.lock() {
            map.insert(key.to_string(), value);
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        if let Ok(mut map) = self.map.lock() {
            map.clear();
        }
        Ok(())
    }

    fn set_many(&self, entries: Vec<(&str, Value)>) -> Result<(), StoreError> {
        if let Ok(mut map) = self.map.lock() {
            for (key, value) in entries {
                map.insert(key.to_string(), value);
            }
        }
        Ok(())
    }
}

/// JSON object file, rewritten atomically on every change.
pub struct JsonFileStore {
    path: PathBuf,
    map: Mutex<Map<String, Value>>,
}

impl JsonFileStore {
    /// Open (or lazily create) the store at `path`.
    ///
    /// An unreadable or corrupt file is logged and treated as empty; the next
    /// write replaces it.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let map = Self::read_map(&path);
        Self {
            path,
            map: Mutex::new(map),
        }
    }

    fn read_map(path: &Path) -> Map<String, Value> {
        if !path.exists() {
            return Map::new();
        }
        let content = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                warn!("session_store: failed to read {}: {}", path.display(), e);
                return Map::new();
            }
        };
        match serde_json::from_str::<Map<String, Value>>(&content) {
            Ok(m) => m,
            Err(e) => {
                warn!(
                    "session_store: failed to parse {}: {}, starting empty",
                    path.display(),
                    e
                );
                Map::new()
            }
        }
    }

    fn persist(&self, map: &Map<String, Value>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_vec(map)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.map.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut map = self
            .map
            .lock()
            .map_err(|_| std::io::Error::other("session store lock poisoned"))?;
        map.insert(key.to_string(), value);
        self.persist(&map)
    }

    fn set_many(&self, entries: Vec<(&str, Value)>) -> Result<(), StoreError> {
        let mut map = self
            .map
            .lock()
            .map_err(|_| std::io::Error::other("session store lock poisoned"))?;
        for (key, value) in entries {
            map.insert(key.to_string(), value);
        }
        self.persist(&map)
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut map = self
            .map
            .lock()
            .map_err(|_| std::io::Error::other("session store lock poisoned"))?;
        map.clear();
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Typed session access
// ─────────────────────────────────────────────────────────────────────────────

mod keys {
    pub const ACTIVE: &str = "active";
    pub const MODE: &str = "mode";
    pub const START_PAGE: &str = "start_page";
    pub const CURRENT_PAGE: &str = "current_page";
    pub const TARGET_PAGES: &str = "target_pages";
    pub const BASE_URL: &str = "base_url";
    pub const FORMATS: &str = "formats";
    pub const ITEM_INDEX: &str = "item_index";
    pub const ITEM_IDS: &str = "item_ids";
    pub const ITEM_IDS_PAGE: &str = "item_ids_page";
    pub const RESULTS: &str = "results";
    pub const STARTED_AT: &str = "started_at";
}

/// Session view over a [`KeyValueStore`]. The controller is its only writer.
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn open_file(path: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(JsonFileStore::open(path)))
    }

    /// Typed read with a default for missing or mistyped values.
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.backend.get(key) {
            Some(v) => serde_json::from_value(v).unwrap_or_else(|e| {
                warn!("session_store: key '{}' has unexpected shape: {}", key, e);
                default
            }),
            None => default,
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        self.backend.set(key, serde_json::to_value(value)?)
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.backend.clear()
    }

    pub fn is_active(&self) -> bool {
        self.get(keys::ACTIVE, false)
    }

    /// Persist a fresh session, field by field. `active` is written last so a
    /// crash mid-way leaves no half-initialised active session behind.
    pub fn begin(&self, session: &Session) -> Result<(), StoreError> {
        let c = &session.cursor;
        self.set(keys::MODE, &c.mode)?;
        self.set(keys::START_PAGE, &c.start_page)?;
        self.set(keys::CURRENT_PAGE, &c.current_page)?;
        self.set(keys::TARGET_PAGES, &c.target_pages)?;
        self.set(keys::BASE_URL, &c.base_url)?;
        self.set(keys::FORMATS, &c.formats)?;
        self.set(keys::ITEM_INDEX, &c.item_index)?;
        self.set(keys::ITEM_IDS, &c.item_ids)?;
        self.set(keys::ITEM_IDS_PAGE, &c.item_ids_page)?;
        self.set(keys::RESULTS, &session.results)?;
        self.set(keys::STARTED_AT, &c.started_at)?;
        self.set(keys::ACTIVE, &c.active)?;
        info!(
            "session_store: began {} session at page {} ({} pages)",
            c.mode, c.start_page, c.target_pages
        );
        Ok(())
    }

    /// Everything but the result buffer. `None` when no session is active.
    pub fn load_cursor(&self) -> Option<SessionCursor> {
        if !self.is_active() {
            return None;
        }
        let mode: Mode = match self.backend.get(keys::MODE).map(serde_json::from_value) {
            Some(Ok(m)) => m,
            _ => {
                warn!("session_store: active session without a readable mode");
                return None;
            }
        };
        let start_page = self.get(keys::START_PAGE, 1u32);
        Some(SessionCursor {
            active: true,
            mode,
            start_page,
            current_page: self.get(keys::CURRENT_PAGE, start_page),
            target_pages: self.get(keys::TARGET_PAGES, 1u32),
            base_url: self.get(keys::BASE_URL, String::new()),
            formats: self.get(keys::FORMATS, Vec::<ExportFormat>::new()),
            item_index: self.get(keys::ITEM_INDEX, 0usize),
            item_ids: self.get(keys::ITEM_IDS, Vec::<String>::new()),
            item_ids_page: self.get(keys::ITEM_IDS_PAGE, None::<u32>),
            started_at: self.get(keys::STARTED_AT, Utc::now()),
        })
    }

    pub fn load_session(&self) -> Option<Session> {
        let cursor = self.load_cursor()?;
        Some(Session {
            cursor,
            results: self.results(),
        })
    }

    pub fn results(&self) -> Vec<Record> {
        self.get(keys::RESULTS, Vec::new())
    }

    pub fn results_len(&self) -> usize {
        self.backend
            .get(keys::RESULTS)
            .and_then(|v| v.as_array().map(|a| a.len()))
            .unwrap_or(0)
    }

    pub fn set_item_index(&self, index: usize) -> Result<(), StoreError> {
        self.set(keys::ITEM_INDEX, &index)
    }

    /// Cache the discovered identifiers for `page` and rewind the index.
    pub fn cache_item_ids(&self, page: u32, ids: &[String]) -> Result<(), StoreError> {
        self.set(keys::ITEM_IDS, &ids)?;
        self.set(keys::ITEM_INDEX, &0usize)?;
        self.set(keys::ITEM_IDS_PAGE, &Some(page))
    }

    /// Move to `page` and drop the previous page's identifiers.
    pub fn advance_to_page(&self, page: u32) -> Result<(), StoreError> {
        self.set(keys::ITEM_IDS_PAGE, &None::<u32>)?;
        self.set(keys::ITEM_IDS, &Vec::<String>::new())?;
        self.set(keys::ITEM_INDEX, &0usize)?;
        self.set(keys::CURRENT_PAGE, &page)
    }

    fn appended(&self, record: &Record) -> Result<Vec<Value>, StoreError> {
        let mut results = match self.backend.get(keys::RESULTS) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };
        results.push(serde_json::to_value(record)?);
        Ok(results)
    }

    /// Append one record to the buffer. The buffer never shrinks short of `clear`.
    pub fn append_record(&self, record: &Record) -> Result<usize, StoreError> {
        let results = self.appended(record)?;
        let len = results.len();
        self.backend.set(keys::RESULTS, Value::Array(results))?;
        Ok(len)
    }

    /// Append `record` and move the cursor to `next_index` in one write, so a
    /// restart never sees the record without the index that follows it.
    pub fn append_record_and_advance(
        &self,
        record: &Record,
        next_index: usize,
    ) -> Result<usize, StoreError> {
        let results = self.appended(record)?;
        let len = results.len();
        self.backend.set_many(vec![
            (keys::RESULTS, Value::Array(results)),
            (keys::ITEM_INDEX, serde_json::to_value(next_index)?),
        ])?;
        Ok(len)
    }
}
