//! Read-through cache for expensive reads
//!
//! Values are stored as JSON documents behind the [`CacheStore`] trait.
//! Two stores ship with the crate: [`MemoryStore`] and [`FileStore`].
//! Store failures never reach the caller; they are logged and treated
//! as misses.

use crate::config::CacheConfig;
use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A key/value store with per-entry time-to-live.
pub trait CacheStore: Send {
    /// Fetch a live entry; expired entries are misses.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read.
    fn get(&mut self, key: &str) -> Result<Option<Value>>;

    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    fn save(&mut self, key: &str, value: &Value, ttl: Duration) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    fn delete(&mut self, key: &str) -> Result<()>;

    /// Delete every entry whose key starts with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    fn delete_prefix(&mut self, prefix: &str) -> Result<()>;
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Value and expiry; `None` never expires.
    entries: HashMap<String, (Value, Option<Instant>)>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryStore {
    fn get(&mut self, key: &str) -> Result<Option<Value>> {
        match self.entries.get(key) {
            Some((value, expires)) if expires.is_none_or(|at| Instant::now() < at) => {
                Ok(Some(value.clone()))
            }
            Some(_) => {
                self.entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn save(&mut self, key: &str, value: &Value, ttl: Duration) -> Result<()> {
        self.entries
            .insert(key.to_string(), (value.clone(), Instant::now().checked_add(ttl)));
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn delete_prefix(&mut self, prefix: &str) -> Result<()> {
        self.entries.retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct FileEntry {
    /// Expiry in Unix milliseconds.
    expires_at: i64,
    value: Value,
}

/// One JSON file per key in a cache directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store in `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// The per-user cache directory of this crate.
    #[must_use]
    pub fn default_dir() -> Option<PathBuf> {
        dirs::cache_dir().map(|dir| dir.join("imap-mailbox"))
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.json", URL_SAFE_NO_PAD.encode(key.as_bytes())))
    }

    /// The key a cache file was written for, `None` for foreign files.
    fn key_of(file_name: &str) -> Option<String> {
        let encoded = file_name.strip_suffix(".json")?;
        let bytes = URL_SAFE_NO_PAD.decode(encoded).ok()?;
        String::from_utf8(bytes).ok()
    }
}

impl CacheStore for FileStore {
    fn get(&mut self, key: &str) -> Result<Option<Value>> {
        let path = self.path(key);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let entry: FileEntry = serde_json::from_slice(&data)?;
        if Utc::now().timestamp_millis() >= entry.expires_at {
            fs::remove_file(&path).ok();
            return Ok(None);
        }
        Ok(Some(entry.value))
    }

    fn save(&mut self, key: &str, value: &Value, ttl: Duration) -> Result<()> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let entry = FileEntry {
            expires_at: Utc::now().timestamp_millis().saturating_add(ttl_ms),
            value: value.clone(),
        };
        fs::write(self.path(key), serde_json::to_vec(&entry)?)?;
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        match fs::remove_file(self.path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn delete_prefix(&mut self, prefix: &str) -> Result<()> {
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let matches = entry
                .file_name()
                .to_str()
                .and_then(Self::key_of)
                .is_some_and(|key| key.starts_with(prefix));
            if matches {
                match fs::remove_file(entry.path()) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(())
    }
}

fn open_store(adapter: &str, config: &CacheConfig) -> Result<Box<dyn CacheStore>> {
    match adapter.to_ascii_lowercase().as_str() {
        "memory" | "array" => Ok(Box::new(MemoryStore::new())),
        "file" => {
            let dir = config
                .directory
                .clone()
                .or_else(FileStore::default_dir)
                .ok_or_else(|| Error::Cache("No cache directory available".into()))?;
            Ok(Box::new(FileStore::new(dir)?))
        }
        other => Err(Error::Cache(format!("Unknown cache adapter: {other}"))),
    }
}

/// The read-through cache of one session.
pub struct Cache {
    store: Box<dyn CacheStore>,
    prefix: String,
    ttl: Duration,
}

impl Cache {
    #[must_use]
    pub fn new(store: Box<dyn CacheStore>, prefix: &str, ttl: Duration) -> Self {
        Self {
            store,
            prefix: prefix.to_string(),
            ttl,
        }
    }

    /// Build the configured cache, `None` when caching is inactive or
    /// neither the primary nor the backup adapter can be opened.
    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Option<Self> {
        if !config.active {
            return None;
        }
        let store = match open_store(&config.adapter, config) {
            Ok(store) => store,
            Err(e) => {
                warn!(
                    "Cache adapter '{}' unavailable ({}), using '{}'",
                    config.adapter, e, config.backup
                );
                match open_store(&config.backup, config) {
                    Ok(store) => store,
                    Err(e) => {
                        warn!("Backup cache adapter unavailable, caching disabled: {}", e);
                        return None;
                    }
                }
            }
        };
        Some(Self::new(store, &config.key_prefix, config.ttl))
    }

    #[must_use]
    pub fn message_key(&self, folder: &str, uid: u32) -> String {
        format!("{}{folder}:{uid}", self.prefix)
    }

    #[must_use]
    pub fn attachment_key(&self, folder: &str, uid: u32, index: usize) -> String {
        format!("{}{folder}:{uid}:attachment:{index}", self.prefix)
    }

    #[must_use]
    pub fn addresses_key(&self) -> String {
        format!("{}addresses", self.prefix)
    }

    /// Look up and deserialise an entry. Misses, store failures and
    /// undecodable entries all yield `None`.
    pub fn get<V: DeserializeOwned>(&mut self, key: &str) -> Option<V> {
        match self.store.get(key) {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(v) => {
                    debug!("Cache hit: {}", key);
                    Some(v)
                }
                Err(e) => {
                    warn!("Discarding undecodable cache entry {}: {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    pub fn put<V: Serialize>(&mut self, key: &str, value: &V) {
        let result = serde_json::to_value(value)
            .map_err(Error::from)
            .and_then(|json| self.store.save(key, &json, self.ttl));
        if let Err(e) = result {
            warn!("Cache write failed for {}: {}", key, e);
        }
    }

    pub fn evict(&mut self, key: &str) {
        if let Err(e) = self.store.delete(key) {
            warn!("Cache eviction failed for {}: {}", key, e);
        }
    }

    fn evict_prefix(&mut self, prefix: &str) {
        if let Err(e) = self.store.delete_prefix(prefix) {
            warn!("Cache eviction failed for {}*: {}", prefix, e);
        }
    }

    /// Drop the record of one message and its attachments.
    pub fn evict_message(&mut self, folder: &str, uid: u32) {
        let key = self.message_key(folder, uid);
        self.evict(&key);
        self.evict_prefix(&format!("{key}:"));
    }

    /// Drop every message and attachment record of `folder`.
    pub fn evict_folder(&mut self, folder: &str) {
        let prefix = format!("{}{folder}:", self.prefix);
        self.evict_prefix(&prefix);
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("prefix", &self.prefix)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
