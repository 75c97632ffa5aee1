//! Durable one-record-per-key storage
//!
//! Each key is persisted as `<sanitized key>.json` holding an envelope of the
//! payload and the epoch-second timestamp it was fetched at. Writes go to a
//! temporary file first and are renamed into place, so a concurrent reader
//! sees either the old record or the new one, never a partial file.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use super::key::sanitize_key;
use crate::error::StoreError;

/// Disambiguates temporary files written concurrently by this process
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// On-disk form of a record
#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    /// The cached payload
    data: T,
    /// When the payload was obtained
    #[serde(with = "chrono::serde::ts_seconds")]
    timestamp: DateTime<Utc>,
}

/// A record read back from the store
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    /// The raw key the entry was requested under
    pub key: String,
    /// The cached payload
    pub payload: T,
    /// When the payload was obtained (not when it was last read)
    pub timestamp: DateTime<Utc>,
}

/// Reads and writes cache records in a single directory
///
/// Cloning is cheap; clones share the same directory.
#[derive(Debug, Clone)]
pub struct CacheStore {
    /// Directory where record files are stored
    cache_dir: PathBuf,
}

impl CacheStore {
    /// Creates a store rooted at `cache_dir`
    ///
    /// The directory is created lazily on the first write.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Returns the directory records are stored in
    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns the path of the record file for `key`
    pub fn record_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", sanitize_key(key)))
    }

    /// Reads the entry stored for `key`
    ///
    /// A missing, unreadable or malformed record all read as `None`, so the
    /// caller falls back to fetching and the next write replaces the bad file.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
        match self.load(key) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(key = %key, error = %e, "Ignoring unreadable cache record");
                None
            }
        }
    }

    /// Reads the entry for `key`, reporting why a present record was unusable
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<CacheEntry<T>>, StoreError> {
        let content = match fs::read(self.record_path(key)) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let envelope: Envelope<T> = serde_json::from_slice(&content)?;

        Ok(Some(CacheEntry {
            key: key.to_string(),
            payload: envelope.data,
            timestamp: envelope.timestamp,
        }))
    }

    /// Persists `payload` for `key`, stamped with the current time
    ///
    /// Unconditionally replaces any previous record for the key.
    pub fn put<T: Serialize>(&self, key: &str, payload: &T) -> Result<(), StoreError> {
        self.put_with_timestamp(key, payload, Utc::now())
    }

    /// Persists `payload` for `key` with an explicit fetch time
    ///
    /// Useful for importing records fetched elsewhere, or for aging an entry
    /// in tests.
    pub fn put_with_timestamp<T: Serialize>(
        &self,
        key: &str,
        payload: &T,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        fs::create_dir_all(&self.cache_dir)?;

        let envelope = Envelope {
            data: payload,
            timestamp,
        };
        // A payload that cannot be encoded is a write failure, not a corrupt record
        let json = serde_json::to_vec_pretty(&envelope)
            .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e))?;

        let path = self.record_path(key);
        let tmp_path = self.tmp_path(key);
        if let Err(e) = write_and_rename(&tmp_path, &path, &json) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        Ok(())
    }

    /// Returns a fresh temporary path next to the record for `key`
    ///
    /// Sanitized names never start with `.` or end in `.tmp`, so temporary
    /// files cannot be mistaken for records.
    fn tmp_path(&self, key: &str) -> PathBuf {
        let seq = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.cache_dir.join(format!(
            ".{}.{}.{}.tmp",
            sanitize_key(key),
            std::process::id(),
            seq
        ))
    }
}

fn write_and_rename(tmp_path: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(tmp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(tmp_path, path)
}
