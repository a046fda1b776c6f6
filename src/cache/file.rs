//! Filesystem-backed cache shared by every process on a host.
//!
//! Each key is one JSON file holding the value and its expiry:
//!
//! ```text
//! <dir>/<escaped-key>.json   {"value": true, "expires_at": "2024-01-15T12:10:00Z"}
//! ```
//!
//! Entries are written to a uniquely named temp file and renamed into place,
//! so readers never observe a partial entry.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{Cache, CacheError, expiry_from_now};
use crate::spool::fsync::fsync_file;

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    value: serde_json::Value,
    expires_at: DateTime<Utc>,
}

/// A cache storing one file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Creates a cache in `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileCache { dir: dir.into() }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", escape_key(key)))
    }

    /// Returns the unexpired value under `key`.
    ///
    /// Unreadable or malformed entries are treated as absent.
    pub fn get(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError> {
        let path = self.entry_path(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entry: StoredEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key, error = %e, "ignoring malformed cache entry");
                return Ok(None);
            }
        };

        // Left on disk for the next save to replace; never removed here.
        if entry.expires_at <= Utc::now() {
            return Ok(None);
        }

        Ok(Some(entry.value))
    }
}

impl Cache for FileCache {
    fn contains(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.get(key)?.is_some())
    }

    fn save(&self, key: &str, value: serde_json::Value, ttl: Duration) -> Result<(), CacheError> {
        let entry = StoredEntry {
            value,
            expires_at: expiry_from_now(ttl)?,
        };
        let bytes = serde_json::to_vec(&entry)?;

        fs::create_dir_all(&self.dir)?;
        let path = self.entry_path(key);
        let temp_path = self.dir.join(format!(
            ".{}.{}.tmp",
            escape_key(key),
            uuid::Uuid::new_v4().simple()
        ));

        {
            let mut file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&temp_path)?;
            file.write_all(&bytes)?;
            fsync_file(&file)?;
        }

        if let Err(e) = fs::rename(&temp_path, &path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
        Ok(())
    }
}

/// Maps a key onto a safe file name: ASCII alphanumerics, `-`, `_` and `.`
/// pass through, everything else becomes `%XX`.
fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    if out.starts_with('.') {
        out.replace_range(..1, "%2E");
    }
    out
}
