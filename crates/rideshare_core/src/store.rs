//! Key-value state store the engine reads user records and the matrix from.
//!
//! Values are canonical JSON bytes: object keys sorted at every depth, no
//! insignificant whitespace. Two nodes committing the same logical state
//! therefore write the same bytes.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("store file {path} is not a JSON object of records: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("store lock poisoned")]
    Poisoned,
    #[error("store backend: {0}")]
    Backend(String),
}

/// Ordered key-value storage for user records and the eligibility matrix.
pub trait StateStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

    /// Every entry, in lexicographic key order.
    fn scan_all(&self) -> Result<Vec<(String, Vec<u8>)>, StoreError>;

    fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Write several entries. Backends that can apply them atomically should
    /// override this; the default writes one by one in the given order.
    fn put_batch(&self, writes: Vec<(String, Vec<u8>)>) -> Result<(), StoreError> {
        for (key, value) in writes {
            self.put(&key, value)?;
        }
        Ok(())
    }
}

impl<T: StateStore + ?Sized> StateStore for &T {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        (**self).put(key, value)
    }

    fn scan_all(&self) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        (**self).scan_all()
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key)
    }

    fn put_batch(&self, writes: Vec<(String, Vec<u8>)>) -> Result<(), StoreError> {
        (**self).put_batch(writes)
    }
}

/// Canonical JSON encoding: round-trips through [`serde_json::Value`], whose
/// object map is ordered, so keys come out sorted at every level.
pub fn canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let value = serde_json::to_value(value)?;
    serde_json::to_vec(&value)
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// `BTreeMap` behind a mutex. Batches are applied under one lock.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.insert(key.to_string(), value);
        Ok(())
    }

    fn scan_all(&self) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }

    fn put_batch(&self, writes: Vec<(String, Vec<u8>)>) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.extend(writes);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JSON file store
// ---------------------------------------------------------------------------

/// Whole-file JSON store: one object mapping key to record.
///
/// Every mutation rewrites the file through a temporary sibling and a rename,
/// so a crash leaves either the old or the new file, never a torn one.
#[derive(Debug)]
pub struct JsonFileStateStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStateStore {
    /// Open (or lazily create) the store at `path`. The file is not touched until the first write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn load(&self) -> Result<BTreeMap<String, serde_json::Value>, StoreError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => return Err(self.io_err(err)),
        };
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(BTreeMap::new());
        }
        serde_json::from_slice(&raw).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, entries: &BTreeMap<String, serde_json::Value>) -> Result<(), StoreError> {
        let body = serde_json::to_vec_pretty(entries)
            .map_err(|err| StoreError::Backend(format!("failed to encode store: {err}")))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| self.io_err(err))?;
        }

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let mut file = fs::File::create(&tmp_path).map_err(|err| self.io_err(err))?;
        file.write_all(&body).map_err(|err| self.io_err(err))?;
        file.sync_all().map_err(|err| self.io_err(err))?;
        fs::rename(&tmp_path, &self.path).map_err(|err| self.io_err(err))
    }

    fn decode_value(value: Vec<u8>) -> Result<serde_json::Value, StoreError> {
        serde_json::from_slice(&value)
            .map_err(|err| StoreError::Backend(format!("value is not JSON: {err}")))
    }

    fn encode_value(value: &serde_json::Value) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec(value)
            .map_err(|err| StoreError::Backend(format!("failed to encode value: {err}")))
    }
}

impl StateStore for JsonFileStateStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        self.load()?
            .get(key)
            .map(Self::encode_value)
            .transpose()
    }

    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.put_batch(vec![(key.to_string(), value)])
    }

    fn scan_all(&self) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        self.load()?
            .iter()
            .map(|(key, value)| Ok((key.clone(), Self::encode_value(value)?)))
            .collect::<Result<Vec<_>, StoreError>>()
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut entries = self.load()?;
        if entries.remove(key).is_some() {
            self.save(&entries)?;
        }
        Ok(())
    }

    fn put_batch(&self, writes: Vec<(String, Vec<u8>)>) -> Result<(), StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut entries = self.load()?;
        for (key, value) in writes {
            entries.insert(key, Self::decode_value(value)?);
        }
        self.save(&entries)
    }
}
