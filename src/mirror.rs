//! Local mirror of remote collections.
//!
//! One serialized snapshot per storage key, rewritten wholesale on every
//! successful remote write and read back when the remote store is down.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::record::Record;

#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("mirror I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("mirror contents unreadable: {0}")]
    Corrupt(#[from] serde_json::Error),
}

pub trait LocalMirror: Send + Sync + 'static {
    /// Read the snapshot stored under `key`. A missing key is an empty list.
    fn read(&self, key: &str) -> Result<Vec<Record>, MirrorError>;

    /// Replace the snapshot stored under `key`.
    fn write(&self, key: &str, records: &[Record]) -> Result<(), MirrorError>;
}

/// Mirror held in process memory. Stores serialized JSON so that reads go
/// through the same decode path as `FileMirror`.
#[derive(Default)]
pub struct MemoryMirror {
    slots: Mutex<HashMap<String, String>>,
}

impl MemoryMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw text under a key, bypassing serialization.
    pub fn put_raw(&self, key: &str, raw: &str) {
        self.slots.lock().insert(key.to_string(), raw.to_string());
    }
}

impl LocalMirror for MemoryMirror {
    fn read(&self, key: &str) -> Result<Vec<Record>, MirrorError> {
        match self.slots.lock().get(key) {
            Some(raw) => Ok(serde_json::from_str(raw)?),
            None => Ok(Vec::new()),
        }
    }

    fn write(&self, key: &str, records: &[Record]) -> Result<(), MirrorError> {
        let raw = serde_json::to_string(records)?;
        self.slots.lock().insert(key.to_string(), raw);
        Ok(())
    }
}

/// Mirror stored as `{dir}/{key}.json`.
pub struct FileMirror {
    dir: PathBuf,
}

impl FileMirror {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl LocalMirror for FileMirror {
    fn read(&self, key: &str) -> Result<Vec<Record>, MirrorError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn write(&self, key: &str, records: &[Record]) -> Result<(), MirrorError> {
        fs::create_dir_all(&self.dir)?;
        let content = serde_json::to_string_pretty(records)?;

        // Write to a sibling temp file and rename so readers never see a
        // half-written snapshot.
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.flush()?;
        tmp.persist(self.path_for(key)).map_err(|e| e.error)?;
        Ok(())
    }
}
