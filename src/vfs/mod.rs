//! In-memory filesystem used for both sides of a simulated transfer.
//!
//! Paths are opaque strings: there is no directory hierarchy, no
//! permissions and no metadata beyond the file content. A
//! `VirtualFilesystem` is a shared handle, so clones observe and mutate the
//! same entries. The registry hands one instance to every device as the
//! "local" side and gives each device its own "remote" instance.

use crate::error::{Error, Result};
use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A single file stored in a [`VirtualFilesystem`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileRecord {
    pub content: Vec<u8>,
}

impl FileRecord {
    /// Creates a record holding `content`.
    pub fn new(content: impl Into<Vec<u8>>) -> Self {
        Self {
            content: content.into(),
        }
    }

    /// Content decoded as UTF-8, with invalid sequences replaced.
    pub fn content_str(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// How a file is opened through the transfer client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
}

impl OpenMode {
    /// Parses the mode strings accepted by the transfer client (`"r"`, `"w"`).
    pub fn parse(mode: &str) -> Result<Self> {
        match mode {
            "r" => Ok(Self::Read),
            "w" => Ok(Self::Write),
            other => Err(Error::UnsupportedMode {
                mode: other.to_string(),
            }),
        }
    }
}

/// Shared, thread-safe path → file map.
#[derive(Debug, Clone, Default)]
pub struct VirtualFilesystem {
    entries: Arc<Mutex<HashMap<String, FileRecord>>>,
}

impl VirtualFilesystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, FileRecord>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds or replaces the file at `path`.
    pub fn add_file(&self, path: &str, record: FileRecord) {
        debug!("vfs: add {} ({} bytes)", path, record.len());
        self.lock().insert(path.to_string(), record);
    }

    /// Removes the file at `path`, returning it if it existed.
    pub fn remove_file(&self, path: &str) -> Option<FileRecord> {
        debug!("vfs: remove {}", path);
        self.lock().remove(path)
    }

    /// Returns a snapshot of the file at `path`.
    pub fn get_file(&self, path: &str) -> Option<FileRecord> {
        self.lock().get(path).cloned()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.lock().contains_key(path)
    }

    /// Reads the whole content of `path`.
    pub fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.lock()
            .get(path)
            .map(|record| record.content.clone())
            .ok_or_else(|| Error::FileNotFound {
                path: path.to_string(),
            })
    }

    /// Creates `path` or truncates it to empty content.
    pub fn truncate(&self, path: &str) {
        self.lock().insert(path.to_string(), FileRecord::default());
    }

    /// Appends `data` to an existing file.
    pub fn append(&self, path: &str, data: &[u8]) -> Result<()> {
        let mut entries = self.lock();
        let record = entries.get_mut(path).ok_or_else(|| Error::FileNotFound {
            path: path.to_string(),
        })?;
        record.content.extend_from_slice(data);
        Ok(())
    }

    /// All stored paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.lock().keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drops every entry. Other handles to this filesystem see the change.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Returns true when both handles point at the same storage.
    pub fn same_as(&self, other: &VirtualFilesystem) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }
}
