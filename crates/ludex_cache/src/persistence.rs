// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Storage transports for cache snapshots.
//!
//! A [`Persistence`] only moves opaque text in and out of durable storage. Interpreting the
//! text, including schema migration, is the cache's job (see [`migrate`](crate::migrate)).

use std::fmt::Debug;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

/// An error raised by a [`Persistence`] transport.
///
/// # Examples
///
/// ```
/// use ludex_cache::PersistenceError;
///
/// let error = PersistenceError::from_message("quota exceeded");
/// assert!(error.to_string().contains("quota exceeded"));
/// ```
#[ohno::error]
#[from(std::io::Error)]
pub struct PersistenceError {}

impl PersistenceError {
    /// Creates an error from any cause.
    pub fn from_message(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(cause)
    }
}

/// Durable storage for a single serialized snapshot.
pub trait Persistence: Send + Sync + Debug {
    /// Reads the stored snapshot, or `None` if nothing has been stored yet.
    ///
    /// # Errors
    ///
    /// Returns an error when the storage exists but cannot be read.
    fn load(&self) -> Result<Option<String>, PersistenceError>;

    /// Replaces the stored snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error when the storage cannot be written.
    fn save(&self, snapshot: &str) -> Result<(), PersistenceError>;
}

/// Keeps the snapshot in process memory.
///
/// Useful in tests and for sharing a warm snapshot between cache instances.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    blob: Mutex<Option<String>>,
}

impl MemoryPersistence {
    /// Creates empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates storage pre-populated with `snapshot`.
    #[must_use]
    pub fn with_snapshot(snapshot: impl Into<String>) -> Self {
        Self {
            blob: Mutex::new(Some(snapshot.into())),
        }
    }

    /// Returns the stored snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Option<String> {
        self.blob.lock().clone()
    }
}

impl Persistence for MemoryPersistence {
    fn load(&self) -> Result<Option<String>, PersistenceError> {
        Ok(self.blob.lock().clone())
    }

    fn save(&self, snapshot: &str) -> Result<(), PersistenceError> {
        *self.blob.lock() = Some(snapshot.to_owned());
        Ok(())
    }
}

/// Stores the snapshot in a file.
///
/// Writes go to a sibling temporary file that is then renamed over the target, so a crash
/// mid-write leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct FilePersistence {
    path: PathBuf,
}

impl FilePersistence {
    /// Creates a transport backed by the file at `path`. The file need not exist yet.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the snapshot path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Persistence for FilePersistence {
    fn load(&self) -> Result<Option<String>, PersistenceError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, snapshot: &str) -> Result<(), PersistenceError> {
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, snapshot)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
