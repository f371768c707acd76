//! Persistence of the last completed chunk
//!
//! One record per run: the dimension being generated and the last chunk
//! finished in it. A later run with the same region resumes from there.

use crate::region::ChunkPos;
use chrono::{DateTime, Utc};
use pregen_adapter::Dimension;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Progress store failures
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the record failed
    #[error("progress file {path}: {source}")]
    Io {
        /// Record path
        path: PathBuf,
        /// IO error
        #[source]
        source: std::io::Error,
    },

    /// Record is not valid JSON of the expected shape
    #[error("malformed progress file {path}: {source}")]
    Malformed {
        /// Record path
        path: PathBuf,
        /// Parse error
        #[source]
        source: serde_json::Error,
    },
}

/// Last completed chunk of an interrupted run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// Dimension being generated
    pub dimension: Dimension,
    /// Last completed chunk x
    pub x: i32,
    /// Last completed chunk z
    pub z: i32,
    /// When the record was written
    pub saved_at: DateTime<Utc>,
}

impl ProgressRecord {
    /// Record stamped now
    #[must_use]
    pub fn now(dimension: Dimension, pos: ChunkPos) -> Self {
        Self {
            dimension,
            x: pos.x,
            z: pos.z,
            saved_at: Utc::now(),
        }
    }

    /// Recorded position
    #[inline]
    #[must_use]
    pub fn position(&self) -> ChunkPos {
        ChunkPos::new(self.x, self.z)
    }
}

/// Where progress records live
pub trait ProgressStore: Send + Sync {
    /// Stored record, if any
    ///
    /// # Errors
    /// Returns [`StoreError`] if a record exists but cannot be read.
    fn load(&self) -> Result<Option<ProgressRecord>, StoreError>;

    /// Replace the stored record
    ///
    /// # Errors
    /// Returns [`StoreError`] if the record cannot be written.
    fn save(&self, record: &ProgressRecord) -> Result<(), StoreError>;

    /// Remove the stored record
    ///
    /// # Errors
    /// Returns [`StoreError`] if an existing record cannot be removed.
    fn clear(&self) -> Result<(), StoreError>;
}

/// Record kept as a JSON file
#[derive(Debug, Clone)]
pub struct JsonProgressStore {
    path: PathBuf,
}

impl JsonProgressStore {
    /// Store at path
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Record path
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl ProgressStore for JsonProgressStore {
    fn load(&self) -> Result<Option<ProgressRecord>, StoreError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io(e)),
        };
        let record = serde_json::from_str(&text).map_err(|source| StoreError::Malformed {
            path: self.path.clone(),
            source,
        })?;
        Ok(Some(record))
    }

    fn save(&self, record: &ProgressRecord) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(record).map_err(|source| StoreError::Malformed {
            path: self.path.clone(),
            source,
        })?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.io(e))?;
        }
        std::fs::write(&self.path, json).map_err(|e| self.io(e))?;
        tracing::debug!(path = %self.path.display(), dimension = %record.dimension, x = record.x, z = record.z, "saved progress");
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io(e)),
        }
    }
}
