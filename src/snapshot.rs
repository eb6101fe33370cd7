//! Named frozen values persisted to disk.
//!
//! A [`Snapshot`] lets one process record frozen values and a later process
//! compare against them. Files are CBOR and carry a format version plus the
//! digest of the configuration the values were frozen under; values frozen
//! under a different configuration are not comparable and are rejected.

use crate::config::Config;
use crate::error::FreezeError;
use crate::fingerprint::HashValue;
use crate::freezer::Freezer;
use crate::frozen::FrozenValue;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Current on-disk format.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to access snapshot file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed snapshot: {0}")]
    Cbor(#[from] serde_cbor::Error),

    #[error("snapshot format version {found} is not supported (expected {expected})")]
    VersionMismatch { found: u32, expected: u32 },

    /// The snapshot was recorded under a different configuration.
    #[error("snapshot was recorded under configuration {recorded}, not {current}")]
    ConfigMismatch { recorded: HashValue, current: HashValue },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    format_version: u32,
    config_digest: HashValue,
    entries: BTreeMap<String, FrozenValue>,
}

impl Snapshot {
    /// Creates an empty snapshot bound to `config`.
    pub fn new(config: &Config) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            config_digest: config.digest(),
            entries: BTreeMap::new(),
        }
    }

    pub fn config_digest(&self) -> HashValue {
        self.config_digest
    }

    /// Stores an already frozen value, replacing any previous entry.
    pub fn insert(&mut self, name: impl Into<String>, value: FrozenValue) -> Option<FrozenValue> {
        self.entries.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<&FrozenValue> {
        self.entries.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<FrozenValue> {
        self.entries.remove(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Freezes `value` with `freezer` and records it under `name`.
    pub fn record(
        &mut self,
        freezer: &mut Freezer,
        name: impl Into<String>,
        value: &Value,
        config: &Config,
    ) -> Result<(), FreezeError> {
        self.check_config(config)?;
        let frozen = freezer.freeze_value(value, config)?;
        self.entries.insert(name.into(), frozen);
        Ok(())
    }

    /// Freezes `value` and compares it with the entry recorded under `name`.
    ///
    /// Returns `None` when nothing was recorded under that name.
    pub fn matches(
        &self,
        freezer: &mut Freezer,
        name: &str,
        value: &Value,
        config: &Config,
    ) -> Result<Option<bool>, FreezeError> {
        self.check_config(config)?;
        let Some(recorded) = self.entries.get(name) else {
            return Ok(None);
        };
        let frozen = freezer.freeze_value(value, config)?;
        Ok(Some(&frozen == recorded))
    }

    fn check_config(&self, config: &Config) -> Result<(), SnapshotError> {
        let current = config.digest();
        if current != self.config_digest {
            return Err(SnapshotError::ConfigMismatch {
                recorded: self.config_digest,
                current,
            });
        }
        Ok(())
    }

    pub fn to_cbor(&self) -> Result<Vec<u8>, SnapshotError> {
        Ok(serde_cbor::to_vec(self)?)
    }

    pub fn from_cbor(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let snapshot: Self = serde_cbor::from_slice(bytes)?;
        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(SnapshotError::VersionMismatch {
                found: snapshot.format_version,
                expected: SNAPSHOT_FORMAT_VERSION,
            });
        }
        Ok(snapshot)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        let path = path.as_ref();
        let bytes = self.to_cbor()?;
        std::fs::write(path, &bytes)?;
        tracing::debug!(
            target: "deepfreeze",
            path = %path.display(),
            entries = self.entries.len(),
            bytes = bytes.len(),
            "saved snapshot"
        );
        Ok(())
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let snapshot = Self::from_cbor(&bytes)?;
        tracing::debug!(
            target: "deepfreeze",
            path = %path.display(),
            entries = snapshot.entries.len(),
            "loaded snapshot"
        );
        Ok(snapshot)
    }
}
