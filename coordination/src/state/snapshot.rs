//! Snapshots of the in-memory stores.
//!
//! A snapshot is a versioned JSON document holding every table plus the
//! reputation ledger, so a CLI session can pick up where the last one left
//! off. Newer schema versions are rejected rather than half-read.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::store::{MemoryStore, StoreError, Tables};
use crate::reputation::{ReputationLedger, ReputationRecord};

/// Error during snapshot operations.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("serialize failed: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("deserialize failed: {0}")]
    Deserialize(#[source] serde_json::Error),

    #[error("version mismatch: expected at most {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("snapshot io failed for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Full arena state at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArenaSnapshot {
    /// Schema version for forward compatibility.
    pub version: u32,
    pub taken_at: DateTime<Utc>,
    pub tables: Tables,
    #[serde(default)]
    pub reputation: Vec<ReputationRecord>,
}

impl ArenaSnapshot {
    /// Current schema version.
    pub const CURRENT_VERSION: u32 = 1;

    /// Capture the current contents of a store and ledger.
    pub fn capture(
        store: &MemoryStore,
        ledger: Option<&ReputationLedger>,
    ) -> Result<Self, SnapshotError> {
        let reputation = match ledger {
            Some(ledger) => ledger.all_records()?,
            None => Vec::new(),
        };
        Ok(Self {
            version: Self::CURRENT_VERSION,
            taken_at: Utc::now(),
            tables: store.tables()?,
            reputation,
        })
    }

    /// Split into a fresh store and ledger.
    pub fn restore(self) -> (MemoryStore, ReputationLedger) {
        (
            MemoryStore::from_tables(self.tables),
            ReputationLedger::from_records(self.reputation),
        )
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        serde_json::to_string_pretty(self).map_err(SnapshotError::Serialize)
    }

    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let snapshot: Self = serde_json::from_str(json).map_err(SnapshotError::Deserialize)?;

        if snapshot.version > Self::CURRENT_VERSION {
            return Err(SnapshotError::VersionMismatch {
                expected: Self::CURRENT_VERSION,
                found: snapshot.version,
            });
        }

        Ok(snapshot)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?).map_err(|source| SnapshotError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| SnapshotError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }
}
