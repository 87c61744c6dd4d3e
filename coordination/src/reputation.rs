//! Reputation ledger
//!
//! Append-only list of score deltas per persona. Totals are derived on read.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::events::{ArenaEvent, SharedEventBus};
use crate::state::{PersonaId, StoreError, StoreResult};

/// One credited (or debited) score change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReputationRecord {
    pub entity_id: PersonaId,
    pub change: f64,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// Shared reference to a ledger
pub type SharedReputationLedger = Arc<ReputationLedger>;

#[derive(Default)]
pub struct ReputationLedger {
    records: RwLock<Vec<ReputationRecord>>,
    events: Option<SharedEventBus>,
}

impl ReputationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from snapshot records.
    pub fn from_records(records: Vec<ReputationRecord>) -> Self {
        Self {
            records: RwLock::new(records),
            events: None,
        }
    }

    /// Publish a `ReputationChanged` event for every credit.
    pub fn with_events(mut self, events: SharedEventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn shared(self) -> SharedReputationLedger {
        Arc::new(self)
    }

    /// Record a score change for an entity.
    pub fn add(&self, entity_id: &str, change: f64, reason: &str) -> StoreResult<ReputationRecord> {
        let record = ReputationRecord {
            entity_id: entity_id.to_string(),
            change,
            reason: reason.to_string(),
            created_at: Utc::now(),
        };
        {
            let mut records = self.records.write().map_err(|_| StoreError::LockPoisoned)?;
            records.push(record.clone());
        }

        info!(entity_id, change, reason, "Reputation credited");
        if let Some(events) = &self.events {
            events.publish(ArenaEvent::ReputationChanged {
                entity_id: record.entity_id.clone(),
                change,
                reason: record.reason.clone(),
                timestamp: record.created_at,
            });
        }
        Ok(record)
    }

    /// Sum of all changes for an entity; zero when it has none.
    pub fn total(&self, entity_id: &str) -> StoreResult<f64> {
        let records = self.records.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(records
            .iter()
            .filter(|r| r.entity_id == entity_id)
            .map(|r| r.change)
            .sum())
    }

    /// Records for an entity, oldest first.
    pub fn records(&self, entity_id: &str) -> StoreResult<Vec<ReputationRecord>> {
        let records = self.records.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(records
            .iter()
            .filter(|r| r.entity_id == entity_id)
            .cloned()
            .collect())
    }

    pub fn all_records(&self) -> StoreResult<Vec<ReputationRecord>> {
        let records = self.records.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(records.clone())
    }
}
