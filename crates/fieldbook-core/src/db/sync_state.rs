//! Persisted sync bookkeeping: checkpoint, synced schema version, conflict log

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use rusqlite::{params, OptionalExtension};

use super::txn::StoreTxn;
use crate::error::Result;
use crate::models::{Collection, ConflictWinner, RecordId, SyncConflict};

const LAST_PULLED_AT: &str = "last_pulled_at";
const LAST_SYNCED_SCHEMA_VERSION: &str = "last_synced_schema_version";

/// Strategy name of a last-writer-wins resolution
pub const STRATEGY_LWW: &str = "lww";
/// Strategy name of a server deletion overriding local edits
pub const STRATEGY_REMOTE_DELETE: &str = "remote_delete";

/// A conflict resolution about to be logged
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ConflictEntry<'a> {
    pub collection: Collection,
    pub record_id: &'a RecordId,
    pub local_updated_at: i64,
    pub incoming_updated_at: i64,
    pub strategy: &'static str,
    pub winner: ConflictWinner,
}

impl StoreTxn<'_> {
    /// Server timestamp through which this device has fully reconciled
    pub fn last_pulled_at(&self) -> Result<Option<i64>> {
        Ok(self
            .get_state(LAST_PULLED_AT)?
            .and_then(|value| value.parse().ok()))
    }

    /// Schema version in effect at the last successful round
    pub fn last_synced_schema_version(&self) -> Result<Option<u32>> {
        Ok(self
            .get_state(LAST_SYNCED_SCHEMA_VERSION)?
            .and_then(|value| value.parse().ok()))
    }

    /// Move the checkpoint to `timestamp`, never backward; returns the stored value
    pub(crate) fn advance_checkpoint(&self, timestamp: i64) -> Result<i64> {
        let next = match self.last_pulled_at()? {
            Some(current) if current > timestamp => {
                tracing::warn!(
                    "Server timestamp {timestamp} is older than checkpoint {current}; keeping checkpoint"
                );
                current
            }
            _ => timestamp,
        };
        self.set_state(LAST_PULLED_AT, &next.to_string())?;
        Ok(next)
    }

    pub(crate) fn set_last_synced_schema_version(&self, version: u32) -> Result<()> {
        self.set_state(LAST_SYNCED_SCHEMA_VERSION, &version.to_string())
    }

    /// Log a resolution; identical entries are stored once
    pub(crate) fn record_conflict(&self, entry: &ConflictEntry<'_>) -> Result<bool> {
        let rows = self.conn().execute(
            "INSERT OR IGNORE INTO sync_conflicts (
                collection, record_id, local_updated_at, incoming_updated_at,
                resolved_at, strategy, winner
             ) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                entry.collection.table(),
                entry.record_id.as_str(),
                entry.local_updated_at,
                entry.incoming_updated_at,
                chrono::Utc::now().timestamp_millis(),
                entry.strategy,
                entry.winner.as_str(),
            ],
        )?;
        Ok(rows > 0)
    }

    /// Most recent conflict resolutions first
    pub fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, collection, record_id, local_updated_at, incoming_updated_at,
                    resolved_at, strategy, winner
             FROM sync_conflicts
             ORDER BY resolved_at DESC, id DESC
             LIMIT ?",
        )?;

        let conflicts = stmt
            .query_map(params![limit as i64], |row| {
                let winner: String = row.get(7)?;
                Ok(SyncConflict {
                    id: row.get(0)?,
                    collection: row.get(1)?,
                    record_id: row.get(2)?,
                    local_updated_at: row.get(3)?,
                    incoming_updated_at: row.get(4)?,
                    resolved_at: row.get(5)?,
                    strategy: row.get(6)?,
                    winner: winner.parse().unwrap_or(ConflictWinner::Remote),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(conflicts)
    }

    fn get_state(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn()
            .query_row(
                "SELECT value FROM sync_state WHERE key = ?",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_state(&self, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO sync_state (key, value) VALUES (?, ?)",
            [key, value],
        )?;
        Ok(())
    }
}
