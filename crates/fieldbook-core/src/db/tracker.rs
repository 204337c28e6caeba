//! Change tracking derived from row timestamps and sync markers
//!
//! There is no operation log. Deltas by time window come from `created_at` /
//! `updated_at` plus the tombstone flag; the outgoing push set comes from the
//! stored `_status` marker, which is cleared only once the server acknowledged
//! the exact version that was pushed.

use rusqlite::params;
use rusqlite::types::Value;

use super::schema::{DELETED_COLUMN, STATUS_COLUMN};
use super::txn::{table_of, StoreTxn};
use crate::error::Result;
use crate::models::{Collection, Record};
use crate::sync::protocol::{SyncChanges, TableChanges};

/// Rows the server still has to hear about, excluding never-pushed tombstones
const PENDING_CONDITION: &str =
    "_status != 'synced' AND NOT (is_deleted = 1 AND _status = 'created')";

impl StoreTxn<'_> {
    /// Records created, updated and deleted after `since`
    ///
    /// Records both created and tombstoned after `since` are left out entirely.
    pub fn changed_since<R: Record>(&self, since: i64) -> Result<TableChanges<R>> {
        let window = || vec![Value::Integer(since)];

        let created = self.select_where(
            &format!("{DELETED_COLUMN} = 0 AND created_at > ?1"),
            window(),
        )?;
        let updated = self.select_where(
            &format!("{DELETED_COLUMN} = 0 AND created_at <= ?1 AND updated_at > ?1"),
            window(),
        )?;
        let deleted = self
            .select_where::<R>(
                &format!("{DELETED_COLUMN} = 1 AND created_at <= ?1 AND updated_at > ?1"),
                window(),
            )?
            .into_iter()
            .map(|record| record.id().clone())
            .collect();

        Ok(TableChanges {
            created,
            updated,
            deleted,
        })
    }

    /// Everything this device has to push for one collection
    pub fn pending_changes<R: Record>(&self) -> Result<TableChanges<R>> {
        let created = self.select_where(
            &format!("{DELETED_COLUMN} = 0 AND {STATUS_COLUMN} = 'created'"),
            Vec::new(),
        )?;
        let updated = self.select_where(
            &format!("{DELETED_COLUMN} = 0 AND {STATUS_COLUMN} = 'updated'"),
            Vec::new(),
        )?;
        let deleted = self
            .select_where::<R>(
                &format!("{DELETED_COLUMN} = 1 AND {STATUS_COLUMN} != 'created'"),
                Vec::new(),
            )?
            .into_iter()
            .map(|record| record.id().clone())
            .collect();

        Ok(TableChanges {
            created,
            updated,
            deleted,
        })
    }

    /// Everything this device has to push, across collections
    pub fn all_pending_changes(&self) -> Result<SyncChanges> {
        Ok(SyncChanges {
            users: self.pending_changes()?,
            customers_b2b: self.pending_changes()?,
            customers_b2c: self.pending_changes()?,
            work_approvals: self.pending_changes()?,
        })
    }

    /// Clear the markers of rows the server acknowledged
    ///
    /// A row edited after it was collected keeps a dirty marker, so the newer
    /// version goes out next round. Acknowledged tombstones are removed.
    pub(crate) fn mark_pushed<R: Record>(&self, pushed: &TableChanges<R>) -> Result<()> {
        let table = table_of(R::COLLECTION)?;
        let acknowledge = format!(
            "UPDATE {} SET {STATUS_COLUMN} = CASE \
                 WHEN updated_at = ?2 AND {DELETED_COLUMN} = 0 THEN 'synced' \
                 ELSE 'updated' END \
             WHERE id = ?1",
            table.name
        );
        for record in pushed.created.iter().chain(&pushed.updated) {
            self.conn()
                .execute(&acknowledge, params![record.id().as_str(), record.updated_at()])?;
        }

        let remove = format!(
            "DELETE FROM {} WHERE id = ? AND {DELETED_COLUMN} = 1",
            table.name
        );
        for id in &pushed.deleted {
            self.conn().execute(&remove, params![id.as_str()])?;
        }
        Ok(())
    }

    /// Remove tombstones of records the server never saw; returns how many
    pub(crate) fn purge_local_tombstones(&self, collection: Collection) -> Result<usize> {
        let table = table_of(collection)?;
        let purged = self.conn().execute(
            &format!(
                "DELETE FROM {} WHERE {DELETED_COLUMN} = 1 AND {STATUS_COLUMN} = 'created'",
                table.name
            ),
            [],
        )?;
        Ok(purged)
    }

    /// Number of rows in `collection` waiting to be pushed
    pub fn pending_count(&self, collection: Collection) -> Result<usize> {
        let table = table_of(collection)?;
        let count: i64 = self.conn().query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE {PENDING_CONDITION}", table.name),
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Whether `collection` has anything left to push
    pub fn has_unpushed_changes(&self, collection: Collection) -> Result<bool> {
        let table = table_of(collection)?;
        let exists: bool = self.conn().query_row(
            &format!(
                "SELECT EXISTS(SELECT 1 FROM {} WHERE {PENDING_CONDITION})",
                table.name
            ),
            [],
            |row| row.get(0),
        )?;
        Ok(exists)
    }
}
