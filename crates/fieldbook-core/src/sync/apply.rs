//! Applying a pulled delta to the local store
//!
//! Runs inside one store transaction. Remote documents keep their own
//! timestamps. A clean local row always takes the server copy; a row with
//! unpushed edits keeps whichever side has the newer `updated_at`, and ties
//! go to the server.

use crate::db::{ConflictEntry, RowStatus, StoreTxn, STRATEGY_LWW, STRATEGY_REMOTE_DELETE};
use crate::error::{Error, Result};
use crate::models::{ConflictWinner, Record, RecordId};
use crate::sync::protocol::{SyncChanges, TableChanges};

/// What applying one pulled delta changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    /// Remote versions written locally
    pub applied: usize,
    /// Rows removed because the server deleted them
    pub deleted: usize,
    /// Remote versions left unapplied: older than a local edit, or already stored
    pub skipped: usize,
    /// Resolutions that overrode or kept a local edit
    pub conflicts: usize,
}

/// Apply every collection of `changes`
pub fn apply_changes(txn: &StoreTxn<'_>, changes: &SyncChanges) -> Result<ApplyStats> {
    let mut stats = ApplyStats::default();
    apply_table(txn, &changes.users, &mut stats)?;
    apply_table(txn, &changes.customers_b2b, &mut stats)?;
    apply_table(txn, &changes.customers_b2c, &mut stats)?;
    apply_table(txn, &changes.work_approvals, &mut stats)?;
    Ok(stats)
}

fn apply_table<R: Record>(
    txn: &StoreTxn<'_>,
    changes: &TableChanges<R>,
    stats: &mut ApplyStats,
) -> Result<()> {
    for record in &changes.created {
        apply_record(txn, record, true, stats)?;
    }
    for record in &changes.updated {
        apply_record(txn, record, false, stats)?;
    }
    for id in &changes.deleted {
        apply_deletion::<R>(txn, id, stats)?;
    }
    Ok(())
}

fn apply_record<R: Record>(
    txn: &StoreTxn<'_>,
    remote: &R,
    reported_created: bool,
    stats: &mut ApplyStats,
) -> Result<()> {
    let collection = R::COLLECTION;
    if remote.id().is_blank() {
        tracing::warn!("Ignoring {collection} record without id from server");
        return Ok(());
    }
    if !txn.clock().observe(remote.updated_at()) {
        tracing::warn!(
            "{collection} {} carries updated_at {} far ahead of local time; clock capped",
            remote.id(),
            remote.updated_at()
        );
    }

    let Some(local) = txn.meta(collection, remote.id())? else {
        txn.put_row(remote, RowStatus::Synced)?;
        stats.applied += 1;
        return Ok(());
    };

    if reported_created
        && local.status == RowStatus::Created
        && local.created_at != remote.created_at()
    {
        return Err(Error::SyncConflictInvariant {
            collection: collection.to_string(),
            id: remote.id().to_string(),
            local_created_at: local.created_at,
            remote_created_at: remote.created_at(),
        });
    }

    if !local.status.is_dirty() {
        // Nothing local to protect: the server copy is authoritative.
        if reported_created && remote.updated_at() == local.updated_at {
            stats.skipped += 1;
        } else {
            txn.put_row(remote, RowStatus::Synced)?;
            stats.applied += 1;
        }
        return Ok(());
    }

    let remote_wins = remote.updated_at() >= local.updated_at;
    if remote_wins {
        txn.put_row(remote, RowStatus::Synced)?;
        stats.applied += 1;
    } else {
        stats.skipped += 1;
    }

    // Equal timestamps are the server echoing this device's own write.
    if remote.updated_at() != local.updated_at {
        let winner = if remote_wins {
            ConflictWinner::Remote
        } else {
            ConflictWinner::Local
        };
        txn.record_conflict(&ConflictEntry {
            collection,
            record_id: remote.id(),
            local_updated_at: local.updated_at,
            incoming_updated_at: remote.updated_at(),
            strategy: STRATEGY_LWW,
            winner,
        })?;
        stats.conflicts += 1;
        tracing::info!(
            "Resolved conflict on {collection} {} by last writer: {winner} kept (local {}, remote {})",
            remote.id(),
            local.updated_at,
            remote.updated_at()
        );
    }
    Ok(())
}

fn apply_deletion<R: Record>(
    txn: &StoreTxn<'_>,
    id: &RecordId,
    stats: &mut ApplyStats,
) -> Result<()> {
    let collection = R::COLLECTION;
    let Some(local) = txn.meta(collection, id)? else {
        return Ok(());
    };

    if local.status.is_dirty() && !local.is_deleted {
        txn.record_conflict(&ConflictEntry {
            collection,
            record_id: id,
            local_updated_at: local.updated_at,
            incoming_updated_at: 0,
            strategy: STRATEGY_REMOTE_DELETE,
            winner: ConflictWinner::Remote,
        })?;
        stats.conflicts += 1;
        tracing::info!("Server deleted {collection} {id}, discarding local edits");
    }

    if txn.purge(collection, id)? {
        stats.deleted += 1;
    }
    Ok(())
}
