//! Shared local store handle used by the sync engine and clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::Mutex;

use super::connection::Database;
use super::query::Query;
use super::txn::StoreTxn;
use crate::clock::{SystemTime, TimeSource};
use crate::error::Result;
use crate::models::{Collection, Record, RecordId, SyncConflict};
use crate::sync::protocol::TableChanges;

/// Record and sync counters of one collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionStatus {
    pub collection: String,
    pub records: usize,
    pub pending: usize,
}

/// Snapshot of the store's sync bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStatus {
    pub schema_version: u32,
    pub last_pulled_at: Option<i64>,
    pub last_synced_schema_version: Option<u32>,
    pub collections: Vec<CollectionStatus>,
}

impl StoreStatus {
    pub fn pending_total(&self) -> usize {
        self.collections.iter().map(|status| status.pending).sum()
    }
}

/// Thread-safe handle to the local store.
///
/// Cloning is cheap; every clone talks to the same database. All operations
/// run one at a time, so a caller waits while another transaction is open.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
    path: Option<PathBuf>,
}

impl LocalStore {
    /// Open a store at the given filesystem path, creating parent directories
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with_time(path, Arc::new(SystemTime))
    }

    pub fn open_with_time(path: impl Into<PathBuf>, time: Arc<dyn TimeSource>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open_with_time(&path, time)?;
        tracing::info!("Opened local store at {}", path.display());
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            path: Some(path),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with_time(Arc::new(SystemTime))
    }

    pub fn open_in_memory_with_time(time: Arc<dyn TimeSource>) -> Result<Self> {
        Ok(Self {
            db: Arc::new(Mutex::new(Database::open_in_memory_with_time(time)?)),
            path: None,
        })
    }

    /// Filesystem path of the store, `None` when in memory
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `body` as one atomic transaction
    ///
    /// The body is synchronous: once it starts, it runs to completion and
    /// commits, or rolls back on error, before the future can be dropped.
    pub async fn write<T>(&self, body: impl FnOnce(&StoreTxn<'_>) -> Result<T>) -> Result<T> {
        let mut db = self.db.lock().await;
        run_blocking(|| db.write(body))
    }

    /// Run `body` against one consistent snapshot
    pub async fn read<T>(&self, body: impl FnOnce(&StoreTxn<'_>) -> Result<T>) -> Result<T> {
        let mut db = self.db.lock().await;
        run_blocking(|| db.read(body))
    }

    pub async fn create<R: Record>(&self, record: R) -> Result<R> {
        self.write(|txn| txn.create(record)).await
    }

    pub async fn get<R: Record>(&self, id: &RecordId) -> Result<Option<R>> {
        self.read(|txn| txn.get(id)).await
    }

    pub async fn find<R: Record>(&self, id: &RecordId) -> Result<R> {
        self.read(|txn| txn.find(id)).await
    }

    pub async fn query<R: Record>(&self, query: &Query) -> Result<Vec<R>> {
        self.read(|txn| txn.query(query)).await
    }

    pub async fn update<R: Record>(
        &self,
        id: &RecordId,
        mutator: impl FnOnce(&mut R),
    ) -> Result<R> {
        self.write(|txn| txn.update(id, mutator)).await
    }

    pub async fn mark_deleted(&self, collection: Collection, id: &RecordId) -> Result<()> {
        self.write(|txn| txn.mark_deleted(collection, id)).await
    }

    pub async fn count(&self, collection: Collection) -> Result<usize> {
        self.read(|txn| txn.count(collection)).await
    }

    pub async fn changed_since<R: Record>(&self, since: i64) -> Result<TableChanges<R>> {
        self.read(|txn| txn.changed_since(since)).await
    }

    pub async fn has_unpushed_changes(&self, collection: Collection) -> Result<bool> {
        self.read(|txn| txn.has_unpushed_changes(collection)).await
    }

    pub async fn last_pulled_at(&self) -> Result<Option<i64>> {
        self.read(|txn| txn.last_pulled_at()).await
    }

    pub async fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        self.read(|txn| txn.list_conflicts(limit)).await
    }

    /// Schema version, checkpoint and per-collection counters
    pub async fn status(&self) -> Result<StoreStatus> {
        let mut db = self.db.lock().await;
        let schema_version = db.schema_version()?;
        db.read(|txn| {
            let collections = Collection::all()
                .into_iter()
                .map(|collection| {
                    Ok(CollectionStatus {
                        collection: collection.to_string(),
                        records: txn.count(collection)?,
                        pending: txn.pending_count(collection)?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            Ok(StoreStatus {
                schema_version,
                last_pulled_at: txn.last_pulled_at()?,
                last_synced_schema_version: txn.last_synced_schema_version()?,
                collections,
            })
        })
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("LocalStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Run SQLite work without stalling other tasks on a multi-threaded runtime
fn run_blocking<T>(work: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(work)
        }
        _ => work(),
    }
}
