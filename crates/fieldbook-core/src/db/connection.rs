//! Database connection management

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rusqlite::{Connection, TransactionBehavior};

use super::migrations::{self, MigrationOutcome};
use super::schema::app_schema;
use super::txn::StoreTxn;
use crate::clock::{StoreClock, SystemTime, TimeSource};
use crate::error::Result;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database wrapper owning the `SQLite` connection and the store clock
pub struct Database {
    conn: Connection,
    clock: StoreClock,
}

impl Database {
    /// Open a database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_time(path, Arc::new(SystemTime))
    }

    /// Open a database at the given path with an explicit time source
    pub fn open_with_time(path: impl AsRef<Path>, time: Arc<dyn TimeSource>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        Self::init(conn, time, true)
    }

    /// Open an in-memory database (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with_time(Arc::new(SystemTime))
    }

    pub fn open_in_memory_with_time(time: Arc<dyn TimeSource>) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, time, false)
    }

    fn init(mut conn: Connection, time: Arc<dyn TimeSource>, wal: bool) -> Result<Self> {
        Self::configure(&conn, wal)?;
        match migrations::run(&mut conn)? {
            MigrationOutcome::UpToDate { version } => {
                tracing::debug!("Database schema at version {version}");
            }
            MigrationOutcome::Materialized { version } => {
                tracing::info!("Initialized database schema at version {version}");
            }
            MigrationOutcome::Migrated { from, to } => {
                tracing::info!("Upgraded database schema from version {from} to {to}");
            }
        }

        let floor = Self::latest_timestamp(&conn)?;
        Ok(Self {
            conn,
            clock: StoreClock::new(time, floor),
        })
    }

    /// Configure `SQLite` for a single local writer
    fn configure(conn: &Connection, wal: bool) -> Result<()> {
        if wal {
            // Journal mode returns a row; failures leave the default rollback journal.
            conn.pragma_update(None, "journal_mode", "WAL").ok();
        }
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(())
    }

    /// Newest record timestamp on disk, so the clock never reissues one after a restart
    fn latest_timestamp(conn: &Connection) -> Result<i64> {
        let mut latest = 0_i64;
        for table in app_schema().tables {
            let max: i64 = conn.query_row(
                &format!("SELECT COALESCE(MAX(updated_at), 0) FROM {}", table.name),
                [],
                |row| row.get(0),
            )?;
            latest = latest.max(max);
        }
        Ok(latest)
    }

    /// Run `body` inside one `IMMEDIATE` transaction
    ///
    /// The transaction commits only when `body` returns `Ok`; an error or a
    /// panic inside `body` rolls every write back.
    pub fn write<T>(&mut self, body: impl FnOnce(&StoreTxn<'_>) -> Result<T>) -> Result<T> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = body(&StoreTxn::new(&tx, &self.clock))?;
        tx.commit()?;
        Ok(value)
    }

    /// Run read-only `body` against one consistent snapshot
    pub fn read<T>(&mut self, body: impl FnOnce(&StoreTxn<'_>) -> Result<T>) -> Result<T> {
        let tx = self.conn.transaction()?;
        let value = body(&StoreTxn::new(&tx, &self.clock))?;
        tx.commit()?;
        Ok(value)
    }

    /// Current schema version of the open store
    pub fn schema_version(&self) -> Result<u32> {
        migrations::get_version(&self.conn)
    }

    pub const fn clock(&self) -> &StoreClock {
        &self.clock
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Database")
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}
