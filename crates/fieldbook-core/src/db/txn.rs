//! Record operations inside one store transaction

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use super::query::Query;
use super::records::{field_values, from_row, select_list, validate};
use super::schema::{app_schema, TableSchema, DELETED_COLUMN, STATUS_COLUMN};
use crate::clock::StoreClock;
use crate::error::{Error, Result};
use crate::models::{Collection, Record, RecordId};

/// Stored sync marker of a row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    /// Matches what the server last acknowledged
    Synced,
    /// Created on this device and never pushed
    Created,
    /// Changed on this device since the last push
    Updated,
}

impl RowStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::Created => "created",
            Self::Updated => "updated",
        }
    }

    fn parse(value: &str) -> Self {
        match value {
            "created" => Self::Created,
            "updated" => Self::Updated,
            _ => Self::Synced,
        }
    }

    pub const fn is_dirty(self) -> bool {
        !matches!(self, Self::Synced)
    }
}

/// Bookkeeping columns of one stored row, tombstones included
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RowMeta {
    pub created_at: i64,
    pub updated_at: i64,
    pub is_deleted: bool,
    pub status: RowStatus,
}

/// Handle to the store inside an open transaction
///
/// Handed to the body of [`crate::LocalStore::write`]; everything done through
/// it commits or rolls back together.
pub struct StoreTxn<'a> {
    conn: &'a Connection,
    clock: &'a StoreClock,
}

impl<'a> StoreTxn<'a> {
    pub(crate) const fn new(conn: &'a Connection, clock: &'a StoreClock) -> Self {
        Self { conn, clock }
    }

    pub(crate) const fn conn(&self) -> &Connection {
        self.conn
    }

    pub(crate) const fn clock(&self) -> &StoreClock {
        self.clock
    }

    /// Insert a new record, assigning an id if it has none
    pub fn create<R: Record>(&self, mut record: R) -> Result<R> {
        let table = table_of(R::COLLECTION)?;
        if record.id().is_blank() {
            record.set_id(RecordId::generate());
        }
        let now = self.clock.next();
        record.set_timestamps(now, now);
        validate(&record, table)?;

        if self.meta(R::COLLECTION, record.id())?.is_some() {
            return Err(Error::Validation(format!(
                "{} already has a record with id {}",
                table.name,
                record.id()
            )));
        }

        self.insert_row(table, &record, RowStatus::Created)?;
        tracing::debug!("Created {} {}", table.name, record.id());
        Ok(record)
    }

    /// Get a live record by id
    pub fn get<R: Record>(&self, id: &RecordId) -> Result<Option<R>> {
        let table = table_of(R::COLLECTION)?;
        let sql = format!(
            "SELECT {} FROM {} WHERE id = ? AND {DELETED_COLUMN} = 0",
            select_list(table),
            table.name
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![id.as_str()])?;
        match rows.next()? {
            Some(row) => Ok(Some(from_row(row, table)?)),
            None => Ok(None),
        }
    }

    /// Get a live record by id, failing with `NotFound` if absent or deleted
    pub fn find<R: Record>(&self, id: &RecordId) -> Result<R> {
        self.get(id)?
            .ok_or_else(|| Error::not_found(R::COLLECTION.table(), id.as_str()))
    }

    /// Snapshot of the live records matching `query`
    pub fn query<R: Record>(&self, query: &Query) -> Result<Vec<R>> {
        let table = table_of(R::COLLECTION)?;
        let (sql, values) = query.to_sql(table)?;
        self.collect(table, &sql, values)
    }

    /// Apply `mutator` to a live record and bump its `updated_at`
    ///
    /// The id and timestamps stay store-owned whatever the mutator does.
    pub fn update<R: Record>(&self, id: &RecordId, mutator: impl FnOnce(&mut R)) -> Result<R> {
        let table = table_of(R::COLLECTION)?;
        let mut record: R = self.find(id)?;
        let created_at = record.created_at();

        mutator(&mut record);
        record.set_id(id.clone());
        record.set_timestamps(created_at, self.clock.next());
        validate(&record, table)?;

        let assignments = table
            .columns
            .iter()
            .map(|column| format!("{} = ?", column.name))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {assignments}, updated_at = ?, {STATUS_COLUMN} = {} \
             WHERE id = ? AND {DELETED_COLUMN} = 0",
            table.name,
            DIRTY_STATUS_SQL
        );

        let mut values = field_values(&record, table)?;
        values.push(Value::Integer(record.updated_at()));
        values.push(Value::Text(id.as_str().to_string()));
        let rows = self.conn.execute(&sql, params_from_iter(values))?;
        if rows == 0 {
            return Err(Error::not_found(table.name, id.as_str()));
        }

        tracing::debug!("Updated {} {}", table.name, id);
        Ok(record)
    }

    /// Tombstone a live record; the row stays until the deletion is pushed
    pub fn mark_deleted(&self, collection: Collection, id: &RecordId) -> Result<()> {
        let table = table_of(collection)?;
        let sql = format!(
            "UPDATE {} SET {DELETED_COLUMN} = 1, updated_at = ?, {STATUS_COLUMN} = {} \
             WHERE id = ? AND {DELETED_COLUMN} = 0",
            table.name, DIRTY_STATUS_SQL
        );
        let rows = self
            .conn
            .execute(&sql, params![self.clock.next(), id.as_str()])?;
        if rows == 0 {
            return Err(Error::not_found(table.name, id.as_str()));
        }

        tracing::debug!("Marked {} {} deleted", table.name, id);
        Ok(())
    }

    /// Number of live records in a collection
    pub fn count(&self, collection: Collection) -> Result<usize> {
        let table = table_of(collection)?;
        let count: i64 = self.conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE {DELETED_COLUMN} = 0",
                table.name
            ),
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Bookkeeping of a row by id, tombstones included
    pub(crate) fn meta(&self, collection: Collection, id: &RecordId) -> Result<Option<RowMeta>> {
        let table = table_of(collection)?;
        let meta = self
            .conn
            .query_row(
                &format!(
                    "SELECT created_at, updated_at, {DELETED_COLUMN}, {STATUS_COLUMN} \
                     FROM {} WHERE id = ?",
                    table.name
                ),
                params![id.as_str()],
                |row| {
                    Ok(RowMeta {
                        created_at: row.get(0)?,
                        updated_at: row.get(1)?,
                        is_deleted: row.get::<_, i64>(2)? != 0,
                        status: RowStatus::parse(&row.get::<_, String>(3)?),
                    })
                },
            )
            .optional()?;
        Ok(meta)
    }

    /// Write `record` with its own timestamps as a live row in `status`
    ///
    /// Replaces any existing row with the same id, tombstone or not.
    pub(crate) fn put_row<R: Record>(&self, record: &R, status: RowStatus) -> Result<()> {
        let table = table_of(R::COLLECTION)?;
        self.conn.execute(
            &format!("DELETE FROM {} WHERE id = ?", table.name),
            params![record.id().as_str()],
        )?;
        self.insert_row(table, record, status)
    }

    /// Physically remove a row, tombstone or not
    pub(crate) fn purge(&self, collection: Collection, id: &RecordId) -> Result<bool> {
        let table = table_of(collection)?;
        let rows = self.conn.execute(
            &format!("DELETE FROM {} WHERE id = ?", table.name),
            params![id.as_str()],
        )?;
        Ok(rows > 0)
    }

    /// Rows matching a raw condition on system columns, tombstones included
    pub(crate) fn select_where<R: Record>(
        &self,
        condition: &str,
        values: Vec<Value>,
    ) -> Result<Vec<R>> {
        let table = table_of(R::COLLECTION)?;
        let sql = format!(
            "SELECT {} FROM {} WHERE {condition} ORDER BY created_at ASC, id ASC",
            select_list(table),
            table.name
        );
        self.collect(table, &sql, values)
    }

    fn collect<R: Record>(&self, table: &TableSchema, sql: &str, values: Vec<Value>) -> Result<Vec<R>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(values))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(from_row(row, table)?);
        }
        Ok(records)
    }

    fn insert_row<R: Record>(&self, table: &TableSchema, record: &R, status: RowStatus) -> Result<()> {
        let columns = select_list(table);
        let placeholders = vec!["?"; table.columns.len() + 3].join(", ");
        let sql = format!(
            "INSERT INTO {} ({columns}, {DELETED_COLUMN}, {STATUS_COLUMN}) \
             VALUES ({placeholders}, 0, ?)",
            table.name
        );

        let mut values = vec![
            Value::Text(record.id().as_str().to_string()),
            Value::Integer(record.created_at()),
            Value::Integer(record.updated_at()),
        ];
        values.extend(field_values(record, table)?);
        values.push(Value::Text(status.as_str().to_string()));
        self.conn.execute(&sql, params_from_iter(values))?;
        Ok(())
    }
}

/// A row created locally stays `created` until pushed; anything else becomes `updated`
const DIRTY_STATUS_SQL: &str = "CASE WHEN _status = 'created' THEN 'created' ELSE 'updated' END";

pub(crate) fn table_of(collection: Collection) -> Result<&'static TableSchema> {
    app_schema().table(collection.table()).ok_or_else(|| {
        Error::InvalidInput(format!("no table declared for {collection}"))
    })
}
