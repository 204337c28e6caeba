//! Database migrations
//!
//! Migrations are additive only: a step can create a table or add columns to
//! one, never drop or retype anything. Every step checks the live shape first,
//! so re-running a step against an already migrated store is a no-op.

use std::collections::{BTreeMap, BTreeSet};

use rusqlite::Connection;

use super::schema::{
    app_schema, AppSchema, ColumnSchema, TableSchema, CUSTOMERS_B2B_BASE_COLUMNS,
    CUSTOMERS_B2C_BASE_COLUMNS, CUSTOMER_ASSIGNMENT_COLUMNS, USERS_PHOTO_COLUMNS,
    USERS_PROFILE_COLUMNS,
};
use crate::error::{Error, Result};

/// One primitive, additive schema change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStep {
    AddColumns {
        table: &'static str,
        columns: &'static [ColumnSchema],
    },
    CreateTable(TableSchema),
}

/// The steps that bring a store to `to_version`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    pub to_version: u32,
    pub steps: &'static [MigrationStep],
}

/// What opening a store did to its schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    UpToDate { version: u32 },
    Materialized { version: u32 },
    Migrated { from: u32, to: u32 },
}

/// Tables and columns added between two schema versions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaChanges {
    pub tables: Vec<String>,
    pub columns: BTreeMap<String, Vec<String>>,
}

impl SchemaChanges {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.columns.is_empty()
    }
}

/// The migration chain shipped with this build
pub fn app_migrations() -> &'static [Migration] {
    APP_MIGRATIONS
}

const APP_MIGRATIONS: &[Migration] = &[
    Migration {
        to_version: 2,
        steps: &[MigrationStep::AddColumns {
            table: "users",
            columns: USERS_PROFILE_COLUMNS,
        }],
    },
    Migration {
        to_version: 3,
        steps: &[MigrationStep::AddColumns {
            table: "users",
            columns: USERS_PHOTO_COLUMNS,
        }],
    },
    Migration {
        to_version: 4,
        steps: &[
            MigrationStep::CreateTable(TableSchema {
                name: "customers_b2b",
                columns: CUSTOMERS_B2B_BASE_COLUMNS,
            }),
            MigrationStep::CreateTable(TableSchema {
                name: "customers_b2c",
                columns: CUSTOMERS_B2C_BASE_COLUMNS,
            }),
        ],
    },
    Migration {
        to_version: 5,
        steps: &[
            MigrationStep::AddColumns {
                table: "customers_b2b",
                columns: CUSTOMER_ASSIGNMENT_COLUMNS,
            },
            MigrationStep::AddColumns {
                table: "customers_b2c",
                columns: CUSTOMER_ASSIGNMENT_COLUMNS,
            },
        ],
    },
];

/// Run all pending migrations against the shape this build expects
pub fn run(conn: &mut Connection) -> Result<MigrationOutcome> {
    run_with(conn, app_schema(), app_migrations())
}

/// Bring the store to `schema.version`, replaying `migrations` as needed
pub fn run_with(
    conn: &mut Connection,
    schema: &AppSchema,
    migrations: &[Migration],
) -> Result<MigrationOutcome> {
    let stored = get_version(conn)?;
    let target = schema.version;

    if stored > target {
        return Err(Error::SchemaTooNew { stored, target });
    }

    ensure_system_tables(conn)?;

    if stored == target {
        return Ok(MigrationOutcome::UpToDate { version: stored });
    }

    if stored == 0 {
        materialize(conn, schema)?;
        tracing::info!("Created fresh database at schema version {target}");
        return Ok(MigrationOutcome::Materialized { version: target });
    }

    validate_chain(migrations, stored, target)?;

    for migration in migrations
        .iter()
        .filter(|migration| migration.to_version > stored && migration.to_version <= target)
    {
        let tx = conn.transaction()?;
        for step in migration.steps {
            apply_step(&tx, step)?;
        }
        tx.execute(
            "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
            [migration.to_version],
        )?;
        tx.commit()?;
        tracing::info!("Migrated database to version {}", migration.to_version);
    }

    Ok(MigrationOutcome::Migrated {
        from: stored,
        to: target,
    })
}

/// Create every table of `schema` directly and stamp its version
pub(crate) fn materialize(conn: &mut Connection, schema: &AppSchema) -> Result<()> {
    ensure_system_tables(conn)?;
    let tx = conn.transaction()?;
    for table in schema.tables {
        create_table(&tx, table)?;
    }
    tx.execute(
        "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
        [schema.version],
    )?;
    tx.commit()?;
    Ok(())
}

/// Get the current schema version (0 for a store that was never initialized)
pub fn get_version(conn: &Connection) -> Result<u32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Tables and columns introduced by migrations after `from`
///
/// Columns added to a table that is itself new in the range are folded into the
/// table creation and not listed separately.
pub fn changes_since(from: u32, migrations: &[Migration]) -> SchemaChanges {
    let mut changes = SchemaChanges::default();
    let mut created = BTreeSet::new();

    for migration in migrations.iter().filter(|m| m.to_version > from) {
        for step in migration.steps {
            match step {
                MigrationStep::CreateTable(table) => {
                    if created.insert(table.name) {
                        changes.tables.push(table.name.to_string());
                    }
                }
                MigrationStep::AddColumns { table, columns } => {
                    if created.contains(table) {
                        continue;
                    }
                    let entry = changes.columns.entry((*table).to_string()).or_default();
                    for column in *columns {
                        if !entry.iter().any(|name| name == column.name) {
                            entry.push(column.name.to_string());
                        }
                    }
                }
            }
        }
    }

    changes
}

/// Declared columns of a live table, name -> declared type
pub(crate) fn table_columns(conn: &Connection, table: &str) -> Result<BTreeMap<String, String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let columns = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?))
        })?
        .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;
    Ok(columns)
}

fn ensure_system_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );
        CREATE TABLE IF NOT EXISTS sync_state (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS sync_conflicts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            collection TEXT NOT NULL,
            record_id TEXT NOT NULL,
            local_updated_at INTEGER NOT NULL,
            incoming_updated_at INTEGER NOT NULL,
            resolved_at INTEGER NOT NULL,
            strategy TEXT NOT NULL,
            winner TEXT NOT NULL,
            UNIQUE (collection, record_id, local_updated_at, incoming_updated_at, strategy)
        );
        CREATE INDEX IF NOT EXISTS idx_sync_conflicts_resolved_at
            ON sync_conflicts(resolved_at DESC);",
    )?;
    Ok(())
}

fn validate_chain(migrations: &[Migration], stored: u32, target: u32) -> Result<()> {
    let mut previous: Option<u32> = None;
    for migration in migrations {
        if let Some(previous) = previous {
            if migration.to_version != previous + 1 {
                return Err(Error::Migration(format!(
                    "migration to version {} does not follow version {previous}",
                    migration.to_version
                )));
            }
        }
        previous = Some(migration.to_version);
    }

    match (migrations.first(), previous) {
        (Some(first), Some(last)) if last == target && first.to_version <= stored + 1 => Ok(()),
        (Some(_), Some(last)) if last != target => Err(Error::Migration(format!(
            "migrations end at version {last} but the schema is version {target}"
        ))),
        _ => Err(Error::Migration(format!(
            "no migration path from version {stored} to version {target}"
        ))),
    }
}

fn apply_step(conn: &Connection, step: &MigrationStep) -> Result<()> {
    match step {
        MigrationStep::CreateTable(table) => create_table(conn, table),
        MigrationStep::AddColumns { table, columns } => add_columns(conn, table, columns),
    }
}

fn create_table(conn: &Connection, table: &TableSchema) -> Result<()> {
    conn.execute(&table.create_sql(), [])?;
    // A table that already existed may predate some declared columns.
    add_columns(conn, table.name, table.columns)?;
    for index in table.index_sql() {
        conn.execute(&index, [])?;
    }
    Ok(())
}

fn add_columns(conn: &Connection, table: &str, columns: &[ColumnSchema]) -> Result<()> {
    let existing = table_columns(conn, table)?;
    if existing.is_empty() {
        return Err(Error::Migration(format!(
            "cannot add columns to missing table {table}"
        )));
    }

    for column in columns {
        match existing.get(column.name) {
            Some(declared) if declared.eq_ignore_ascii_case(column.kind.sql_type()) => {}
            Some(declared) => {
                return Err(Error::Migration(format!(
                    "column {table}.{} exists as {declared}, expected {}",
                    column.name,
                    column.kind.sql_type()
                )));
            }
            None => {
                conn.execute(
                    &format!("ALTER TABLE {table} ADD COLUMN {}", column.definition()),
                    [],
                )?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::base_schema;
    use pretty_assertions::assert_eq;

    fn setup() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    fn shape(conn: &Connection) -> BTreeMap<String, BTreeMap<String, String>> {
        app_schema()
            .tables
            .iter()
            .map(|table| {
                (
                    table.name.to_string(),
                    table_columns(conn, table.name).unwrap(),
                )
            })
            .collect()
    }

    fn v1_store() -> Connection {
        let mut conn = setup();
        materialize(&mut conn, base_schema()).unwrap();
        conn
    }

    #[test]
    fn test_fresh_store_is_materialized_at_current_version() {
        let mut conn = setup();
        let outcome = run(&mut conn).unwrap();
        assert_eq!(outcome, MigrationOutcome::Materialized { version: 5 });
        assert_eq!(get_version(&conn).unwrap(), 5);
        for table in app_schema().tables {
            assert!(!table_columns(&conn, table.name).unwrap().is_empty());
        }
    }

    #[test]
    fn test_migrations_idempotent() {
        let mut conn = setup();
        run(&mut conn).unwrap();
        let outcome = run(&mut conn).unwrap();
        assert_eq!(outcome, MigrationOutcome::UpToDate { version: 5 });
    }

    #[test]
    fn test_v1_store_upgrades_without_touching_rows() {
        let mut conn = v1_store();
        conn.execute(
            "INSERT INTO users (id, name, phone, is_mpin_set, created_at, updated_at)
             VALUES ('u1', 'Asha', '9800000000', 1, 10, 20)",
            [],
        )
        .unwrap();

        let outcome = run(&mut conn).unwrap();
        assert_eq!(outcome, MigrationOutcome::Migrated { from: 1, to: 5 });

        let users = table_columns(&conn, "users").unwrap();
        for column in USERS_PROFILE_COLUMNS.iter().chain(USERS_PHOTO_COLUMNS) {
            assert!(users.contains_key(column.name), "missing {}", column.name);
        }
        assert!(table_columns(&conn, "customers_b2b")
            .unwrap()
            .contains_key("team"));

        let (name, phone, updated_at, bank): (String, String, i64, Option<String>) = conn
            .query_row(
                "SELECT name, phone, updated_at, bank_name FROM users WHERE id = 'u1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .unwrap();
        assert_eq!(name, "Asha");
        assert_eq!(phone, "9800000000");
        assert_eq!(updated_at, 20);
        assert_eq!(bank, None);
    }

    #[test]
    fn test_replayed_chain_matches_materialized_shape() {
        let mut replayed = v1_store();
        run(&mut replayed).unwrap();

        let mut fresh = setup();
        run(&mut fresh).unwrap();

        assert_eq!(shape(&replayed), shape(&fresh));
    }

    #[test]
    fn test_reapplying_every_step_on_migrated_store_is_noop() {
        let mut conn = setup();
        run(&mut conn).unwrap();
        let before = shape(&conn);

        for migration in app_migrations() {
            for step in migration.steps {
                apply_step(&conn, step).unwrap();
            }
        }

        assert_eq!(shape(&conn), before);
    }

    #[test]
    fn test_newer_store_is_rejected() {
        let mut conn = setup();
        run(&mut conn).unwrap();
        conn.execute("INSERT INTO schema_version (version) VALUES (9)", [])
            .unwrap();

        let error = run(&mut conn).unwrap_err();
        assert!(matches!(
            error,
            Error::SchemaTooNew {
                stored: 9,
                target: 5
            }
        ));
    }

    #[test]
    fn test_column_type_change_is_refused() {
        let conn = setup();
        conn.execute("CREATE TABLE legacy (id TEXT PRIMARY KEY, team INTEGER)", [])
            .unwrap();
        let error = add_columns(&conn, "legacy", CUSTOMER_ASSIGNMENT_COLUMNS).unwrap_err();
        assert!(matches!(error, Error::Migration(_)));
    }

    #[test]
    fn test_chain_with_gap_is_rejected() {
        let broken = [APP_MIGRATIONS[0], APP_MIGRATIONS[2], APP_MIGRATIONS[3]];
        let error = validate_chain(&broken, 1, 5).unwrap_err();
        assert!(error.to_string().contains("does not follow"));
    }

    #[test]
    fn test_chain_must_reach_stored_version() {
        let partial = [APP_MIGRATIONS[2], APP_MIGRATIONS[3]];
        assert!(validate_chain(&partial, 1, 5).is_err());
        assert!(validate_chain(&partial, 3, 5).is_ok());
    }

    #[test]
    fn test_changes_since_folds_columns_into_new_tables() {
        let since_v3 = changes_since(3, app_migrations());
        assert_eq!(since_v3.tables, vec!["customers_b2b", "customers_b2c"]);
        assert!(since_v3.columns.is_empty());

        let since_v4 = changes_since(4, app_migrations());
        assert!(since_v4.tables.is_empty());
        assert_eq!(
            since_v4.columns.get("customers_b2c"),
            Some(&vec!["registered_by".to_string(), "team".to_string()])
        );

        assert!(changes_since(5, app_migrations()).is_empty());
    }
}
