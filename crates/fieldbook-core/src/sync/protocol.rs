//! Wire payloads of the sync endpoint
//!
//! Field names follow the endpoint's JSON contract (`lastPulledAt`,
//! `schemaVersion`, per-collection `created`/`updated`/`deleted`).

use serde::{Deserialize, Serialize};

use crate::db::SchemaChanges;
use crate::models::{Collection, CustomerB2B, CustomerB2C, RecordId, User, WorkApproval};

/// Delta of one collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableChanges<R> {
    #[serde(default)]
    pub created: Vec<R>,
    #[serde(default)]
    pub updated: Vec<R>,
    #[serde(default)]
    pub deleted: Vec<RecordId>,
}

impl<R> Default for TableChanges<R> {
    fn default() -> Self {
        Self {
            created: Vec::new(),
            updated: Vec::new(),
            deleted: Vec::new(),
        }
    }
}

impl<R> TableChanges<R> {
    pub fn len(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Delta across every synchronized collection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncChanges {
    #[serde(default)]
    pub users: TableChanges<User>,
    #[serde(default)]
    pub customers_b2b: TableChanges<CustomerB2B>,
    #[serde(default)]
    pub customers_b2c: TableChanges<CustomerB2C>,
    #[serde(default)]
    pub work_approvals: TableChanges<WorkApproval>,
}

impl SyncChanges {
    /// Total number of created, updated and deleted entries
    pub fn len(&self) -> usize {
        self.users.len()
            + self.customers_b2b.len()
            + self.customers_b2c.len()
            + self.work_approvals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries for one collection
    pub fn len_of(&self, collection: Collection) -> usize {
        match collection {
            Collection::Users => self.users.len(),
            Collection::CustomersB2B => self.customers_b2b.len(),
            Collection::CustomersB2C => self.customers_b2c.len(),
            Collection::WorkApprovals => self.work_approvals.len(),
        }
    }
}

/// Columns added to one existing table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnAdditions {
    pub table: String,
    pub columns: Vec<String>,
}

/// Schema changes since the version this device last synced with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationSyncChanges {
    pub from: u32,
    pub tables: Vec<String>,
    pub columns: Vec<ColumnAdditions>,
}

impl MigrationSyncChanges {
    /// `None` when nothing was added since `from`
    pub fn from_schema_changes(from: u32, changes: SchemaChanges) -> Option<Self> {
        if changes.is_empty() {
            return None;
        }
        Some(Self {
            from,
            tables: changes.tables,
            columns: changes
                .columns
                .into_iter()
                .map(|(table, columns)| ColumnAdditions { table, columns })
                .collect(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    pub last_pulled_at: Option<i64>,
    pub schema_version: u32,
    pub migration: Option<MigrationSyncChanges>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullResponse {
    pub changes: SyncChanges,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    pub last_pulled_at: i64,
    pub changes: SyncChanges,
}
