use std::path::Path;

use chrono::Utc;
use fieldbook_core::models::SyncConflict;
use fieldbook_core::{
    Collection, CustomerB2B, CustomerB2C, LocalStore, Query, Record, RecordId, User, WorkApproval,
};
use serde::Serialize;
use serde_json::Value;

use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct RecordListItem {
    pub id: String,
    pub label: String,
    pub updated_at: i64,
    pub relative_time: String,
    pub record: Value,
}

#[derive(Debug, Serialize)]
pub struct SyncConflictItem {
    pub id: i64,
    pub collection: String,
    pub record_id: String,
    pub local_updated_at: i64,
    pub incoming_updated_at: i64,
    pub resolved_at: i64,
    pub resolved_at_iso: String,
    pub strategy: String,
    pub winner: String,
}

pub fn open_store(db_path: &Path) -> Result<LocalStore, CliError> {
    Ok(LocalStore::open(db_path)?)
}

pub fn normalize_record_id(raw: &str) -> Result<RecordId, CliError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CliError::EmptyRecordId);
    }
    Ok(RecordId::from(trimmed))
}

pub async fn list_records(
    store: &LocalStore,
    collection: Collection,
    limit: usize,
) -> Result<Vec<RecordListItem>, CliError> {
    let query = Query::new().limit(limit);
    match collection {
        Collection::Users => list_items::<User>(store, &query).await,
        Collection::CustomersB2B => list_items::<CustomerB2B>(store, &query).await,
        Collection::CustomersB2C => list_items::<CustomerB2C>(store, &query).await,
        Collection::WorkApprovals => list_items::<WorkApproval>(store, &query).await,
    }
}

async fn list_items<R: Record>(
    store: &LocalStore,
    query: &Query,
) -> Result<Vec<RecordListItem>, CliError> {
    let now = Utc::now().timestamp_millis();
    store
        .query::<R>(query)
        .await?
        .iter()
        .map(|record| record_to_item(record, now))
        .collect()
}

pub fn record_to_item<R: Record>(record: &R, now_ms: i64) -> Result<RecordListItem, CliError> {
    let value = serde_json::to_value(record)?;
    Ok(RecordListItem {
        id: record.id().to_string(),
        label: record_label(&value),
        updated_at: record.updated_at(),
        relative_time: format_relative_time(record.updated_at(), now_ms),
        record: value,
    })
}

/// Human label for a record: its name, else the approval reason and date
pub fn record_label(record: &Value) -> String {
    let text = |key: &str| {
        record
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    if let Some(name) = text("name") {
        return name.to_string();
    }
    match (text("reason"), text("date")) {
        (Some(reason), Some(date)) => format!("{reason} ({date})"),
        (Some(reason), None) => reason.to_string(),
        (None, Some(date)) => date.to_string(),
        (None, None) => "(untitled)".to_string(),
    }
}

pub fn format_record_lines(items: &[RecordListItem]) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            format!(
                "{}  {:<8}  {}",
                short_id(&item.id),
                item.relative_time,
                item.label
            )
        })
        .collect()
}

pub fn short_id(id: &str) -> String {
    id.chars().take(13).collect()
}

pub fn sync_conflict_to_item(conflict: &SyncConflict) -> SyncConflictItem {
    SyncConflictItem {
        id: conflict.id,
        collection: conflict.collection.clone(),
        record_id: conflict.record_id.clone(),
        local_updated_at: conflict.local_updated_at,
        incoming_updated_at: conflict.incoming_updated_at,
        resolved_at: conflict.resolved_at,
        resolved_at_iso: format_sync_timestamp(conflict.resolved_at),
        strategy: conflict.strategy.clone(),
        winner: conflict.winner.to_string(),
    }
}

pub fn format_sync_conflict_lines(conflicts: &[SyncConflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            format!(
                "{}  {:<13}  {}={}  winner={}  local={} incoming={}",
                format_sync_timestamp(conflict.resolved_at),
                conflict.strategy,
                conflict.collection,
                conflict.record_id,
                conflict.winner,
                conflict.local_updated_at,
                conflict.incoming_updated_at
            )
        })
        .collect()
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < year {
        format!("{}w ago", diff / week)
    } else {
        format!("{}y ago", diff / year)
    }
}
