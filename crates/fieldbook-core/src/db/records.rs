//! Mapping between typed records and table rows
//!
//! Records cross the storage boundary as JSON objects: serde produces one from
//! the struct, and the table's static column list decides which keys become
//! columns and how each value is stored.

use rusqlite::types::Value;
use rusqlite::Row;
use serde_json::{Map, Number, Value as Json};

use super::schema::{ColumnSchema, ColumnType, TableSchema};
use crate::error::{Error, Result};
use crate::models::Record;

/// Leading columns of every record `SELECT`, ahead of the field columns
const LEADING_COLUMNS: usize = 3;

/// `SELECT` list for a table: id, timestamps, then field columns in schema order
pub(crate) fn select_list(table: &TableSchema) -> String {
    ["id", "created_at", "updated_at"]
        .into_iter()
        .chain(table.columns.iter().map(|column| column.name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Field column values of `record`, in schema order
pub(crate) fn field_values<R: Record>(record: &R, table: &TableSchema) -> Result<Vec<Value>> {
    let Json::Object(document) = serde_json::to_value(record)? else {
        return Err(Error::Validation(format!(
            "{} records must serialize to an object",
            table.name
        )));
    };

    table
        .columns
        .iter()
        .map(|column| to_sql(column, document.get(column.name), table))
        .collect()
}

/// Check the columns the storage layer requires
pub(crate) fn validate<R: Record>(record: &R, table: &TableSchema) -> Result<()> {
    if record.id().is_blank() {
        return Err(Error::Validation(format!("{} record id is blank", table.name)));
    }

    let values = field_values(record, table)?;
    for (column, value) in table.columns.iter().zip(&values) {
        if column.optional || column.kind != ColumnType::String {
            continue;
        }
        match value {
            Value::Text(text) if !text.trim().is_empty() => {}
            _ => {
                return Err(Error::Validation(format!(
                    "{}.{} is required",
                    table.name, column.name
                )));
            }
        }
    }
    Ok(())
}

/// Decode a row selected with [`select_list`]
pub(crate) fn from_row<R: Record>(row: &Row<'_>, table: &TableSchema) -> Result<R> {
    let mut document = Map::new();
    document.insert("id".into(), Json::String(row.get(0)?));
    document.insert("created_at".into(), Json::from(row.get::<_, i64>(1)?));
    document.insert("updated_at".into(), Json::from(row.get::<_, i64>(2)?));

    for (index, column) in table.columns.iter().enumerate() {
        let value: Value = row.get(LEADING_COLUMNS + index)?;
        document.insert(column.name.to_string(), to_json(column, value));
    }

    Ok(serde_json::from_value(Json::Object(document))?)
}

fn to_sql(column: &ColumnSchema, value: Option<&Json>, table: &TableSchema) -> Result<Value> {
    let mismatch = || {
        Error::Validation(format!(
            "{}.{} expects a {} value",
            table.name,
            column.name,
            column.kind.sql_type()
        ))
    };

    match (column.kind, value) {
        (_, None | Some(Json::Null)) if column.optional => Ok(Value::Null),
        (ColumnType::String, None | Some(Json::Null)) => Ok(Value::Text(String::new())),
        (ColumnType::Number | ColumnType::Boolean, None | Some(Json::Null)) => {
            Ok(Value::Integer(0))
        }
        (ColumnType::String, Some(Json::String(text))) => Ok(Value::Text(text.clone())),
        (ColumnType::Boolean, Some(Json::Bool(flag))) => Ok(Value::Integer(i64::from(*flag))),
        (ColumnType::Number, Some(Json::Number(number))) => number
            .as_i64()
            .map(Value::Integer)
            .or_else(|| number.as_f64().map(Value::Real))
            .ok_or_else(mismatch),
        _ => Err(mismatch()),
    }
}

fn to_json(column: &ColumnSchema, value: Value) -> Json {
    match (column.kind, value) {
        (_, Value::Null) => Json::Null,
        (ColumnType::Boolean, Value::Integer(flag)) => Json::Bool(flag != 0),
        (ColumnType::Boolean, Value::Real(flag)) => Json::Bool(flag.abs() > f64::EPSILON),
        (ColumnType::Number, Value::Integer(number)) => Json::from(number),
        (ColumnType::Number, Value::Real(number)) => {
            Number::from_f64(number).map_or(Json::Null, Json::Number)
        }
        (ColumnType::String, Value::Integer(number)) => Json::String(number.to_string()),
        (ColumnType::String, Value::Real(number)) => Json::String(number.to_string()),
        (_, Value::Text(text)) => Json::String(text),
        (_, Value::Blob(_)) => Json::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::app_schema;
    use crate::models::{User, WorkApproval};

    fn users() -> &'static TableSchema {
        app_schema().table("users").unwrap()
    }

    #[test]
    fn test_field_values_follow_schema_types() {
        let user = User {
            id: "u1".into(),
            name: "Asha".into(),
            phone: Some("9800000000".into()),
            is_mpin_set: true,
            ..User::default()
        };

        let values = field_values(&user, users()).unwrap();
        assert_eq!(values.len(), users().columns.len());
        assert_eq!(values[0], Value::Text("Asha".into()));
        assert_eq!(values[2], Value::Text("9800000000".into()));
        assert_eq!(values[1], Value::Null);
        assert_eq!(values[7], Value::Integer(1));
    }

    #[test]
    fn test_validate_requires_non_blank_text() {
        let approval = WorkApproval {
            id: "w1".into(),
            date: "2024-05-01".into(),
            reason: "   ".into(),
            description: "site visit".into(),
            ..WorkApproval::default()
        };
        let table = app_schema().table("work_approvals").unwrap();
        let error = validate(&approval, table).unwrap_err();
        assert!(error.to_string().contains("work_approvals.reason"));
    }

    #[test]
    fn test_validate_rejects_blank_id() {
        let user = User {
            name: "Asha".into(),
            ..User::default()
        };
        assert!(validate(&user, users()).is_err());
    }

    #[test]
    fn test_select_list_starts_with_system_columns() {
        let list = select_list(users());
        assert!(list.starts_with("id, created_at, updated_at, name, email"));
        assert!(list.ends_with("profile_photo"));
    }
}
