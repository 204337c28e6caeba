//! Record query builder

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use rusqlite::types::Value;

use super::records::select_list;
use super::schema::{TableSchema, DELETED_COLUMN};
use crate::error::{Error, Result};

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    Asc,
    #[default]
    Desc,
}

impl Order {
    const fn sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// A value compared against a column
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Integer(i64),
    Real(f64),
    Bool(bool),
    Null,
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for FilterValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Filter {
    Equals(String, FilterValue),
    Contains(String, String),
}

/// Filter, sort and page over one collection's live records
///
/// Tombstoned records are never part of the result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    filters: Vec<Filter>,
    order: Vec<(String, Order)>,
    limit: Option<usize>,
    offset: usize,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep records whose `column` equals `value` (`IS NULL` for `None`)
    #[must_use]
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.filters.push(Filter::Equals(column.into(), value.into()));
        self
    }

    /// Keep records whose `column` contains `text`, ignoring ASCII case
    #[must_use]
    pub fn contains(mut self, column: impl Into<String>, text: impl Into<String>) -> Self {
        self.filters.push(Filter::Contains(column.into(), text.into()));
        self
    }

    #[must_use]
    pub fn order_by(mut self, column: impl Into<String>, order: Order) -> Self {
        self.order.push((column.into(), order));
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub const fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Build the `SELECT` for `table` and its bound parameters
    pub(crate) fn to_sql(&self, table: &TableSchema) -> Result<(String, Vec<Value>)> {
        let mut clauses = vec![format!("{DELETED_COLUMN} = 0")];
        let mut params = Vec::new();

        for filter in &self.filters {
            match filter {
                Filter::Equals(column, FilterValue::Null) => {
                    check_column(table, column)?;
                    clauses.push(format!("{column} IS NULL"));
                }
                Filter::Equals(column, value) => {
                    check_column(table, column)?;
                    clauses.push(format!("{column} = ?"));
                    params.push(match value {
                        FilterValue::Text(text) => Value::Text(text.clone()),
                        FilterValue::Integer(number) => Value::Integer(*number),
                        FilterValue::Real(number) => Value::Real(*number),
                        FilterValue::Bool(flag) => Value::Integer(i64::from(*flag)),
                        FilterValue::Null => Value::Null,
                    });
                }
                Filter::Contains(column, text) => {
                    check_column(table, column)?;
                    clauses.push(format!("{column} LIKE ? ESCAPE '\\'"));
                    params.push(Value::Text(format!("%{}%", escape_like(text))));
                }
            }
        }

        let mut order = Vec::with_capacity(self.order.len() + 1);
        for (column, direction) in &self.order {
            check_column(table, column)?;
            order.push(format!("{column} {}", direction.sql()));
        }
        if order.is_empty() {
            order.push("updated_at DESC".to_string());
        }
        order.push("id ASC".to_string());

        let sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY {} LIMIT ? OFFSET ?",
            select_list(table),
            table.name,
            clauses.join(" AND "),
            order.join(", ")
        );
        params.push(Value::Integer(self.limit.map_or(-1, |limit| limit as i64)));
        params.push(Value::Integer(self.offset as i64));

        Ok((sql, params))
    }
}

fn check_column(table: &TableSchema, column: &str) -> Result<()> {
    if table.is_queryable(column) {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "unknown column {column} in {}",
            table.name
        )))
    }
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::app_schema;
    use pretty_assertions::assert_eq;

    fn customers() -> &'static TableSchema {
        app_schema().table("customers_b2c").unwrap()
    }

    #[test]
    fn test_default_query_excludes_tombstones_and_sorts_newest_first() {
        let (sql, params) = Query::new().to_sql(customers()).unwrap();
        assert!(sql.contains("WHERE is_deleted = 0 ORDER BY updated_at DESC, id ASC"));
        assert_eq!(params, vec![Value::Integer(-1), Value::Integer(0)]);
    }

    #[test]
    fn test_filters_bind_parameters() {
        let (sql, params) = Query::new()
            .eq("team", "north")
            .eq("email", None::<String>)
            .contains("name", "50%")
            .order_by("name", Order::Asc)
            .limit(10)
            .offset(20)
            .to_sql(customers())
            .unwrap();

        assert!(sql.contains("team = ? AND email IS NULL AND name LIKE ? ESCAPE '\\'"));
        assert!(sql.contains("ORDER BY name ASC, id ASC"));
        assert_eq!(
            params,
            vec![
                Value::Text("north".into()),
                Value::Text("%50\\%%".into()),
                Value::Integer(10),
                Value::Integer(20),
            ]
        );
    }

    #[test]
    fn test_unknown_columns_are_rejected() {
        let error = Query::new()
            .eq("1 = 1 OR name", "x")
            .to_sql(customers())
            .unwrap_err();
        assert!(matches!(error, Error::Validation(_)));

        let error = Query::new()
            .order_by("_status", Order::Asc)
            .to_sql(customers())
            .unwrap_err();
        assert!(matches!(error, Error::Validation(_)));
    }
}
