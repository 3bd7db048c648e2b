//! Column inference from extracted records.
//!
//! Column names are normalized to snake_case. Types come from the first
//! non-null value seen for a column; nested objects and arrays are stored as
//! JSON text, never flattened into child tables.

use crate::Record;
use serde_json::Value;

/// SQLite storage class of a column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SqlType {
    Integer,
    Real,
    Text,
    /// JSON document stored as text.
    Json,
}

impl SqlType {
    pub fn ddl(&self) -> &'static str {
        match self {
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::Text | SqlType::Json => "TEXT",
        }
    }

    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(SqlType::Integer),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(SqlType::Integer),
            Value::Number(_) => Some(SqlType::Real),
            Value::String(_) => Some(SqlType::Text),
            Value::Array(_) | Value::Object(_) => Some(SqlType::Json),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub sql_type: SqlType,
}

/// Normalizes a record key into a column name: `createdDate` → `created_date`,
/// `Email.ID` → `email_id`, `$type` → `type`.
pub fn normalize_identifier(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 4);
    let mut prev: Option<char> = None;

    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            let boundary = c.is_ascii_uppercase()
                && matches!(prev, Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit());
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
        prev = Some(c);
    }

    while out.ends_with('_') {
        out.pop();
    }
    if out.is_empty() {
        return "_".to_string();
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Ordered union of the columns present in `records`.
///
/// Columns that are null in every record are typed as text.
pub fn infer_columns(records: &[Record]) -> Vec<Column> {
    let mut columns: Vec<Column> = Vec::new();
    let mut typed: Vec<bool> = Vec::new();

    for record in records {
        for (key, value) in record {
            let name = normalize_identifier(key);
            let sql_type = SqlType::of(value);
            match columns.iter().position(|c| c.name == name) {
                Some(idx) => {
                    if !typed[idx] {
                        if let Some(t) = sql_type {
                            columns[idx].sql_type = t;
                            typed[idx] = true;
                        }
                    }
                }
                None => {
                    columns.push(Column {
                        name,
                        sql_type: sql_type.unwrap_or(SqlType::Text),
                    });
                    typed.push(sql_type.is_some());
                }
            }
        }
    }
    columns
}

/// Converts a JSON value into a SQLite value of the column's storage class.
pub(crate) fn to_sql_value(value: &Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;
    match value {
        Value::Null => Sql::Null,
        Value::Bool(b) => Sql::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Sql::Integer(i),
            None => Sql::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => Sql::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => Sql::Text(value.to_string()),
    }
}

/// Quotes a SQL identifier.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
