//! Column values and rows

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{Arguments, Column, Row as _, TypeInfo};
use std::collections::BTreeMap;

use crate::error::{DbError, DbResult};

/// A row as column name → value
pub type Row = BTreeMap<String, SqlValue>;

/// A single column value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Timestamp(DateTime<Utc>),
    Text(String),
    Json(serde_json::Value),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            SqlValue::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            SqlValue::Timestamp(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(i64::from(v))
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(v)
    }
}

impl From<serde_json::Value> for SqlValue {
    fn from(v: serde_json::Value) -> Self {
        SqlValue::Json(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

/// Build bound arguments for a rendered statement.
///
/// `Null` never reaches this point: statements render it as a literal so the
/// server infers the column type.
pub(crate) fn arguments(params: &[SqlValue]) -> DbResult<PgArguments> {
    let mut args = PgArguments::default();

    for param in params {
        let added = match param {
            SqlValue::Null => args.add(Option::<String>::None),
            SqlValue::Bool(v) => args.add(*v),
            SqlValue::Int(v) => args.add(*v),
            SqlValue::Float(v) => args.add(*v),
            SqlValue::Timestamp(v) => args.add(*v),
            SqlValue::Text(v) => args.add(v.clone()),
            SqlValue::Json(v) => args.add(sqlx::types::Json(v.clone())),
        };
        added.map_err(|e| DbError::InvalidValue(e.to_string()))?;
    }

    Ok(args)
}

fn decode_error(column: &str, err: sqlx::Error) -> DbError {
    DbError::Query(format!("failed to decode column '{}': {}", column, err))
}

/// Decode a driver row by inspecting each column's PostgreSQL type
pub(crate) fn decode_row(row: &PgRow) -> DbResult<Row> {
    let mut decoded = Row::new();

    for column in row.columns() {
        let name = column.name();
        let index = column.ordinal();
        let get_err = |e| decode_error(name, e);

        let value = match column.type_info().name() {
            "BOOL" => row.try_get::<Option<bool>, _>(index).map_err(get_err)?.map(SqlValue::Bool),
            "INT2" => row
                .try_get::<Option<i16>, _>(index)
                .map_err(get_err)?
                .map(|v| SqlValue::Int(i64::from(v))),
            "INT4" => row
                .try_get::<Option<i32>, _>(index)
                .map_err(get_err)?
                .map(|v| SqlValue::Int(i64::from(v))),
            "INT8" => row.try_get::<Option<i64>, _>(index).map_err(get_err)?.map(SqlValue::Int),
            "FLOAT4" => row
                .try_get::<Option<f32>, _>(index)
                .map_err(get_err)?
                .map(|v| SqlValue::Float(f64::from(v))),
            "FLOAT8" => row.try_get::<Option<f64>, _>(index).map_err(get_err)?.map(SqlValue::Float),
            "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" => {
                row.try_get::<Option<String>, _>(index).map_err(get_err)?.map(SqlValue::Text)
            },
            "JSON" | "JSONB" => row
                .try_get::<Option<serde_json::Value>, _>(index)
                .map_err(get_err)?
                .map(SqlValue::Json),
            "TIMESTAMPTZ" => row
                .try_get::<Option<DateTime<Utc>>, _>(index)
                .map_err(get_err)?
                .map(SqlValue::Timestamp),
            "TIMESTAMP" => row
                .try_get::<Option<NaiveDateTime>, _>(index)
                .map_err(get_err)?
                .map(|v| SqlValue::Timestamp(v.and_utc())),
            other => {
                return Err(DbError::Query(format!(
                    "column '{}' has unsupported type {}",
                    name, other
                )))
            },
        };

        decoded.insert(name.to_string(), value.unwrap_or(SqlValue::Null));
    }

    Ok(decoded)
}
