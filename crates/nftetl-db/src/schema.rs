//! Column definitions for table creation and alteration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DbError;

/// Column type tags understood by the access layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    /// Auto-incrementing 4-byte integer
    Serial,
    /// Auto-incrementing 8-byte integer
    BigSerial,
    Integer,
    BigInt,
    Double,
    Boolean,
    Text,
    Varchar(u32),
    Timestamp,
    TimestampTz,
    Jsonb,
}

impl ColumnType {
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            ColumnType::Serial | ColumnType::BigSerial | ColumnType::Integer | ColumnType::BigInt
        )
    }

    /// Type to use in `ALTER COLUMN ... TYPE`; serial pseudo-types are only valid at creation
    pub(crate) fn storage_type(self) -> ColumnType {
        match self {
            ColumnType::Serial => ColumnType::Integer,
            ColumnType::BigSerial => ColumnType::BigInt,
            other => other,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Serial => write!(f, "SERIAL"),
            ColumnType::BigSerial => write!(f, "BIGSERIAL"),
            ColumnType::Integer => write!(f, "INTEGER"),
            ColumnType::BigInt => write!(f, "BIGINT"),
            ColumnType::Double => write!(f, "DOUBLE PRECISION"),
            ColumnType::Boolean => write!(f, "BOOLEAN"),
            ColumnType::Text => write!(f, "TEXT"),
            ColumnType::Varchar(len) => write!(f, "VARCHAR({})", len),
            ColumnType::Timestamp => write!(f, "TIMESTAMP"),
            ColumnType::TimestampTz => write!(f, "TIMESTAMPTZ"),
            ColumnType::Jsonb => write!(f, "JSONB"),
        }
    }
}

impl FromStr for ColumnType {
    type Err = DbError;

    /// Parse tags such as `SERIAL`, `VARCHAR(255)`, `jsonb`, `timestamp with time zone`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
        let invalid = || DbError::InvalidValue(format!("unknown column type '{}'", s));

        if let Some(rest) = normalized.strip_prefix("VARCHAR") {
            let rest = rest.trim();
            if rest.is_empty() {
                return Ok(ColumnType::Text);
            }
            let len = rest
                .strip_prefix('(')
                .and_then(|r| r.strip_suffix(')'))
                .and_then(|n| n.trim().parse::<u32>().ok())
                .filter(|n| *n > 0)
                .ok_or_else(invalid)?;
            return Ok(ColumnType::Varchar(len));
        }

        match normalized.as_str() {
            "SERIAL" => Ok(ColumnType::Serial),
            "BIGSERIAL" => Ok(ColumnType::BigSerial),
            "INTEGER" | "INT" | "INT4" => Ok(ColumnType::Integer),
            "BIGINT" | "INT8" => Ok(ColumnType::BigInt),
            "DOUBLE" | "DOUBLE PRECISION" | "FLOAT8" | "REAL" => Ok(ColumnType::Double),
            "BOOLEAN" | "BOOL" => Ok(ColumnType::Boolean),
            "TEXT" => Ok(ColumnType::Text),
            "TIMESTAMP" | "TIMESTAMP WITHOUT TIME ZONE" => Ok(ColumnType::Timestamp),
            "TIMESTAMPTZ" | "TIMESTAMP WITH TIME ZONE" => Ok(ColumnType::TimestampTz),
            "JSONB" | "JSON" => Ok(ColumnType::Jsonb),
            _ => Err(invalid()),
        }
    }
}

/// Server-side default for a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DefaultValue {
    /// Insertion time
    Now,
    Integer(i64),
    Boolean(bool),
    EmptyJsonArray,
}

impl fmt::Display for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Now => write!(f, "now()"),
            DefaultValue::Integer(v) => write!(f, "{}", v),
            DefaultValue::Boolean(v) => write!(f, "{}", if *v { "TRUE" } else { "FALSE" }),
            DefaultValue::EmptyJsonArray => write!(f, "'[]'::jsonb"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnConstraint {
    PrimaryKey,
    NotNull,
    Unique,
    Default(DefaultValue),
}

impl fmt::Display for ColumnConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnConstraint::PrimaryKey => write!(f, "PRIMARY KEY"),
            ColumnConstraint::NotNull => write!(f, "NOT NULL"),
            ColumnConstraint::Unique => write!(f, "UNIQUE"),
            ColumnConstraint::Default(value) => write!(f, "DEFAULT {}", value),
        }
    }
}

/// One column of a table definition, in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
    pub constraints: Vec<ColumnConstraint>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            constraints: Vec::new(),
        }
    }

    pub fn primary_key(self) -> Self {
        self.constraint(ColumnConstraint::PrimaryKey)
    }

    pub fn not_null(self) -> Self {
        self.constraint(ColumnConstraint::NotNull)
    }

    pub fn unique(self) -> Self {
        self.constraint(ColumnConstraint::Unique)
    }

    pub fn default_value(self, value: DefaultValue) -> Self {
        self.constraint(ColumnConstraint::Default(value))
    }

    pub fn constraint(mut self, constraint: ColumnConstraint) -> Self {
        if !self.constraints.contains(&constraint) {
            self.constraints.push(constraint);
        }
        self
    }

    pub fn is_primary_key(&self) -> bool {
        self.constraints.contains(&ColumnConstraint::PrimaryKey)
    }
}
