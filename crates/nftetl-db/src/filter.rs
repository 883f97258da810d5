//! Filter predicates, ordering and select queries

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{DbError, DbResult};
use crate::sql::{self, Statement};
use crate::value::SqlValue;

/// Comparison operators allowed in a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Like,
    In,
}

impl Operator {
    pub fn as_sql(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Le => "<=",
            Operator::Ge => ">=",
            Operator::Like => "LIKE",
            Operator::In => "IN",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for Operator {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "=" | "==" => Ok(Operator::Eq),
            "!=" | "<>" => Ok(Operator::Ne),
            "<" => Ok(Operator::Lt),
            ">" => Ok(Operator::Gt),
            "<=" => Ok(Operator::Le),
            ">=" => Ok(Operator::Ge),
            "LIKE" => Ok(Operator::Like),
            "IN" => Ok(Operator::In),
            other => Err(DbError::InvalidValue(format!("unsupported operator '{}'", other))),
        }
    }
}

/// Right-hand side of a condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Value(SqlValue),
    List(Vec<SqlValue>),
}

impl From<SqlValue> for Operand {
    fn from(value: SqlValue) -> Self {
        Operand::Value(value)
    }
}

impl Operand {
    pub fn list<T: Into<SqlValue>>(values: impl IntoIterator<Item = T>) -> Self {
        Operand::List(values.into_iter().map(Into::into).collect())
    }
}

/// `column op operand`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub column: String,
    pub operator: Operator,
    pub operand: Operand,
}

impl Condition {
    pub fn new(column: impl Into<String>, operator: Operator, operand: impl Into<Operand>) -> Self {
        Self {
            column: column.into(),
            operator,
            operand: operand.into(),
        }
    }
}

/// A conjunction of conditions; empty matches every row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn and(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn eq(self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.and(Condition::new(column, Operator::Eq, Operand::Value(value.into())))
    }

    pub fn ne(self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.and(Condition::new(column, Operator::Ne, Operand::Value(value.into())))
    }

    pub fn lt(self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.and(Condition::new(column, Operator::Lt, Operand::Value(value.into())))
    }

    pub fn gt(self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.and(Condition::new(column, Operator::Gt, Operand::Value(value.into())))
    }

    pub fn le(self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.and(Condition::new(column, Operator::Le, Operand::Value(value.into())))
    }

    pub fn ge(self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.and(Condition::new(column, Operator::Ge, Operand::Value(value.into())))
    }

    pub fn like(self, column: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.and(Condition::new(
            column,
            Operator::Like,
            Operand::Value(SqlValue::Text(pattern.into())),
        ))
    }

    pub fn is_in<T: Into<SqlValue>>(
        self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = T>,
    ) -> Self {
        self.and(Condition::new(column, Operator::In, Operand::list(values)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Desc,
        }
    }
}

/// Builder for a select over one table
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub table: String,
    /// `None` selects every column
    pub columns: Option<Vec<String>>,
    pub filter: Filter,
    pub order_by: Option<OrderBy>,
    pub limit: Option<u64>,
}

impl Select {
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: None,
            filter: Filter::default(),
            order_by: None,
            limit: None,
        }
    }

    pub fn columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn order_by(mut self, order_by: OrderBy) -> Self {
        self.order_by = Some(order_by);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Validate identifiers and render the parameterised statement
    pub fn prepare(&self) -> DbResult<PreparedSelect> {
        Ok(PreparedSelect {
            statement: sql::select(self)?,
        })
    }
}

/// A rendered select, ready to be streamed by [`crate::Database::select`]
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedSelect {
    pub(crate) statement: Statement,
}

impl PreparedSelect {
    pub fn sql(&self) -> &str {
        &self.statement.sql
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.statement.params
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_from_str() {
        assert_eq!("=".parse::<Operator>().unwrap(), Operator::Eq);
        assert_eq!("<>".parse::<Operator>().unwrap(), Operator::Ne);
        assert_eq!("like".parse::<Operator>().unwrap(), Operator::Like);
        assert_eq!(" in ".parse::<Operator>().unwrap(), Operator::In);
        assert!("~".parse::<Operator>().is_err());
    }

    #[test]
    fn test_filter_builder_keeps_order() {
        let filter = Filter::new().eq("owner", "alice").is_in("id", [1, 2, 3]);
        assert_eq!(filter.conditions.len(), 2);
        assert_eq!(filter.conditions[0].operator, Operator::Eq);
        assert_eq!(
            filter.conditions[1].operand,
            Operand::List(vec![SqlValue::Int(1), SqlValue::Int(2), SqlValue::Int(3)])
        );
    }
}
