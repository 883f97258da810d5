//! Database error taxonomy

use thiserror::Error;

/// Database operation errors, grouped by how callers should react to them
#[derive(Error, Debug)]
pub enum DbError {
    /// Target unreachable, credentials rejected, or the connection dropped
    #[error("Database connection error: {0}. Check DB_HOST, DB_PORT, DB_USER, DB_PASSWORD and DB_NAME.")]
    Connection(String),

    /// An operation was attempted after `disconnect`
    #[error("No open database connection")]
    NotConnected,

    /// Unknown or duplicate table/column, or an unusable table definition
    #[error("Schema error: {0}")]
    Schema(String),

    /// A single insert/update/delete was rejected (constraint, type mismatch)
    #[error("Write failed: {0}")]
    Write(String),

    /// A read failed for a reason other than schema or connection
    #[error("Query failed: {0}")]
    Query(String),

    #[error("Invalid identifier '{0}': expected [A-Za-z_][A-Za-z0-9_]* of at most 63 bytes")]
    InvalidIdentifier(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Database configuration error: {0}")]
    Config(String),
}

pub type DbResult<T> = Result<T, DbError>;

impl DbError {
    /// Connection-level failures abort whatever is running on this handle
    pub fn is_connection(&self) -> bool {
        matches!(self, DbError::Connection(_) | DbError::NotConnected)
    }

    pub fn is_schema(&self) -> bool {
        matches!(self, DbError::Schema(_) | DbError::InvalidIdentifier(_))
    }

    /// Row-scoped failures; the connection is still usable afterwards
    pub fn is_write(&self) -> bool {
        matches!(self, DbError::Write(_) | DbError::InvalidValue(_))
    }
}

impl From<nftetl_common::EnvError> for DbError {
    fn from(err: nftetl_common::EnvError) -> Self {
        DbError::Config(err.to_string())
    }
}

/// What the failing call was doing; decides how ambiguous errors are filed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation {
    Connect,
    Ddl,
    Write,
    Read,
}

const UNDEFINED_TABLE: &str = "42P01";
const UNDEFINED_COLUMN: &str = "42703";
const DUPLICATE_TABLE: &str = "42P07";
const DUPLICATE_COLUMN: &str = "42701";
const INVALID_CATALOG_NAME: &str = "3D000";
const PROTOCOL_VIOLATION: &str = "08P01";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorKind {
    Connection,
    Schema,
    Write,
    Query,
}

impl ErrorKind {
    fn into_error(self, message: String) -> DbError {
        match self {
            ErrorKind::Connection => DbError::Connection(message),
            ErrorKind::Schema => DbError::Schema(message),
            ErrorKind::Write => DbError::Write(message),
            ErrorKind::Query => DbError::Query(message),
        }
    }

    fn for_operation(op: Operation) -> Self {
        match op {
            Operation::Connect => ErrorKind::Connection,
            Operation::Ddl => ErrorKind::Schema,
            Operation::Write => ErrorKind::Write,
            Operation::Read => ErrorKind::Query,
        }
    }
}

/// File a PostgreSQL SQLSTATE under our taxonomy
pub(crate) fn kind_for_sqlstate(code: &str, op: Operation) -> ErrorKind {
    // The server answered, so the session is still alive
    if code == PROTOCOL_VIOLATION && op != Operation::Connect {
        return ErrorKind::for_operation(op);
    }
    // 08: connection exception, 28: invalid authorization, 57P: operator intervention
    if code.starts_with("08") || code.starts_with("28") || code.starts_with("57P") {
        return ErrorKind::Connection;
    }
    if code == INVALID_CATALOG_NAME {
        return ErrorKind::Connection;
    }
    if matches!(code, UNDEFINED_TABLE | UNDEFINED_COLUMN | DUPLICATE_TABLE | DUPLICATE_COLUMN) {
        return ErrorKind::Schema;
    }
    // Remaining syntax/access-rule errors (class 42) during DDL are definition problems
    if op == Operation::Ddl && code.starts_with("42") {
        return ErrorKind::Schema;
    }
    ErrorKind::for_operation(op)
}

/// Convert a driver error into a [`DbError`]
pub(crate) fn classify(err: sqlx::Error, op: Operation) -> DbError {
    let kind = match &err {
        sqlx::Error::Database(db_err) => match db_err.code() {
            Some(code) => kind_for_sqlstate(&code, op),
            None => ErrorKind::for_operation(op),
        },
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Configuration(_) => ErrorKind::Connection,
        _ => ErrorKind::for_operation(op),
    };

    kind.into_error(err.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_undefined_objects_are_schema_errors_for_every_operation() {
        for op in [Operation::Ddl, Operation::Write, Operation::Read] {
            assert_eq!(kind_for_sqlstate(UNDEFINED_TABLE, op), ErrorKind::Schema);
            assert_eq!(kind_for_sqlstate(UNDEFINED_COLUMN, op), ErrorKind::Schema);
        }
        assert_eq!(kind_for_sqlstate(DUPLICATE_TABLE, Operation::Ddl), ErrorKind::Schema);
    }

    #[test]
    fn test_type_mismatch_on_insert_is_a_write_error() {
        // 42804 datatype_mismatch, 22P02 invalid_text_representation, 23505 unique_violation
        assert_eq!(kind_for_sqlstate("42804", Operation::Write), ErrorKind::Write);
        assert_eq!(kind_for_sqlstate("22P02", Operation::Write), ErrorKind::Write);
        assert_eq!(kind_for_sqlstate("23505", Operation::Write), ErrorKind::Write);
        assert_eq!(kind_for_sqlstate("42804", Operation::Ddl), ErrorKind::Schema);
    }

    #[test]
    fn test_connection_classes() {
        assert_eq!(kind_for_sqlstate("28P01", Operation::Connect), ErrorKind::Connection);
        assert_eq!(kind_for_sqlstate("08006", Operation::Write), ErrorKind::Connection);
        assert_eq!(kind_for_sqlstate("57P01", Operation::Read), ErrorKind::Connection);
        assert_eq!(kind_for_sqlstate(INVALID_CATALOG_NAME, Operation::Connect), ErrorKind::Connection);
    }

    #[test]
    fn test_protocol_violation_keeps_operation_kind() {
        assert_eq!(kind_for_sqlstate(PROTOCOL_VIOLATION, Operation::Write), ErrorKind::Write);
        assert_eq!(kind_for_sqlstate(PROTOCOL_VIOLATION, Operation::Read), ErrorKind::Query);
        assert_eq!(kind_for_sqlstate(PROTOCOL_VIOLATION, Operation::Connect), ErrorKind::Connection);
    }

    #[test]
    fn test_classify_driver_errors() {
        assert!(classify(sqlx::Error::PoolTimedOut, Operation::Write).is_connection());
        assert!(classify(sqlx::Error::RowNotFound, Operation::Write).is_write());
        assert!(matches!(classify(sqlx::Error::RowNotFound, Operation::Read), DbError::Query(_)));
    }
}
