//! The connection handle and every table and row operation
//!
//! [`Database`] owns exactly one [`PgConnection`]. Operations run one at a
//! time through `&mut self`; after [`Database::disconnect`] every call fails
//! with [`DbError::NotConnected`].
//!
//! Statements carrying row values are never cached: the server fixes
//! parameter types on first prepare, and the same SQL may later be bound
//! with values of another type.

use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use sqlx::postgres::PgConnection;
use sqlx::Connection;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::config::DbCredentials;
use crate::error::{classify, DbError, DbResult, Operation};
use crate::filter::{Filter, PreparedSelect, Select};
use crate::schema::{ColumnSpec, ColumnType};
use crate::sql;
use crate::value::{self, Row};

/// Lazily decoded rows of a select; borrows the connection until dropped
pub type RowStream<'a> = BoxStream<'a, DbResult<Row>>;

const TABLE_EXISTS_SQL: &str = "SELECT to_regclass($1::text) IS NOT NULL";

const PRIMARY_KEY_SQL: &str = r#"
    SELECT a.attname::text, format_type(a.atttypid, a.atttypmod)
    FROM pg_index i
    JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey)
    WHERE i.indrelid = to_regclass($1::text)::oid
      AND i.indisprimary
"#;

/// Key types whose generated value fits the `i64` returned by `insert`
const INTEGER_KEY_TYPES: &[&str] = &["smallint", "integer", "bigint"];

pub struct Database {
    target: String,
    conn: Option<PgConnection>,
    /// table → primary key column, filled on first insert
    primary_keys: HashMap<String, String>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("target", &self.target)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Database {
    /// Open the connection, bounded by the configured connect timeout
    pub async fn connect(credentials: &DbCredentials) -> DbResult<Self> {
        credentials.validate()?;
        let target = credentials.target();

        let conn = tokio::time::timeout(
            credentials.connect_timeout(),
            PgConnection::connect_with(&credentials.connect_options()),
        )
        .await
        .map_err(|_| {
            DbError::Connection(format!(
                "timed out after {}s connecting to {}",
                credentials.connect_timeout_secs, target
            ))
        })?
        .map_err(|e| classify(e, Operation::Connect))?;

        info!(db = %target, user = %credentials.user, "Database connection opened");

        Ok(Self {
            target,
            conn: Some(conn),
            primary_keys: HashMap::new(),
        })
    }

    /// Close the connection. Calling this again is a no-op.
    pub async fn disconnect(&mut self) {
        self.primary_keys.clear();

        let Some(conn) = self.conn.take() else {
            return;
        };

        match conn.close().await {
            Ok(()) => info!(db = %self.target, "Database connection closed"),
            Err(e) => warn!(db = %self.target, error = %e, "Database connection closed uncleanly"),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// `host:port/database` of this handle
    pub fn target(&self) -> &str {
        &self.target
    }

    fn conn_mut(&mut self) -> DbResult<&mut PgConnection> {
        self.conn.as_mut().ok_or(DbError::NotConnected)
    }

    // ========================================================================
    // Table lifecycle
    // ========================================================================

    async fn execute_ddl(&mut self, table: &str, statement: String) -> DbResult<()> {
        let conn = self.conn_mut()?;
        sqlx::query(&statement)
            .execute(&mut *conn)
            .await
            .map_err(|e| classify(e, Operation::Ddl))?;

        // Cached plans may reference the old row shape
        conn.clear_cached_statements()
            .await
            .map_err(|e| classify(e, Operation::Ddl))?;

        self.primary_keys.remove(table);
        debug!(table, sql = %statement, "Schema updated");
        Ok(())
    }

    /// Create a table; fails with [`DbError::Schema`] if it already exists
    pub async fn create_table(&mut self, table: &str, columns: &[ColumnSpec]) -> DbResult<()> {
        let statement = sql::create_table(table, columns, false)?;
        self.execute_ddl(table, statement).await
    }

    pub async fn create_table_if_not_exists(
        &mut self,
        table: &str,
        columns: &[ColumnSpec],
    ) -> DbResult<()> {
        let statement = sql::create_table(table, columns, true)?;
        self.execute_ddl(table, statement).await
    }

    /// Drop a table; fails with [`DbError::Schema`] if it does not exist
    pub async fn drop_table(&mut self, table: &str) -> DbResult<()> {
        let statement = sql::drop_table(table, false)?;
        self.execute_ddl(table, statement).await
    }

    pub async fn drop_table_if_exists(&mut self, table: &str) -> DbResult<()> {
        let statement = sql::drop_table(table, true)?;
        self.execute_ddl(table, statement).await
    }

    pub async fn add_column(&mut self, table: &str, column: &ColumnSpec) -> DbResult<()> {
        let statement = sql::add_column(table, column)?;
        self.execute_ddl(table, statement).await
    }

    pub async fn drop_column(&mut self, table: &str, column: &str) -> DbResult<()> {
        let statement = sql::drop_column(table, column)?;
        self.execute_ddl(table, statement).await
    }

    /// Change a column's type, converting existing values with a cast
    pub async fn alter_column(
        &mut self,
        table: &str,
        column: &str,
        new_type: ColumnType,
    ) -> DbResult<()> {
        let statement = sql::alter_column(table, column, new_type)?;
        self.execute_ddl(table, statement).await
    }

    pub async fn table_exists(&mut self, table: &str) -> DbResult<bool> {
        let quoted = sql::quote_ident(table)?;
        let conn = self.conn_mut()?;

        sqlx::query_scalar::<_, bool>(TABLE_EXISTS_SQL)
            .bind(quoted)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| classify(e, Operation::Read))
    }

    async fn primary_key(&mut self, table: &str) -> DbResult<String> {
        if let Some(column) = self.primary_keys.get(table) {
            return Ok(column.clone());
        }

        if !self.table_exists(table).await? {
            return Err(DbError::Schema(format!("table '{}' does not exist", table)));
        }

        let quoted = sql::quote_ident(table)?;
        let conn = self.conn_mut()?;
        let keys: Vec<(String, String)> = sqlx::query_as(PRIMARY_KEY_SQL)
            .bind(quoted)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| classify(e, Operation::Read))?;

        let (column, data_type) = match keys.as_slice() {
            [single] => single.clone(),
            [] => {
                return Err(DbError::Schema(format!("table '{}' has no primary key", table)));
            },
            _ => {
                return Err(DbError::Schema(format!(
                    "table '{}' has a composite primary key",
                    table
                )));
            },
        };

        if !INTEGER_KEY_TYPES.contains(&data_type.as_str()) {
            return Err(DbError::Schema(format!(
                "primary key '{}' of table '{}' is {}, expected an integer type",
                column, table, data_type
            )));
        }

        self.primary_keys.insert(table.to_string(), column.clone());
        Ok(column)
    }

    // ========================================================================
    // Rows
    // ========================================================================

    /// Insert one row and return its generated primary key
    pub async fn insert(&mut self, table: &str, fields: &Row) -> DbResult<i64> {
        let key = self.primary_key(table).await?;
        let statement = sql::insert(table, fields, &key)?;
        let args = value::arguments(&statement.params)?;
        let conn = self.conn_mut()?;

        let id = sqlx::query_scalar_with::<_, i64, _>(&statement.sql, args)
            .persistent(false)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| classify(e, Operation::Write))?;

        debug!(table, id, "Row inserted");
        Ok(id)
    }

    /// Insert every row inside one transaction.
    ///
    /// Either all rows are committed and their keys returned in input order,
    /// or none are.
    pub async fn bulk_insert(&mut self, table: &str, rows: &[Row]) -> DbResult<Vec<i64>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let key = self.primary_key(table).await?;
        let statements = rows
            .iter()
            .map(|row| sql::insert(table, row, &key))
            .collect::<DbResult<Vec<_>>>()?;

        let conn = self.conn_mut()?;
        let mut tx = conn.begin().await.map_err(|e| classify(e, Operation::Write))?;
        let mut ids = Vec::with_capacity(statements.len());

        for statement in &statements {
            let args = value::arguments(&statement.params)?;
            let id = sqlx::query_scalar_with::<_, i64, _>(&statement.sql, args)
                .persistent(false)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| classify(e, Operation::Write))?;
            ids.push(id);
        }

        tx.commit().await.map_err(|e| classify(e, Operation::Write))?;

        debug!(table, rows = ids.len(), "Bulk insert committed");
        Ok(ids)
    }

    /// Stream the rows matching a prepared select.
    ///
    /// Rows are fetched and decoded as the stream is polled.
    pub fn select<'a>(&'a mut self, query: &'a PreparedSelect) -> DbResult<RowStream<'a>> {
        let args = value::arguments(query.params())?;
        let conn = self.conn_mut()?;

        let rows = sqlx::query_with(query.sql(), args)
            .persistent(false)
            .fetch(conn)
            .map(|result| {
                result
                    .map_err(|e| classify(e, Operation::Read))
                    .and_then(|row| value::decode_row(&row))
            });

        Ok(rows.boxed())
    }

    /// Prepare a select and collect every matching row
    pub async fn select_all(&mut self, query: &Select) -> DbResult<Vec<Row>> {
        let prepared = query.prepare()?;
        let rows: Vec<Row> = self.select(&prepared)?.try_collect().await?;
        Ok(rows)
    }

    /// Set `fields` on every row matching `filter`; returns the affected count
    pub async fn update(&mut self, table: &str, filter: &Filter, fields: &Row) -> DbResult<u64> {
        let statement = sql::update(table, filter, fields)?;
        let affected = self.execute_write(&statement).await?;
        debug!(table, affected, "Rows updated");
        Ok(affected)
    }

    /// Delete every row matching `filter`; returns the affected count
    pub async fn delete(&mut self, table: &str, filter: &Filter) -> DbResult<u64> {
        let statement = sql::delete(table, filter)?;
        let affected = self.execute_write(&statement).await?;
        debug!(table, affected, "Rows deleted");
        Ok(affected)
    }

    pub async fn count(&mut self, table: &str, filter: &Filter) -> DbResult<i64> {
        let statement = sql::count(table, filter)?;
        let args = value::arguments(&statement.params)?;
        let conn = self.conn_mut()?;

        sqlx::query_scalar_with::<_, i64, _>(&statement.sql, args)
            .persistent(false)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| classify(e, Operation::Read))
    }

    async fn execute_write(&mut self, statement: &sql::Statement) -> DbResult<u64> {
        let args = value::arguments(&statement.params)?;
        let conn = self.conn_mut()?;

        let result = sqlx::query_with(&statement.sql, args)
            .persistent(false)
            .execute(&mut *conn)
            .await
            .map_err(|e| classify(e, Operation::Write))?;

        Ok(result.rows_affected())
    }
}
