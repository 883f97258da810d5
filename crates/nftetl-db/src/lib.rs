//! NFT ETL Database Access Layer
//!
//! A small relational access layer over a single, explicitly owned PostgreSQL
//! connection:
//!
//! - **Table lifecycle**: create, drop, add/drop/alter column
//! - **CRUD**: insert (returning the generated key), transactional bulk insert,
//!   lazily streamed select with filter/sort/limit, update and delete
//!
//! Identifiers are validated and quoted; every value travels as a bound
//! parameter.
//!
//! # Example
//!
//! ```no_run
//! use futures::TryStreamExt;
//! use nftetl_db::{ColumnSpec, ColumnType, Database, DbCredentials, Filter, OrderBy, Row, Select};
//!
//! #[tokio::main]
//! async fn main() -> nftetl_db::DbResult<()> {
//!     let mut db = Database::connect(&DbCredentials::from_env()?).await?;
//!
//!     db.create_table_if_not_exists(
//!         "owners",
//!         &[
//!             ColumnSpec::new("id", ColumnType::BigSerial).primary_key(),
//!             ColumnSpec::new("owner", ColumnType::Text).not_null(),
//!         ],
//!     )
//!     .await?;
//!
//!     let mut row = Row::new();
//!     row.insert("owner".to_string(), "alice".into());
//!     let id = db.insert("owners", &row).await?;
//!
//!     let query = Select::from("owners")
//!         .filter(Filter::new().eq("id", id))
//!         .order_by(OrderBy::asc("id"))
//!         .limit(10)
//!         .prepare()?;
//!     let rows: Vec<Row> = db.select(&query)?.try_collect().await?;
//!     assert_eq!(rows.len(), 1);
//!
//!     db.disconnect().await;
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod database;
pub mod error;
pub mod filter;
pub mod schema;
pub mod sql;
pub mod value;

pub use config::DbCredentials;
pub use database::{Database, RowStream};
pub use error::{DbError, DbResult};
pub use filter::{Condition, Direction, Filter, Operand, Operator, OrderBy, PreparedSelect, Select};
pub use schema::{ColumnConstraint, ColumnSpec, ColumnType, DefaultValue};
pub use value::{Row, SqlValue};
