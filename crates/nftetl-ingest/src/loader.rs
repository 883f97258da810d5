//! Loading transformed collections

use async_trait::async_trait;
use nftetl_db::{ColumnSpec, ColumnType, Database, DbCredentials, DbResult, DefaultValue};
use tracing::info;

use crate::models::NewCollection;

/// Destination for transformed collections
///
/// The pipeline calls `prepare` once before extraction, `load` once per record
/// and `close` exactly once at the end of every run, successful or not.
#[async_trait]
pub trait CollectionSink: Send {
    /// Make sure the destination can accept rows
    async fn prepare(&mut self) -> DbResult<()>;

    /// Store one record and return its generated id
    async fn load(&mut self, record: &NewCollection) -> DbResult<i64>;

    /// Release the destination; must be idempotent
    async fn close(&mut self);
}

/// Column layout of the collections table
pub fn collections_table_columns() -> Vec<ColumnSpec> {
    vec![
        ColumnSpec::new("id", ColumnType::BigSerial).primary_key(),
        ColumnSpec::new("collection", ColumnType::Varchar(255)).not_null(),
        ColumnSpec::new("name", ColumnType::Varchar(255)).not_null(),
        ColumnSpec::new("description", ColumnType::Text),
        ColumnSpec::new("image_url", ColumnType::Text),
        ColumnSpec::new("owner", ColumnType::Varchar(255)),
        ColumnSpec::new("twitter_username", ColumnType::Varchar(255)),
        ColumnSpec::new("contracts", ColumnType::Jsonb)
            .not_null()
            .default_value(DefaultValue::EmptyJsonArray),
        ColumnSpec::new("created_at", ColumnType::TimestampTz)
            .not_null()
            .default_value(DefaultValue::Now),
    ]
}

/// PostgreSQL sink backed by one [`Database`] connection
#[derive(Debug)]
pub struct PgCollectionSink {
    db: Database,
    table: String,
}

impl PgCollectionSink {
    pub fn new(db: Database, table: impl Into<String>) -> Self {
        Self {
            db,
            table: table.into(),
        }
    }

    pub async fn connect(credentials: &DbCredentials, table: impl Into<String>) -> DbResult<Self> {
        let db = Database::connect(credentials).await?;
        Ok(Self::new(db, table))
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn database(&mut self) -> &mut Database {
        &mut self.db
    }
}

#[async_trait]
impl CollectionSink for PgCollectionSink {
    async fn prepare(&mut self) -> DbResult<()> {
        self.db
            .create_table_if_not_exists(&self.table, &collections_table_columns())
            .await?;
        info!(table = %self.table, "Collections table ready");
        Ok(())
    }

    async fn load(&mut self, record: &NewCollection) -> DbResult<i64> {
        self.db.insert(&self.table, &record.to_row()).await
    }

    async fn close(&mut self) {
        self.db.disconnect().await;
    }
}
