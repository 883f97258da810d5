//! NFT ETL Ingest Library
//!
//! Extracts NFT collections from the OpenSea marketplace API, keeps every raw
//! response on disk, normalises each record and loads it into PostgreSQL.
//!
//! # Stages
//!
//! - **Extractor** ([`extractor`]): cursor-paginated, throttled API reads
//! - **Raw store** ([`raw_store`]): verbatim response bodies and run reports
//! - **Transformer** ([`transform`](mod@transform)): raw object → [`NewCollection`]
//! - **Loader** ([`loader`]): [`CollectionSink`] implementations
//! - **Orchestrator** ([`pipeline`]): the sequential state machine tying
//!   them together
//!
//! # Example
//!
//! ```no_run
//! use nftetl_db::DbCredentials;
//! use nftetl_ingest::{EtlConfig, OpenSeaClient, PgCollectionSink, Pipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = EtlConfig::from_env()?;
//!     let client = OpenSeaClient::new(&config)?;
//!     let sink = PgCollectionSink::connect(&DbCredentials::from_env()?, &config.collections_table).await?;
//!
//!     let mut pipeline = Pipeline::new(&config, client, sink);
//!     let summary = pipeline.run("ethereum", 50).await?;
//!     println!("loaded {} collections", summary.loaded);
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod aggregate;
pub mod config;
pub mod error;
pub mod extractor;
pub mod loader;
pub mod models;
pub mod pipeline;
pub mod raw_store;
pub mod transform;

pub use aggregate::{Aggregation, AggregationReport};
pub use config::{EtlConfig, RateLimit};
pub use error::{EtlError, Result};
pub use extractor::{CollectionPage, CollectionPager, OpenSeaClient, Throttle};
pub use loader::{collections_table_columns, CollectionSink, PgCollectionSink};
pub use models::NewCollection;
pub use pipeline::{Pipeline, PipelineState, RunSummary};
pub use raw_store::{CollectionExport, ExportFiles, RawStore};
pub use transform::transform;
