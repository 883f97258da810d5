//! NFT ETL Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared plumbing for the NFT ETL workspace members:
//!
//! - **Logging**: `tracing` subscriber setup driven by environment variables
//! - **Environment**: typed lookups for configuration values
//!
//! # Example
//!
//! ```no_run
//! use nftetl_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     tracing::info!("started");
//!     Ok(())
//! }
//! ```

pub mod env;
pub mod logging;

pub use env::EnvError;
