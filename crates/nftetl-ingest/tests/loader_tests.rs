//! PostgreSQL sink tests
//!
//! These tests require Docker to be running:
//!
//! ```bash
//! cargo test -p nftetl-ingest --test loader_tests -- --ignored --nocapture
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::{Context, Result};
use nftetl_db::{Database, DbCredentials, DbError, Filter, OrderBy, Select};
use nftetl_ingest::{CollectionSink, NewCollection, PgCollectionSink};
use serde_json::json;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync};
use testcontainers_modules::postgres::Postgres;

const TABLE: &str = "nft_collections";

async fn start_postgres() -> Result<(ContainerAsync<Postgres>, DbCredentials)> {
    let container = Postgres::default()
        .start()
        .await
        .context("Failed to start PostgreSQL container")?;
    let host = container.get_host().await.context("Failed to get container host")?;
    let port = container
        .get_host_port_ipv4(5432.tcp())
        .await
        .context("Failed to get container port")?;

    let credentials = DbCredentials::new("postgres")
        .with_host(host.to_string())
        .with_port(port)
        .with_user("postgres", "postgres");

    Ok((container, credentials))
}

fn record(slug: &str, twitter: Option<&str>) -> NewCollection {
    NewCollection {
        collection: slug.to_string(),
        name: format!("{} name", slug),
        description: Some("On-chain art".to_string()),
        image_url: None,
        owner: Some("0xowner".to_string()),
        twitter_username: twitter.map(str::to_string),
        contracts: json!([{"address": "0x1", "chain": "ethereum"}]),
    }
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_sink_creates_table_and_loads_in_order() {
    let (_container, credentials) = start_postgres().await.unwrap();
    let mut sink = PgCollectionSink::connect(&credentials, TABLE).await.unwrap();

    // Preparing an existing table is fine
    sink.prepare().await.unwrap();
    sink.prepare().await.unwrap();
    assert!(sink.database().table_exists(TABLE).await.unwrap());

    let mut ids = Vec::new();
    for (slug, twitter) in [("apes", Some("apes")), ("birds", None), ("cats", Some("cats"))] {
        ids.push(sink.load(&record(slug, twitter)).await.unwrap());
    }
    assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));

    let query = Select::from(TABLE).order_by(OrderBy::asc("id"));
    let rows = sink.database().select_all(&query).await.unwrap();
    assert_eq!(rows.len(), 3);

    let slugs: Vec<&str> = rows.iter().map(|row| row["collection"].as_str().unwrap()).collect();
    assert_eq!(slugs, vec!["apes", "birds", "cats"]);
    assert!(rows[1]["twitter_username"].is_null());
    assert_eq!(
        rows[0]["contracts"].as_json(),
        Some(&json!([{"address": "0x1", "chain": "ethereum"}]))
    );

    let created: Vec<_> = rows.iter().map(|row| row["created_at"].as_timestamp().unwrap()).collect();
    assert!(created.windows(2).all(|pair| pair[0] <= pair[1]));

    sink.close().await;
    sink.close().await;
    assert!(!sink.database().is_connected());
    let err = sink.load(&record("dogs", None)).await.unwrap_err();
    assert!(matches!(err, DbError::NotConnected));

    // Rows survive the sink
    let mut db = Database::connect(&credentials).await.unwrap();
    assert_eq!(db.count(TABLE, &Filter::new()).await.unwrap(), 3);
    db.disconnect().await;
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_oversized_value_is_rejected_per_row() {
    let (_container, credentials) = start_postgres().await.unwrap();
    let mut sink = PgCollectionSink::connect(&credentials, TABLE).await.unwrap();
    sink.prepare().await.unwrap();

    let mut long = record("long", None);
    long.owner = Some("x".repeat(300));
    let err = sink.load(&long).await.unwrap_err();
    assert!(err.is_write(), "unexpected error: {err:?}");

    sink.load(&record("short", None)).await.unwrap();
    sink.close().await;
}
