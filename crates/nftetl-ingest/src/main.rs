//! nftetl - OpenSea collections ETL

use anyhow::{Context, Result};
use clap::Parser;
use nftetl_common::logging::{init_logging, LogConfig, LogLevel};
use nftetl_db::DbCredentials;
use nftetl_ingest::{EtlConfig, OpenSeaClient, PgCollectionSink, Pipeline, RunSummary};
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "nftetl")]
#[command(author, version, about = "Load OpenSea NFT collections into PostgreSQL")]
struct Cli {
    /// Blockchain whose collections are extracted
    #[arg(long, default_value = "ethereum")]
    chain: String,

    /// Maximum number of collections to extract
    #[arg(long, default_value_t = 50, value_parser = clap::value_parser!(u64).range(1..))]
    limit: u64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine; the environment may already be set
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over the flag
    let log_config = match LogConfig::default().with_level(log_level).merge_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        },
    };
    let _guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        },
    };

    match run(&cli).await {
        Ok(summary) => {
            info!(run_id = %summary.run_id, "ETL pipeline completed");
            match serde_json::to_string_pretty(&summary) {
                Ok(rendered) => println!("{}", rendered),
                Err(e) => error!(error = %e, "Failed to render summary"),
            }
            ExitCode::SUCCESS
        },
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: &Cli) -> Result<RunSummary> {
    let config = EtlConfig::from_env().context("Invalid ETL configuration")?;
    let credentials = DbCredentials::from_env().context("Invalid database configuration")?;
    let limit = usize::try_from(cli.limit).context("--limit is too large")?;

    let client = OpenSeaClient::new(&config)?;

    info!(target_db = %credentials.target(), table = %config.collections_table, "Connecting to database");
    let sink = PgCollectionSink::connect(&credentials, config.collections_table.clone())
        .await
        .context("Failed to connect to database")?;

    let mut pipeline = Pipeline::new(&config, client, sink);
    let summary = pipeline.run(&cli.chain, limit).await?;

    Ok(summary)
}
