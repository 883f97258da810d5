//! Pipeline orchestration
//!
//! One run walks the pages of the marketplace API in order. Each page is
//! persisted raw, then each of its records is transformed and loaded before
//! the next page is requested, so memory is bounded by one page.
//!
//! ```text
//! Idle → Extracting → StoringRaw → Transforming → Loading ─┐
//!            ↑                                              │
//!            └──────────────── next page ───────────────────┘
//!                      └→ Done          (any stage) → Failed
//! ```

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::aggregate::Aggregation;
use crate::config::EtlConfig;
use crate::error::{EtlError, Result};
use crate::extractor::OpenSeaClient;
use crate::loader::CollectionSink;
use crate::raw_store::{CollectionExport, ExportFiles, RawStore};
use crate::transform::transform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Extracting,
    StoringRaw,
    Transforming,
    Loading,
    Done,
    Failed,
}

impl PipelineState {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Extracting => "extracting",
            PipelineState::StoringRaw => "storing_raw",
            PipelineState::Transforming => "transforming",
            PipelineState::Loading => "loading",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters of one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub chain: String,
    pub pages: u32,
    pub extracted: u64,
    pub transformed: u64,
    pub loaded: u64,
    /// Records rejected by the transformer
    pub skipped: u64,
    /// Records the store refused
    pub write_failures: u64,
    pub raw_files: u32,
    pub raw_failures: u32,
    /// Consolidated JSON and CSV of every extracted collection
    pub export: Option<ExportFiles>,
    pub report: Option<PathBuf>,
    pub state: PipelineState,
}

impl RunSummary {
    fn new(run_id: Uuid, chain: &str) -> Self {
        Self {
            run_id,
            chain: chain.to_string(),
            pages: 0,
            extracted: 0,
            transformed: 0,
            loaded: 0,
            skipped: 0,
            write_failures: 0,
            raw_files: 0,
            raw_failures: 0,
            export: None,
            report: None,
            state: PipelineState::Idle,
        }
    }
}

pub struct Pipeline<S: CollectionSink> {
    client: OpenSeaClient,
    sink: S,
    raw_data_dir: PathBuf,
    report_dir: Option<PathBuf>,
    state: PipelineState,
    summary: Option<RunSummary>,
}

impl<S: CollectionSink> Pipeline<S> {
    pub fn new(config: &EtlConfig, client: OpenSeaClient, sink: S) -> Self {
        Self {
            client,
            sink,
            raw_data_dir: config.raw_data_dir.clone(),
            report_dir: config.report_dir.clone(),
            state: PipelineState::Idle,
            summary: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Summary of the most recent run, including failed ones
    pub fn summary(&self) -> Option<&RunSummary> {
        self.summary.as_ref()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Extract up to `limit` collections of `chain`, persist, transform and
    /// load them.
    ///
    /// The sink is closed before this returns, whatever the outcome. Fatal
    /// errors leave the pipeline in [`PipelineState::Failed`] and are returned.
    pub async fn run(&mut self, chain: &str, limit: usize) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let mut summary = RunSummary::new(run_id, chain);
        self.state = PipelineState::Idle;

        let span = info_span!("pipeline", run_id = %run_id, chain = %chain, limit);
        let outcome = self.execute(chain, limit, &mut summary).instrument(span.clone()).await;

        self.sink.close().await;

        span.in_scope(|| match &outcome {
            Ok(()) => {
                transition(&mut self.state, PipelineState::Done);
                info!(
                    pages = summary.pages,
                    extracted = summary.extracted,
                    transformed = summary.transformed,
                    loaded = summary.loaded,
                    skipped = summary.skipped,
                    write_failures = summary.write_failures,
                    "Pipeline finished"
                );
            },
            Err(e) => {
                transition(&mut self.state, PipelineState::Failed);
                error!(error = %e, loaded = summary.loaded, "Pipeline failed");
            },
        });

        summary.state = self.state;
        self.summary = Some(summary.clone());
        outcome.map(|()| summary)
    }

    async fn execute(&mut self, chain: &str, limit: usize, summary: &mut RunSummary) -> Result<()> {
        if limit == 0 {
            return Err(EtlError::config("limit must be at least 1"));
        }
        if chain.trim().is_empty() {
            return Err(EtlError::config("chain cannot be empty"));
        }

        info!("Starting pipeline");
        self.sink.prepare().await?;

        let store = RawStore::new(&self.raw_data_dir, self.report_dir.clone(), summary.run_id);
        let mut aggregation = Aggregation::new();
        let mut pager = self.client.pager(chain, limit);
        let mut export = ExportSlot::Pending;

        loop {
            transition(&mut self.state, PipelineState::Extracting);
            let Some(page) = pager.next_page().await? else {
                break;
            };
            summary.pages += 1;
            summary.extracted += page.collections.len() as u64;

            transition(&mut self.state, PipelineState::StoringRaw);
            match store.persist_page(chain, page.index, &page.body).await {
                Ok(_) => summary.raw_files += 1,
                Err(e) => {
                    summary.raw_failures += 1;
                    warn!(page = page.index, error = %e, "Failed to persist raw page");
                },
            }
            if let Err(e) = export.append(&store, chain, &page.collections).await {
                summary.raw_failures += 1;
                warn!(page = page.index, error = %e, "Export abandoned");
            }

            for raw in &page.collections {
                aggregation.observe(raw);

                transition(&mut self.state, PipelineState::Transforming);
                let record = match transform(raw) {
                    Ok(record) => record,
                    Err(e) => {
                        summary.skipped += 1;
                        warn!(page = page.index, error = %e, "Skipping record");
                        continue;
                    },
                };
                summary.transformed += 1;

                transition(&mut self.state, PipelineState::Loading);
                match self.sink.load(&record).await {
                    Ok(id) => {
                        summary.loaded += 1;
                        debug!(id, collection = %record.collection, "Collection loaded");
                    },
                    Err(e) if e.is_write() => {
                        summary.write_failures += 1;
                        warn!(collection = %record.collection, error = %e, "Row rejected");
                    },
                    Err(e) => return Err(e.into()),
                }
            }
        }

        match export.finish().await {
            Ok(files) => summary.export = files,
            Err(e) => warn!(error = %e, "Failed to finish export"),
        }

        match store.persist_report("aggregation", &aggregation.report(summary.run_id, chain)).await {
            Ok(path) => summary.report = path,
            Err(e) => warn!(error = %e, "Failed to write aggregation report"),
        }

        Ok(())
    }
}

/// The run's export, opened with the first non-empty page
enum ExportSlot {
    Pending,
    Open(CollectionExport),
    Abandoned,
}

impl ExportSlot {
    async fn append(&mut self, store: &RawStore, chain: &str, collections: &[serde_json::Value]) -> Result<()> {
        if collections.is_empty() || matches!(self, ExportSlot::Abandoned) {
            return Ok(());
        }
        if matches!(self, ExportSlot::Pending) {
            match store.start_export(chain).await {
                Ok(export) => *self = ExportSlot::Open(export),
                Err(e) => {
                    *self = ExportSlot::Abandoned;
                    return Err(e);
                },
            }
        }

        let result = match self {
            ExportSlot::Open(export) => export.append(collections).await,
            ExportSlot::Pending | ExportSlot::Abandoned => return Ok(()),
        };
        if result.is_err() {
            // Drops the export along with its temporary files
            *self = ExportSlot::Abandoned;
        }
        result
    }

    async fn finish(self) -> Result<Option<ExportFiles>> {
        match self {
            ExportSlot::Open(export) => export.finish().await.map(Some),
            ExportSlot::Pending | ExportSlot::Abandoned => Ok(None),
        }
    }
}

fn transition(state: &mut PipelineState, next: PipelineState) {
    if *state != next {
        debug!(from = %state, to = %next, "Pipeline state changed");
        *state = next;
    }
}
