//! Raw payload persistence
//!
//! Every API response is written verbatim before anything is parsed out of
//! it, so a run can be replayed or audited from disk. A run also leaves one
//! consolidated export of every extracted collection, as a JSON array and as
//! CSV.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;

pub struct RawStore {
    raw_dir: PathBuf,
    report_dir: Option<PathBuf>,
    /// First 8 hex digits of the run id; keeps names unique across runs
    run_tag: String,
}

impl RawStore {
    pub fn new(raw_dir: impl Into<PathBuf>, report_dir: Option<PathBuf>, run_id: Uuid) -> Self {
        let mut run_tag = run_id.simple().to_string();
        run_tag.truncate(8);

        Self {
            raw_dir: raw_dir.into(),
            report_dir,
            run_tag,
        }
    }

    pub fn raw_dir(&self) -> &Path {
        &self.raw_dir
    }

    pub fn report_dir(&self) -> Option<&Path> {
        self.report_dir.as_deref()
    }

    /// Write one response body to
    /// `raw_{chain}_{YYYYMMDD_HHMMSS_ffffff}_{run}_p{page}.json`
    pub async fn persist_page(&self, chain: &str, page: u32, body: &str) -> Result<PathBuf> {
        let file_name = format!(
            "raw_{}_{}_{}_p{:04}.json",
            file_safe(chain),
            timestamp(),
            self.run_tag,
            page
        );
        let path = write_atomically(&self.raw_dir, &file_name, body.as_bytes()).await?;

        debug!(path = %path.display(), bytes = body.len(), "Raw page persisted");
        Ok(path)
    }

    /// Write `value` as pretty JSON to `{name}_{timestamp}_{run}.json` in the
    /// report directory; `None` when reports are disabled
    pub async fn persist_report<T: Serialize>(&self, name: &str, value: &T) -> Result<Option<PathBuf>> {
        let Some(report_dir) = &self.report_dir else {
            return Ok(None);
        };

        let file_name = format!("{}_{}_{}.json", file_safe(name), timestamp(), self.run_tag);
        let contents = serde_json::to_vec_pretty(value)?;
        let path = write_atomically(report_dir, &file_name, &contents).await?;

        debug!(path = %path.display(), "Report persisted");
        Ok(Some(path))
    }

    /// Open `opensea_collections_{chain}_{timestamp}_{run}.{json,csv}` in the
    /// raw directory. Nothing is visible under the final names until
    /// [`CollectionExport::finish`].
    pub async fn start_export(&self, chain: &str) -> Result<CollectionExport> {
        tokio::fs::create_dir_all(&self.raw_dir).await?;

        let stem = format!("opensea_collections_{}_{}_{}", file_safe(chain), timestamp(), self.run_tag);
        let json = ExportFile::create(&self.raw_dir, format!("{}.json", stem)).await?;
        let csv = ExportFile::create(&self.raw_dir, format!("{}.csv", stem)).await?;

        let mut export = CollectionExport {
            json,
            csv,
            rows: 0,
        };
        export.json.file.write_all(b"[").await?;
        let header = csv_bytes(|writer| writer.write_record(EXPORT_COLUMNS))?;
        export.csv.file.write_all(&header).await?;

        Ok(export)
    }
}

/// Columns of the CSV export; nested values are written as compact JSON
pub const EXPORT_COLUMNS: &[&str] = &[
    "collection",
    "name",
    "description",
    "image_url",
    "banner_image_url",
    "owner",
    "category",
    "is_disabled",
    "is_nsfw",
    "opensea_url",
    "project_url",
    "discord_url",
    "twitter_username",
    "instagram_username",
    "contracts",
];

/// Paths of a completed export
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportFiles {
    pub json: PathBuf,
    pub csv: PathBuf,
    pub rows: u64,
}

struct ExportFile {
    path: PathBuf,
    tmp_path: PathBuf,
    file: File,
    committed: bool,
}

impl ExportFile {
    async fn create(dir: &Path, file_name: String) -> Result<Self> {
        let tmp_path = dir.join(format!(".{}.tmp", file_name));
        let file = File::create(&tmp_path).await?;
        Ok(Self {
            path: dir.join(file_name),
            tmp_path,
            file,
            committed: false,
        })
    }

    async fn commit(&mut self) -> Result<()> {
        self.file.flush().await?;
        tokio::fs::rename(&self.tmp_path, &self.path).await?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for ExportFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.tmp_path);
        }
    }
}

/// Run-wide export of raw collection objects, appended page by page.
///
/// Dropping an unfinished export removes its temporary files.
pub struct CollectionExport {
    json: ExportFile,
    csv: ExportFile,
    rows: u64,
}

impl CollectionExport {
    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub async fn append(&mut self, collections: &[Value]) -> Result<()> {
        let mut json = Vec::new();
        for (i, collection) in collections.iter().enumerate() {
            let separator: &[u8] = if self.rows == 0 && i == 0 { b"\n" } else { b",\n" };
            json.extend_from_slice(separator);
            json.extend(serde_json::to_vec_pretty(collection)?);
        }

        let csv = csv_bytes(|writer| {
            for collection in collections {
                writer.write_record(EXPORT_COLUMNS.iter().map(|column| csv_cell(collection.get(column))))?;
            }
            Ok(())
        })?;

        self.json.file.write_all(&json).await?;
        self.csv.file.write_all(&csv).await?;
        self.rows += collections.len() as u64;
        Ok(())
    }

    /// Close both files and move them into place
    pub async fn finish(mut self) -> Result<ExportFiles> {
        self.json.file.write_all(b"\n]\n").await?;
        self.json.commit().await?;
        self.csv.commit().await?;

        debug!(json = %self.json.path.display(), csv = %self.csv.path.display(), rows = self.rows, "Export written");
        Ok(ExportFiles {
            json: self.json.path.clone(),
            csv: self.csv.path.clone(),
            rows: self.rows,
        })
    }
}

/// Render records through a `csv::Writer` into memory
fn csv_bytes<F>(write: F) -> Result<Vec<u8>>
where
    F: FnOnce(&mut csv::Writer<Vec<u8>>) -> csv::Result<()>,
{
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    write(&mut writer)?;
    writer.into_inner().map_err(|e| e.into_error().into())
}

fn csv_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn timestamp() -> String {
    Utc::now().format("%Y%m%d_%H%M%S_%6f").to_string()
}

/// Keep `[A-Za-z0-9_-]`, replace anything else with `_`
fn file_safe(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Write to a hidden temporary file, then rename it into place
async fn write_atomically(dir: &Path, file_name: &str, contents: &[u8]) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;

    let path = dir.join(file_name);
    let tmp_path = dir.join(format!(".{}.tmp", file_name));

    if let Err(e) = tokio::fs::write(&tmp_path, contents).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e.into());
    }
    tokio::fs::rename(&tmp_path, &path).await?;

    Ok(path)
}
