//! Pipeline configuration

use nftetl_common::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{EtlError, Result};

/// Default marketplace API root.
pub const DEFAULT_OPENSEA_BASE_URL: &str = "https://api.opensea.io/api/v2";

/// Default (and maximum) records requested per page.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Largest page the marketplace serves.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Default HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default number of requests allowed per throttle window.
pub const DEFAULT_RATE_LIMIT_MAX_CALLS: u32 = 2;

/// Default throttle window in seconds.
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Default directory for raw API payloads.
pub const DEFAULT_RAW_DATA_DIR: &str = "raw_data";

/// Default directory for aggregation reports.
pub const DEFAULT_REPORT_DIR: &str = "raw_data/reports";

/// Default destination table.
pub const DEFAULT_COLLECTIONS_TABLE: &str = "opensea_collections";

/// Client-side request pacing; `max_calls == 0` disables it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max_calls: u32,
    pub window: Duration,
}

impl RateLimit {
    pub fn disabled() -> Self {
        Self {
            max_calls: 0,
            window: Duration::ZERO,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_calls > 0 && !self.window.is_zero()
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            max_calls: DEFAULT_RATE_LIMIT_MAX_CALLS,
            window: Duration::from_secs(DEFAULT_RATE_LIMIT_WINDOW_SECS),
        }
    }
}

#[derive(Clone)]
pub struct EtlConfig {
    pub api_key: String,
    pub base_url: String,
    pub page_size: u32,
    pub timeout_secs: u64,
    pub rate_limit: RateLimit,
    pub raw_data_dir: PathBuf,
    /// `None` disables the aggregation report
    pub report_dir: Option<PathBuf>,
    pub collections_table: String,
}

impl std::fmt::Debug for EtlConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EtlConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("page_size", &self.page_size)
            .field("timeout_secs", &self.timeout_secs)
            .field("rate_limit", &self.rate_limit)
            .field("raw_data_dir", &self.raw_data_dir)
            .field("report_dir", &self.report_dir)
            .field("collections_table", &self.collections_table)
            .finish()
    }
}

impl EtlConfig {
    /// Defaults for everything except the API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_OPENSEA_BASE_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            rate_limit: RateLimit::default(),
            raw_data_dir: PathBuf::from(DEFAULT_RAW_DATA_DIR),
            report_dir: Some(PathBuf::from(DEFAULT_REPORT_DIR)),
            collections_table: DEFAULT_COLLECTIONS_TABLE.to_string(),
        }
    }

    pub fn from_env() -> Result<Self> {
        let report_dir = match env::var("REPORT_DIR") {
            Some(dir) if dir.is_empty() => None,
            Some(dir) => Some(PathBuf::from(dir)),
            None => Some(PathBuf::from(DEFAULT_REPORT_DIR)),
        };

        let config = Self {
            api_key: env::required("OPENSEA_API_KEY")?,
            base_url: env::string_or("OPENSEA_BASE_URL", DEFAULT_OPENSEA_BASE_URL),
            page_size: env::parse_or("OPENSEA_PAGE_SIZE", DEFAULT_PAGE_SIZE)?,
            timeout_secs: env::parse_or("OPENSEA_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?,
            rate_limit: RateLimit {
                max_calls: env::parse_or(
                    "OPENSEA_RATE_LIMIT_MAX_CALLS",
                    DEFAULT_RATE_LIMIT_MAX_CALLS,
                )?,
                window: Duration::from_secs(env::parse_or(
                    "OPENSEA_RATE_LIMIT_WINDOW_SECS",
                    DEFAULT_RATE_LIMIT_WINDOW_SECS,
                )?),
            },
            raw_data_dir: PathBuf::from(env::string_or("RAW_DATA_DIR", DEFAULT_RAW_DATA_DIR)),
            report_dir,
            collections_table: env::string_or("COLLECTIONS_TABLE", DEFAULT_COLLECTIONS_TABLE),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.validate_api()?;
        if self.collections_table.is_empty() {
            return Err(EtlError::config("collections table name cannot be empty"));
        }
        Ok(())
    }

    /// Check only the settings the API client uses
    pub fn validate_api(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(EtlError::config("API key cannot be empty"));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(EtlError::config(format!(
                "base URL must be http(s), got '{}'",
                self.base_url
            )));
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(EtlError::config(format!(
                "page size must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, self.page_size
            )));
        }
        if self.timeout_secs == 0 {
            return Err(EtlError::config("request timeout must be greater than 0"));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// `{base_url}/collections`
    pub fn collections_url(&self) -> String {
        format!("{}/collections", self.base_url.trim_end_matches('/'))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimit) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_raw_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.raw_data_dir = dir.into();
        self
    }

    pub fn with_report_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.report_dir = dir;
        self
    }
}
