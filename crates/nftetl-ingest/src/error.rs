//! Pipeline error taxonomy

use nftetl_db::DbError;
use thiserror::Error;

/// Errors raised by extraction, transformation, persistence and loading
#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Db(#[from] DbError),

    /// Non-success response from the marketplace API
    #[error("Marketplace API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// HTTP 429 from the marketplace API
    #[error("Marketplace API rate limit exceeded: {body}")]
    RateLimited { body: String },

    /// Transport failure (DNS, TLS, timeout)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A success response whose body is not the expected shape
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// A single record could not be mapped to a collection row
    #[error("Cannot transform record: field '{field}' {reason}")]
    Transform { field: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, EtlError>;

impl EtlError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn transform(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transform {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    /// Whether the error must abort the whole run.
    ///
    /// Record-scoped failures (a transform error, a rejected row) and raw-file
    /// or export I/O are skipped; everything else stops the pipeline.
    pub fn is_fatal(&self) -> bool {
        match self {
            EtlError::Transform { .. } | EtlError::Io(_) | EtlError::Csv(_) => false,
            EtlError::Db(e) => !e.is_write(),
            _ => true,
        }
    }
}

impl From<nftetl_common::EnvError> for EtlError {
    fn from(err: nftetl_common::EnvError) -> Self {
        EtlError::Config(err.to_string())
    }
}
