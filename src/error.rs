use std::time::Duration;

use arrow::datatypes::DataType;
use thiserror::Error;

/// Failures callers may want to inspect after they have been wrapped in
/// `anyhow::Error`. Use `err.downcast_ref::<IngestError>()` to recover them.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("GET {url} returned status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("upload of {key} timed out after {timeout:?}")]
    UploadTimeout { key: String, timeout: Duration },

    #[error("column `{column}` has unsupported type {data_type}")]
    UnsupportedColumnType { column: String, data_type: DataType },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("COPY into {table} wrote {written} rows, expected {expected}")]
    RowCountMismatch {
        table: String,
        written: u64,
        expected: u64,
    },
}

impl IngestError {
    /// HTTP status carried by a failed fetch, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            IngestError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}
