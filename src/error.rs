// src/error.rs
//! Typed failures of the pipeline core. Stage entrypoints wrap these in
//! `anyhow` with context; tests match on the variants directly.

use std::path::PathBuf;

use chrono::NaiveDate;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("no raw record for ticker(s) {missing:?} on {date}")]
    MissingTickerData {
        date: NaiveDate,
        missing: Vec<String>,
    },

    #[error("duplicate raw record for ticker {ticker} (merge policy: reject)")]
    DuplicateTicker { ticker: String },

    #[error("record for {ticker} is misaligned: {field} has {actual} entries, expected {expected}")]
    MisalignedRecord {
        ticker: String,
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("stage changed the document shape: {0}")]
    Monotonicity(String),

    #[error("model {model} failed for {ticker}[{index}]: {reason}")]
    ModelCallFailure {
        model: String,
        ticker: String,
        index: usize,
        reason: String,
    },

    #[error("ticker {0} is not present in the document")]
    UnknownTicker(String),

    #[error("artifact I/O failed at {path}: {source}")]
    ArtifactIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed artifact {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("digest delivery failed: {0}")]
    Delivery(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ArtifactIo {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
