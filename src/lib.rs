// src/lib.rs
// Public library surface for the stage binary and integration tests.

pub mod artifact;
pub mod config;
pub mod error;
pub mod model;
pub mod store;
pub mod telemetry;

// Stage logic
pub mod aggregate;
pub mod digest;
pub mod enrich;
pub mod runner;
pub mod stages;

// Outbound delivery
pub mod notify;

// ---- Re-exports for stable public API ----
pub use crate::config::PipelineConfig;
pub use crate::error::{PipelineError, Result};
pub use crate::model::{ArticleSet, CanonicalDocument, RawRecord, SentimentLabel};
