// src/runner.rs
//! Stage harness: one JSON document in, one JSON document out.
//!
//! The document is read from `<input>/merged_stock_news.json`, checked,
//! handed to the stage, checked again against the input, and only then
//! written to `<output>/merged_stock_news.json` (temp file + rename). Any
//! error before the rename leaves the output directory as it was.

use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::Context;
use metrics::gauge;
use sha2::{Digest, Sha256};

use crate::artifact::DOCUMENT_FILE;
use crate::error::{PipelineError, Result};
use crate::model::{check_monotonic, CanonicalDocument};
use crate::store::fs::write_atomic;
use crate::telemetry::ensure_metrics_described;

/// What a successful stage left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutput {
    pub path: PathBuf,
    pub sha256: String,
    pub tickers: usize,
    pub articles: usize,
}

pub fn document_path(dir: &Path) -> PathBuf {
    dir.join(DOCUMENT_FILE)
}

pub fn content_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

pub fn encode_document(doc: &CanonicalDocument) -> Result<Vec<u8>> {
    serde_json::to_vec(doc).map_err(|source| PipelineError::Malformed {
        path: PathBuf::from(DOCUMENT_FILE),
        source,
    })
}

pub fn decode_document(bytes: &[u8], origin: &Path) -> Result<CanonicalDocument> {
    serde_json::from_slice(bytes).map_err(|source| PipelineError::Malformed {
        path: origin.to_path_buf(),
        source,
    })
}

pub async fn read_document(dir: &Path) -> Result<CanonicalDocument> {
    let path = document_path(dir);
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| PipelineError::io(&path, e))?;
    let doc = decode_document(&bytes, &path)?;
    doc.check_alignment()?;
    Ok(doc)
}

/// Validate and atomically (re)write the stage document in `dir`.
pub async fn write_document(dir: &Path, doc: &CanonicalDocument) -> Result<StageOutput> {
    ensure_metrics_described();
    doc.check_alignment()?;

    let bytes = encode_document(doc)?;
    let path = document_path(dir);
    write_atomic(&path, &bytes).await?;

    gauge!("pipeline_stage_last_run_ts").set(chrono::Utc::now().timestamp().max(0) as f64);
    Ok(StageOutput {
        path,
        sha256: content_hash(&bytes),
        tickers: doc.len(),
        articles: doc.article_count(),
    })
}

/// Read → `stage` → check → write. The stage receives the document by value
/// and returns the document to persist.
pub async fn run<F, Fut>(
    name: &str,
    input_dir: &Path,
    output_dir: &Path,
    stage: F,
) -> anyhow::Result<StageOutput>
where
    F: FnOnce(CanonicalDocument) -> Fut,
    Fut: Future<Output = anyhow::Result<CanonicalDocument>>,
{
    let after = prepare(name, input_dir, stage).await?;
    commit(name, output_dir, &after).await
}

/// Read → `stage` → check, without writing. Pair with [`commit`] when
/// something must happen between a valid result and its output.
pub async fn prepare<F, Fut>(
    name: &str,
    input_dir: &Path,
    stage: F,
) -> anyhow::Result<CanonicalDocument>
where
    F: FnOnce(CanonicalDocument) -> Fut,
    Fut: Future<Output = anyhow::Result<CanonicalDocument>>,
{
    let doc = read_document(input_dir)
        .await
        .with_context(|| format!("{name}: reading input from {}", input_dir.display()))?;
    tracing::info!(
        stage = name,
        input = %input_dir.display(),
        tickers = doc.len(),
        articles = doc.article_count(),
        "stage input loaded"
    );

    let before = doc.clone();
    let after = stage(doc)
        .await
        .with_context(|| format!("{name}: stage failed, no output written"))?;

    after
        .check_alignment()
        .and_then(|_| check_monotonic(&before, &after))
        .with_context(|| format!("{name}: stage produced an invalid document"))?;
    Ok(after)
}

/// Atomically write a prepared document as the stage output.
pub async fn commit(
    name: &str,
    output_dir: &Path,
    doc: &CanonicalDocument,
) -> anyhow::Result<StageOutput> {
    let out = write_document(output_dir, doc)
        .await
        .with_context(|| format!("{name}: writing output to {}", output_dir.display()))?;
    tracing::info!(
        stage = name,
        output = %out.path.display(),
        sha256 = %out.sha256,
        "stage output written"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_hex_sha256() {
        assert_eq!(
            content_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[tokio::test]
    async fn missing_input_is_artifact_io() {
        let tmp = tempfile::tempdir().unwrap();
        let err = read_document(tmp.path()).await.unwrap_err();
        assert!(matches!(err, PipelineError::ArtifactIo { .. }));
    }

    #[tokio::test]
    async fn garbage_input_is_malformed() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(document_path(tmp.path()), b"{not json").unwrap();
        let err = read_document(tmp.path()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Malformed { .. }));
    }
}
