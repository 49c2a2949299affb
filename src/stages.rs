// src/stages.rs
//! The four daily stages, each a single batch run between two artifact
//! directories. Ordering and retries belong to the external scheduler.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;

use crate::aggregate::aggregate_from_store;
use crate::artifact;
use crate::config::PipelineConfig;
use crate::digest::Composer;
use crate::enrich::{
    enrich, EnrichField, EnrichOptions, EnrichReport, Sentiments, Summaries, TextModel,
};
use crate::error::PipelineError;
use crate::model::{CanonicalDocument, SentimentLabel};
use crate::notify::{DeliveryAdapter, DeliveryReceipt};
use crate::runner::{self, StageOutput};
use crate::store::RecordStore;

/// Merge the day's raw records from `raw` and write the canonical document
/// to `output_dir`.
pub async fn aggregate_stage(
    cfg: &PipelineConfig,
    raw: &dyn RecordStore,
    date: NaiveDate,
    output_dir: &Path,
) -> Result<StageOutput> {
    let tickers = cfg.ticker_symbols();
    let outcome = aggregate_from_store(raw, &tickers, date, cfg.aggregate.merge_policy)
        .await
        .with_context(|| format!("aggregate: merging raw records for {date}"))?;

    if !outcome.duplicates.is_empty() {
        tracing::warn!(duplicates = ?outcome.duplicates, policy = ?cfg.aggregate.merge_policy, "duplicate raw records merged");
    }

    let out = runner::write_document(output_dir, &outcome.document)
        .await
        .with_context(|| format!("aggregate: writing output to {}", output_dir.display()))?;
    tracing::info!(
        stage = "aggregate",
        %date,
        tickers = out.tickers,
        articles = out.articles,
        sha256 = %out.sha256,
        "canonical document written"
    );
    Ok(out)
}

/// Enrich the input document and check it; nothing is written yet.
async fn enrich_prepared<F, M>(
    name: &str,
    cfg: &PipelineConfig,
    model: &M,
    input_dir: &Path,
) -> Result<(CanonicalDocument, EnrichReport)>
where
    F: EnrichField,
    M: TextModel<F::Value> + ?Sized,
{
    let opts = EnrichOptions::from_config(cfg);
    let mut report = None;
    let slot = &mut report;
    let opts = &opts;
    let doc = runner::prepare(name, input_dir, move |mut doc| async move {
        *slot = Some(enrich::<F, M>(&mut doc, model, opts).await?);
        Ok::<_, anyhow::Error>(doc)
    })
    .await?;
    Ok((doc, report.unwrap_or_default()))
}

/// Attach `sentiments` to every ticker.
pub async fn classify_stage<M>(
    cfg: &PipelineConfig,
    model: &M,
    input_dir: &Path,
    output_dir: &Path,
) -> Result<(StageOutput, EnrichReport)>
where
    M: TextModel<SentimentLabel> + ?Sized,
{
    let (doc, report) = enrich_prepared::<Sentiments, M>("classify", cfg, model, input_dir).await?;
    let out = runner::commit("classify", output_dir, &doc).await?;
    Ok((out, report))
}

/// Attach `summaries` to every ticker. When a store is given the finished
/// document is first published as `<processed_prefix>-<date>.json`; the
/// stage output is only written once that publish succeeded.
pub async fn summarize_stage<M>(
    cfg: &PipelineConfig,
    model: &M,
    input_dir: &Path,
    output_dir: &Path,
    publish: Option<&dyn RecordStore>,
    date: NaiveDate,
) -> Result<(StageOutput, EnrichReport)>
where
    M: TextModel<String> + ?Sized,
{
    let (doc, report) = enrich_prepared::<Summaries, M>("summarize", cfg, model, input_dir).await?;

    if let Some(store) = publish {
        let name = artifact::artifact_name(&cfg.storage.processed_prefix, date);
        let bytes = runner::encode_document(&doc)?;
        store
            .put(&name, bytes)
            .await
            .with_context(|| format!("summarize: publishing {name} to {}", store.describe()))?;
        tracing::info!(artifact = %name, store = %store.describe(), "processed document published");
    }

    let out = runner::commit("summarize", output_dir, &doc).await?;
    Ok((out, report))
}

#[derive(Debug)]
pub struct NotifyOutcome {
    pub output: StageOutput,
    pub receipt: DeliveryReceipt,
    pub sections: usize,
    pub skipped: Vec<PipelineError>,
}

/// Compose and deliver the digest, then pass the document through unchanged.
/// A delivery failure fails the stage and writes nothing.
pub async fn notify_stage(
    cfg: &PipelineConfig,
    delivery: &dyn DeliveryAdapter,
    input_dir: &Path,
    output_dir: &Path,
    date: NaiveDate,
) -> Result<NotifyOutcome> {
    let composer = Composer::new(cfg);
    let tickers = cfg.digest_tickers();
    let mut sent = None;
    let slot = &mut sent;
    let composer = &composer;
    let tickers = &tickers;

    let output = runner::run("notify", input_dir, output_dir, move |doc| async move {
        let digest = composer.compose(&doc, tickers, date);
        let msg = digest.to_message();
        let receipt = delivery
            .send(&msg)
            .await
            .with_context(|| format!("notify: delivering via {}", delivery.name()))?;
        tracing::info!(
            channel = receipt.channel,
            sections = digest.sections.len(),
            skipped = digest.skipped.len(),
            "digest delivered"
        );
        *slot = Some((receipt, digest.sections.len(), digest.skipped));
        Ok::<_, anyhow::Error>(doc)
    })
    .await?;

    let (receipt, sections, skipped) =
        sent.context("notify: stage finished without a delivery receipt")?;
    Ok(NotifyOutcome {
        output,
        receipt,
        sections,
        skipped,
    })
}

/// Dates for which a processed document exists.
pub async fn processed_dates(
    store: &dyn RecordStore,
    prefix: &str,
) -> crate::error::Result<Vec<NaiveDate>> {
    let names = store.list().await?;
    Ok(artifact::available_dates(
        names.iter().filter(|n| n.starts_with(prefix)),
    ))
}
