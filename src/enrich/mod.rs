// src/enrich/mod.rs
//! Enrichment stage shape: run a model over every article text and attach
//! the results as a new array, index-aligned with `texts`.
//!
//! Calls run concurrently (bounded by `EnrichOptions::concurrency`). Each
//! result is written into a pre-sized slot at its article index, so the
//! attached array always has exactly `texts.len()` entries in article order,
//! whatever order the calls complete in. A call that keeps failing gets the
//! field's sentinel value and is reported; it never shrinks the array.

pub mod http;
pub mod sentiment;
pub mod summary;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use metrics::counter;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::model::{ArticleSet, CanonicalDocument, SentimentLabel};
use crate::telemetry::ensure_metrics_described;

pub use sentiment::{LabelMapping, SentimentModel};
pub use summary::{GenerationParams, SummaryModel};

/// Why a single model call did not produce a value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelCallError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unusable response: {0}")]
    BadResponse(String),
    #[error("class index {0} is outside the label mapping")]
    UnknownClass(usize),
}

impl ModelCallError {
    /// Deterministic failures are not worth another call.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::UnknownClass(_))
    }
}

/// A model seen as a function of one article text.
#[async_trait]
pub trait TextModel<V: Send + 'static>: Send + Sync {
    fn name(&self) -> &str;
    async fn infer(&self, text: &str) -> std::result::Result<V, ModelCallError>;
}

/// The document field an enricher writes.
pub trait EnrichField: Send + Sync + 'static {
    type Value: Clone + Send + Sync + 'static;

    const NAME: &'static str;

    /// Written in place of a value when retries are exhausted.
    fn sentinel() -> Self::Value;

    fn slot(set: &mut ArticleSet) -> &mut Option<Vec<Self::Value>>;
}

pub struct Sentiments;

impl EnrichField for Sentiments {
    type Value = SentimentLabel;
    const NAME: &'static str = "sentiments";

    fn sentinel() -> SentimentLabel {
        SentimentLabel::Neutral
    }

    fn slot(set: &mut ArticleSet) -> &mut Option<Vec<SentimentLabel>> {
        &mut set.sentiments
    }
}

pub struct Summaries;

impl EnrichField for Summaries {
    type Value = String;
    const NAME: &'static str = "summaries";

    fn sentinel() -> String {
        String::new()
    }

    fn slot(set: &mut ArticleSet) -> &mut Option<Vec<String>> {
        &mut set.summaries
    }
}

#[derive(Debug, Clone)]
pub struct EnrichOptions {
    pub concurrency: usize,
    /// Extra attempts after the first failed call.
    pub max_retries: u32,
    pub retry_base: Duration,
    pub call_timeout: Duration,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_retries: 3,
            retry_base: Duration::from_millis(500),
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl EnrichOptions {
    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self {
            concurrency: cfg.enrich.concurrency.max(1),
            max_retries: cfg.enrich.max_retries,
            retry_base: Duration::from_millis(cfg.enrich.retry_base_ms),
            call_timeout: Duration::from_secs(cfg.inference.timeout_secs.max(1)),
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        // 1x, 2x, 4x ... of the base, shift capped to keep it finite.
        self.retry_base
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(10))
    }
}

/// What happened during one enrichment pass.
#[derive(Debug, Default)]
pub struct EnrichReport {
    pub field: &'static str,
    pub articles: usize,
    pub retries: usize,
    /// One `ModelCallFailure` per article that got the sentinel.
    pub failures: Vec<PipelineError>,
}

impl EnrichReport {
    pub fn fallbacks(&self) -> usize {
        self.failures.len()
    }
}

struct CallOutcome<V> {
    ticker: usize,
    index: usize,
    retries: u32,
    result: std::result::Result<V, ModelCallError>,
}

async fn call_with_retry<V, M>(
    model: &M,
    text: &str,
    opts: &EnrichOptions,
) -> (std::result::Result<V, ModelCallError>, u32)
where
    V: Send + 'static,
    M: TextModel<V> + ?Sized,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        counter!("enrich_calls_total").increment(1);
        let res = match tokio::time::timeout(opts.call_timeout, model.infer(text)).await {
            Ok(r) => r,
            Err(_) => Err(ModelCallError::Timeout(opts.call_timeout)),
        };
        match res {
            Ok(v) => return (Ok(v), attempt - 1),
            Err(e) if e.is_retryable() && attempt <= opts.max_retries => {
                counter!("enrich_retries_total").increment(1);
                tracing::debug!(model = model.name(), attempt, error = %e, "model call failed, retrying");
                tokio::time::sleep(opts.backoff(attempt)).await;
            }
            Err(e) => return (Err(e), attempt - 1),
        }
    }
}

/// Run `model` over every article of every ticker in `doc` and attach the
/// results as field `F`, replacing a previous value of that field.
///
/// Per-article failures are contained (sentinel + report entry); the
/// function only errors if the document itself ends up misaligned.
pub async fn enrich<F, M>(
    doc: &mut CanonicalDocument,
    model: &M,
    opts: &EnrichOptions,
) -> Result<EnrichReport>
where
    F: EnrichField,
    M: TextModel<F::Value> + ?Sized,
{
    ensure_metrics_described();

    let tickers: Vec<String> = doc.tickers.keys().cloned().collect();
    let mut slots: Vec<Vec<Option<F::Value>>> = tickers
        .iter()
        .map(|t| vec![None; doc.tickers[t].len()])
        .collect();
    let total: usize = slots.iter().map(Vec::len).sum();

    tracing::info!(
        field = F::NAME,
        model = model.name(),
        tickers = tickers.len(),
        articles = total,
        concurrency = opts.concurrency,
        "enrichment started"
    );

    let done = AtomicUsize::new(0);
    let outcomes: Vec<CallOutcome<F::Value>> = {
        let texts: Vec<&[String]> = tickers
            .iter()
            .map(|t| doc.tickers[t].texts.as_slice())
            .collect();
        let jobs = texts
            .iter()
            .enumerate()
            .flat_map(|(ti, ts)| ts.iter().enumerate().map(move |(ai, text)| (ti, ai, text)));

        let outcomes = stream::iter(jobs)
            .map(|(ticker, index, text)| {
                let done = &done;
                async move {
                    let (result, retries) = call_with_retry(model, text, opts).await;
                    let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                    if n % 25 == 0 || n == total {
                        tracing::debug!(field = F::NAME, progress = %format!("{n}/{total}"), "enrichment progress");
                    }
                    CallOutcome {
                        ticker,
                        index,
                        retries,
                        result,
                    }
                }
            })
            .buffer_unordered(opts.concurrency.max(1))
            .collect::<Vec<_>>()
            .await;
        outcomes
    };

    let mut report = EnrichReport {
        field: F::NAME,
        articles: total,
        ..EnrichReport::default()
    };

    for out in outcomes {
        report.retries += out.retries as usize;
        let value = match out.result {
            Ok(v) => v,
            Err(e) => {
                let ticker = &tickers[out.ticker];
                tracing::warn!(
                    field = F::NAME,
                    ticker = %ticker,
                    index = out.index,
                    retries = out.retries,
                    error = %e,
                    "model call failed, writing sentinel"
                );
                counter!("enrich_fallbacks_total").increment(1);
                report.failures.push(PipelineError::ModelCallFailure {
                    model: model.name().to_string(),
                    ticker: ticker.clone(),
                    index: out.index,
                    reason: e.to_string(),
                });
                F::sentinel()
            }
        };
        slots[out.ticker][out.index] = Some(value);
    }

    for (ticker, ticker_slots) in tickers.iter().zip(slots) {
        let values: Vec<F::Value> = ticker_slots
            .into_iter()
            .map(|v| v.unwrap_or_else(F::sentinel))
            .collect();
        if let Some(set) = doc.tickers.get_mut(ticker) {
            *F::slot(set) = Some(values);
            set.check_alignment(ticker)?;
        }
    }

    tracing::info!(
        field = F::NAME,
        articles = report.articles,
        retries = report.retries,
        fallbacks = report.fallbacks(),
        "enrichment finished"
    );
    Ok(report)
}

/// Canned answers keyed by exact text; for tests and offline runs.
pub struct StaticModel<V> {
    name: String,
    answers: HashMap<String, V>,
    default: Option<V>,
    calls: AtomicUsize,
}

impl<V: Clone> StaticModel<V> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            answers: HashMap::new(),
            default: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with(mut self, text: impl Into<String>, value: V) -> Self {
        self.answers.insert(text.into(), value);
        self
    }

    pub fn with_default(mut self, value: V) -> Self {
        self.default = Some(value);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl<V> TextModel<V> for StaticModel<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn infer(&self, text: &str) -> std::result::Result<V, ModelCallError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.answers
            .get(text)
            .or(self.default.as_ref())
            .cloned()
            .ok_or_else(|| ModelCallError::BadResponse(format!("no canned answer for {text:?}")))
    }
}
