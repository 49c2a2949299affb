// src/aggregate.rs
//! Merges the day's raw per-ticker records into one canonical document.

use std::collections::btree_map::Entry;

use chrono::NaiveDate;
use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::artifact;
use crate::error::{PipelineError, Result};
use crate::model::{CanonicalDocument, RawRecord};
use crate::store::RecordStore;
use crate::telemetry::ensure_metrics_described;

/// What to do when a ticker has more than one raw record for the day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergePolicy {
    /// Later record replaces the earlier one in full.
    #[default]
    Overwrite,
    /// Fail the stage with `DuplicateTicker`.
    Reject,
    /// Keep the record with more articles; ties go to the later record.
    KeepLargest,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateOutcome {
    pub document: CanonicalDocument,
    /// Tickers that had more than one record, once per extra record.
    pub duplicates: Vec<String>,
    /// Records for tickers outside the configured universe.
    pub dropped: Vec<String>,
}

/// Merge `records` (in arrival order) for the configured `tickers`.
///
/// Fails with `MissingTickerData` if any configured ticker ends up absent,
/// and with `MisalignedRecord` if a raw record's arrays disagree in length.
pub fn aggregate<I>(
    records: I,
    tickers: &[String],
    date: NaiveDate,
    policy: MergePolicy,
) -> Result<AggregateOutcome>
where
    I: IntoIterator<Item = (String, RawRecord)>,
{
    ensure_metrics_described();

    let mut document = CanonicalDocument::new();
    let mut duplicates = Vec::new();
    let mut dropped = Vec::new();

    for (ticker, raw) in records {
        counter!("aggregate_records_total").increment(1);
        if !tickers.iter().any(|t| *t == ticker) {
            tracing::warn!(ticker = %ticker, "record for unconfigured ticker dropped");
            counter!("aggregate_dropped_total").increment(1);
            dropped.push(ticker);
            continue;
        }
        let set = raw.into_article_set(&ticker)?;

        match document.tickers.entry(ticker) {
            Entry::Vacant(slot) => {
                slot.insert(set);
            }
            Entry::Occupied(mut slot) => {
                let ticker = slot.key().clone();
                match policy {
                    MergePolicy::Reject => {
                        return Err(PipelineError::DuplicateTicker { ticker });
                    }
                    MergePolicy::Overwrite => {
                        tracing::warn!(
                            ticker = %ticker,
                            replaced = slot.get().len(),
                            with = set.len(),
                            "duplicate record, later one wins"
                        );
                        slot.insert(set);
                    }
                    MergePolicy::KeepLargest => {
                        if set.len() >= slot.get().len() {
                            slot.insert(set);
                        }
                        tracing::warn!(
                            ticker = %ticker,
                            kept = slot.get().len(),
                            "duplicate record, larger one kept"
                        );
                    }
                }
                duplicates.push(ticker);
            }
        }
    }

    document.check_complete(tickers, date)?;

    Ok(AggregateOutcome {
        document,
        duplicates,
        dropped,
    })
}

/// Read every raw blob carrying `date` from `store` and merge them.
/// Blobs are taken in name order, which is arrival order for the
/// retriever's `<TICKER>-<timestamp>.json` names.
pub async fn aggregate_from_store(
    store: &dyn RecordStore,
    tickers: &[String],
    date: NaiveDate,
    policy: MergePolicy,
) -> Result<AggregateOutcome> {
    let names = store.list_for_date(date).await?;
    tracing::info!(
        store = %store.describe(),
        %date,
        blobs = names.len(),
        "raw records selected"
    );

    ensure_metrics_described();
    let mut records = Vec::with_capacity(names.len());
    let mut dropped = Vec::new();
    for name in names {
        let Some(ticker) = artifact::ticker_from_name(&name) else {
            tracing::warn!(blob = %name, "blob name carries no ticker, skipped");
            continue;
        };
        if !tickers.iter().any(|t| t == ticker) {
            // Checked before fetching: foreign blobs are never parsed.
            tracing::warn!(blob = %name, ticker = %ticker, "blob for unconfigured ticker dropped");
            counter!("aggregate_dropped_total").increment(1);
            dropped.push(ticker.to_string());
            continue;
        }
        let ticker = ticker.to_string();
        let bytes = store.get(&name).await?;
        let raw: RawRecord =
            serde_json::from_slice(&bytes).map_err(|source| PipelineError::Malformed {
                path: name.clone().into(),
                source,
            })?;
        tracing::debug!(blob = %name, ticker = %ticker, articles = raw.len(), "raw record read");
        records.push((ticker, raw));
    }

    let mut outcome = aggregate(records, tickers, date, policy)?;
    dropped.append(&mut outcome.dropped);
    outcome.dropped = dropped;
    Ok(outcome)
}
