// src/model.rs
//! Document model shared by every stage: per-ticker parallel article arrays
//! and the day's ticker → articles mapping.
//!
//! Arrays stay parallel on the wire (`texts[i]`, `url[i]`, `sentiments[i]`
//! all describe article `i`), so alignment is checked rather than encoded in
//! the types.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Sentiment domain written into documents. Class indices never get here;
/// see `enrich::sentiment::LabelMapping`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    pub const ALL: [SentimentLabel; 3] = [Self::Positive, Self::Neutral, Self::Negative];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SentimentLabel {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" => Ok(Self::Positive),
            "neutral" => Ok(Self::Neutral),
            "negative" => Ok(Self::Negative),
            other => Err(PipelineError::Config(format!(
                "unknown sentiment label {other:?}"
            ))),
        }
    }
}

/// One raw scrape record as written by the retriever: a single ticker's
/// articles for one day, without any derived fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub texts: Vec<String>,
    pub url: Vec<String>,
    pub name: Vec<String>,
    pub description: Vec<String>,
    #[serde(rename = "datePublished")]
    pub date_published: Vec<String>,
}

impl RawRecord {
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    /// Validates the five base arrays and lifts the record into an `ArticleSet`.
    pub fn into_article_set(self, ticker: &str) -> Result<ArticleSet> {
        let set = ArticleSet {
            texts: self.texts,
            url: self.url,
            name: self.name,
            description: self.description,
            date_published: self.date_published,
            sentiments: None,
            summaries: None,
            extra: BTreeMap::new(),
        };
        set.check_alignment(ticker)?;
        Ok(set)
    }
}

/// Per-ticker article arrays. Enrichment fields are absent until their
/// stage has run; unknown fields ride along untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArticleSet {
    pub texts: Vec<String>,
    pub url: Vec<String>,
    pub name: Vec<String>,
    pub description: Vec<String>,
    #[serde(rename = "datePublished")]
    pub date_published: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiments: Option<Vec<SentimentLabel>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summaries: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ArticleSet {
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    fn field_lengths(&self) -> Vec<(&'static str, usize)> {
        let mut out = vec![
            ("url", self.url.len()),
            ("name", self.name.len()),
            ("description", self.description.len()),
            ("datePublished", self.date_published.len()),
        ];
        if let Some(s) = &self.sentiments {
            out.push(("sentiments", s.len()));
        }
        if let Some(s) = &self.summaries {
            out.push(("summaries", s.len()));
        }
        out
    }

    /// Every populated array must have `texts.len()` entries.
    pub fn check_alignment(&self, ticker: &str) -> Result<()> {
        let expected = self.len();
        for (field, actual) in self.field_lengths() {
            if actual != expected {
                return Err(PipelineError::MisalignedRecord {
                    ticker: ticker.to_string(),
                    field,
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }
}

/// The day's document: ticker symbol → articles. `BTreeMap` keeps the
/// serialized form stable across reruns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalDocument {
    pub tickers: BTreeMap<String, ArticleSet>,
}

impl CanonicalDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, ticker: &str) -> Option<&ArticleSet> {
        self.tickers.get(ticker)
    }

    pub fn insert(&mut self, ticker: impl Into<String>, set: ArticleSet) -> Option<ArticleSet> {
        self.tickers.insert(ticker.into(), set)
    }

    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }

    pub fn article_count(&self) -> usize {
        self.tickers.values().map(ArticleSet::len).sum()
    }

    pub fn check_alignment(&self) -> Result<()> {
        for (ticker, set) in &self.tickers {
            set.check_alignment(ticker)?;
        }
        Ok(())
    }

    /// Fails with `MissingTickerData` listing every configured ticker that
    /// has no entry.
    pub fn check_complete<S: AsRef<str>>(&self, tickers: &[S], date: NaiveDate) -> Result<()> {
        let missing: Vec<String> = tickers
            .iter()
            .map(AsRef::as_ref)
            .filter(|t| !self.tickers.contains_key(*t))
            .map(str::to_string)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::MissingTickerData { date, missing })
        }
    }
}

/// A stage may only add: same tickers, same base lengths, no enrichment
/// field dropped.
pub fn check_monotonic(before: &CanonicalDocument, after: &CanonicalDocument) -> Result<()> {
    for (ticker, old) in &before.tickers {
        let Some(new) = after.tickers.get(ticker) else {
            return Err(PipelineError::Monotonicity(format!("ticker {ticker} removed")));
        };
        if new.len() != old.len() {
            return Err(PipelineError::Monotonicity(format!(
                "{ticker} resized from {} to {} articles",
                old.len(),
                new.len()
            )));
        }
        if old.sentiments.is_some() && new.sentiments.is_none() {
            return Err(PipelineError::Monotonicity(format!(
                "{ticker} lost its sentiments"
            )));
        }
        if old.summaries.is_some() && new.summaries.is_none() {
            return Err(PipelineError::Monotonicity(format!(
                "{ticker} lost its summaries"
            )));
        }
        if let Some(key) = old.extra.keys().find(|k| !new.extra.contains_key(*k)) {
            return Err(PipelineError::Monotonicity(format!("{ticker} lost field {key}")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(n: usize) -> RawRecord {
        let v = |p: &str| (0..n).map(|i| format!("{p}{i}")).collect::<Vec<_>>();
        RawRecord {
            texts: v("t"),
            url: v("u"),
            name: v("n"),
            description: v("d"),
            date_published: v("2023-07-22T0"),
        }
    }

    #[test]
    fn wire_names_match_retriever_format() {
        let set = raw(1).into_article_set("MSFT").unwrap();
        let json = serde_json::to_value(&set).unwrap();
        assert!(json.get("datePublished").is_some());
        assert!(json.get("sentiments").is_none());
        assert!(json.get("summaries").is_none());
    }

    #[test]
    fn misaligned_raw_record_is_rejected() {
        let mut r = raw(2);
        r.url.pop();
        let err = r.into_article_set("IBM").unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MisalignedRecord { field: "url", expected: 2, actual: 1, .. }
        ));
    }

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let src = r#"{"texts":["a"],"url":["u"],"name":["n"],"description":["d"],
                      "datePublished":["2023-07-22"],"provider":["bing"]}"#;
        let set: ArticleSet = serde_json::from_str(src).unwrap();
        assert!(set.extra.contains_key("provider"));
        let back = serde_json::to_value(&set).unwrap();
        assert_eq!(back["provider"][0], "bing");
    }

    #[test]
    fn sentiments_length_is_part_of_alignment() {
        let mut set = raw(2).into_article_set("AAPL").unwrap();
        set.sentiments = Some(vec![SentimentLabel::Positive]);
        assert!(set.check_alignment("AAPL").is_err());
        set.sentiments = Some(vec![SentimentLabel::Positive, SentimentLabel::Neutral]);
        assert!(set.check_alignment("AAPL").is_ok());
    }

    #[test]
    fn monotonic_check_catches_dropped_fields() {
        let mut before = CanonicalDocument::new();
        let mut set = raw(1).into_article_set("TXN").unwrap();
        set.sentiments = Some(vec![SentimentLabel::Negative]);
        before.insert("TXN", set.clone());

        let mut after = before.clone();
        assert!(check_monotonic(&before, &after).is_ok());

        after.tickers.get_mut("TXN").unwrap().sentiments = None;
        assert!(matches!(
            check_monotonic(&before, &after),
            Err(PipelineError::Monotonicity(_))
        ));

        after.tickers.clear();
        assert!(check_monotonic(&before, &after).is_err());
    }

    #[test]
    fn label_parsing_is_case_insensitive() {
        assert_eq!("Positive".parse::<SentimentLabel>().unwrap(), SentimentLabel::Positive);
        assert!("bullish".parse::<SentimentLabel>().is_err());
    }
}
