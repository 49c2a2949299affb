// src/digest.rs
//! Turns an enriched document into the plaintext daily digest.
//!
//! Display lists are a projection: boilerplate entries are dropped from the
//! text shown to the reader, but counts are always taken from the full,
//! unfiltered `sentiments` array and the projection is never written back.

use std::collections::HashMap;
use std::fmt::Write as _;

use chrono::NaiveDate;
use metrics::counter;
use once_cell::sync::OnceCell;
use regex::Regex;

use crate::artifact::ISO_DATE_FORMAT;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::model::{ArticleSet, CanonicalDocument, SentimentLabel};
use crate::notify::DigestMessage;
use crate::telemetry::ensure_metrics_described;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SentimentCounts {
    pub positive: usize,
    pub neutral: usize,
    pub negative: usize,
}

impl SentimentCounts {
    pub fn from_labels(labels: &[SentimentLabel]) -> Self {
        let mut c = Self::default();
        for l in labels {
            match l {
                SentimentLabel::Positive => c.positive += 1,
                SentimentLabel::Neutral => c.neutral += 1,
                SentimentLabel::Negative => c.negative += 1,
            }
        }
        c
    }
}

/// One ticker's block in the digest.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerSection {
    pub ticker: String,
    pub display_name: String,
    /// Summaries (or texts when no summaries exist), boilerplate removed.
    pub entries: Vec<String>,
    pub counts: Option<SentimentCounts>,
    pub urls: Vec<String>,
}

#[derive(Debug)]
pub struct Digest {
    pub date: NaiveDate,
    pub sections: Vec<TickerSection>,
    /// `UnknownTicker` for every requested ticker missing from the document.
    pub skipped: Vec<PipelineError>,
    include_urls: bool,
}

impl Digest {
    pub fn subject(&self) -> String {
        format!("Stock news analysis for {}", self.date.format(ISO_DATE_FORMAT))
    }

    pub fn body(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "This is your daily stock news summary for {}.",
            self.date.format(ISO_DATE_FORMAT)
        );
        for s in &self.sections {
            out.push('\n');
            out.push_str("===\n");
            let _ = writeln!(out, "News about {} ({}):", s.display_name, s.ticker);
            if s.entries.is_empty() {
                out.push_str("(no articles)\n");
            }
            for e in &s.entries {
                out.push_str(e);
                out.push('\n');
            }
            out.push('\n');
            match s.counts {
                Some(c) => {
                    let _ = writeln!(
                        out,
                        "Sentiments: positive -> {} | neutral -> {} | negative -> {}",
                        c.positive, c.neutral, c.negative
                    );
                }
                None => out.push_str("Sentiments: not available\n"),
            }
            if self.include_urls && !s.urls.is_empty() {
                out.push_str("\nSources:\n");
                for u in &s.urls {
                    out.push_str(u);
                    out.push('\n');
                }
            }
            out.push_str("===\n");
        }
        out
    }

    pub fn to_message(&self) -> DigestMessage {
        DigestMessage {
            subject: self.subject(),
            body: self.body(),
        }
    }
}

/// Normalize display text: decode entities, strip tags, collapse whitespace.
pub fn display_text(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[a-z][^<>]*>").unwrap());
    let stripped = re_tags.replace_all(&decoded, "");

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub struct Composer {
    marker: String,
    include_urls: bool,
    display_names: HashMap<String, String>,
}

impl Composer {
    pub fn new(cfg: &PipelineConfig) -> Self {
        Self {
            marker: cfg.digest.boilerplate_marker.clone(),
            include_urls: cfg.digest.include_urls,
            display_names: cfg
                .tickers
                .iter()
                .map(|t| (t.symbol.clone(), t.display_name.clone()))
                .collect(),
        }
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self
    }

    fn is_boilerplate(&self, s: &str) -> bool {
        !self.marker.is_empty() && s.contains(&self.marker)
    }

    fn section(&self, ticker: &str, set: &ArticleSet) -> TickerSection {
        let source = set.summaries.as_deref().unwrap_or(&set.texts);
        let entries = source
            .iter()
            .map(|s| display_text(s))
            .filter(|s| !s.is_empty() && !self.is_boilerplate(s))
            .collect();
        TickerSection {
            ticker: ticker.to_string(),
            display_name: self
                .display_names
                .get(ticker)
                .cloned()
                .unwrap_or_else(|| ticker.to_string()),
            entries,
            counts: set.sentiments.as_deref().map(SentimentCounts::from_labels),
            urls: set
                .url
                .iter()
                .filter(|u| !u.trim().is_empty())
                .cloned()
                .collect(),
        }
    }

    /// One section per requested ticker, in request order. Tickers absent
    /// from `doc` are skipped and reported, never fatal.
    pub fn compose<S: AsRef<str>>(
        &self,
        doc: &CanonicalDocument,
        tickers: &[S],
        date: NaiveDate,
    ) -> Digest {
        ensure_metrics_described();

        let mut sections = Vec::with_capacity(tickers.len());
        let mut skipped = Vec::new();
        for t in tickers {
            let t = t.as_ref();
            match doc.get(t) {
                Some(set) => {
                    sections.push(self.section(t, set));
                    counter!("digest_sections_total").increment(1);
                }
                None => {
                    tracing::warn!(ticker = %t, "digest ticker missing from document, section omitted");
                    counter!("digest_unknown_ticker_total").increment(1);
                    skipped.push(PipelineError::UnknownTicker(t.to_string()));
                }
            }
        }
        Digest {
            date,
            sections,
            skipped,
            include_urls: self.include_urls,
        }
    }
}
