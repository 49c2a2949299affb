// src/artifact.rs
//! Artifact naming: `<prefix>-<YYYY-MM-DD>.json` and calendar-date lookup by
//! the ISO date embedded in a blob name.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use once_cell::sync::OnceCell;
use regex::Regex;

/// File name shared by every stage directory, so stage N's output
/// directory can be mounted as stage N+1's input.
pub const DOCUMENT_FILE: &str = "merged_stock_news.json";

pub const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

pub fn artifact_name(prefix: &str, date: NaiveDate) -> String {
    format!("{prefix}-{}.json", date.format(ISO_DATE_FORMAT))
}

fn iso_date_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"\d{4}-\d{2}-\d{2}").unwrap())
}

/// Every valid calendar date written as `YYYY-MM-DD` inside `name`.
pub fn dates_in_name(name: &str) -> Vec<NaiveDate> {
    let bytes = name.as_bytes();
    iso_date_re()
        .find_iter(name)
        // Digit guards keep "12023-07-220" from yielding a date.
        .filter(|m| {
            let before = m
                .start()
                .checked_sub(1)
                .is_some_and(|i| bytes[i].is_ascii_digit());
            let after = bytes.get(m.end()).is_some_and(u8::is_ascii_digit);
            !before && !after
        })
        .filter_map(|m| NaiveDate::parse_from_str(m.as_str(), ISO_DATE_FORMAT).ok())
        .collect()
}

/// True when `name` carries exactly `date`. Timestamps or other digits in
/// the name play no part.
pub fn matches_date(name: &str, date: NaiveDate) -> bool {
    dates_in_name(name).contains(&date)
}

/// Sorted distinct dates found across `names`.
pub fn available_dates<I, S>(names: I) -> Vec<NaiveDate>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .flat_map(|n| dates_in_name(n.as_ref()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Raw blobs are named `<TICKER>-<timestamp>.json` by the retriever.
pub fn ticker_from_name(name: &str) -> Option<&str> {
    let base = name.rsplit('/').next().unwrap_or(name);
    let (ticker, _) = base.split_once('-')?;
    let ticker = ticker.trim();
    if ticker.is_empty() || !ticker.chars().all(|c| c.is_ascii_alphanumeric() || c == '.') {
        return None;
    }
    Some(ticker)
}
