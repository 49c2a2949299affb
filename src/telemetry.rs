// src/telemetry.rs
//! Logging setup for the stage binary and metric descriptions.

use metrics::{describe_counter, describe_gauge};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "stock_news_digest=info,warn";

/// Install the global subscriber. `RUST_LOG` overrides the default filter;
/// `LOG_FORMAT=json` switches to one JSON object per line for the scheduler's
/// log collector.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if let Err(e) = res {
        eprintln!("tracing already initialised: {e}");
    }
}

/// One-time metrics registration (so series carry descriptions once a
/// recorder is installed).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("aggregate_records_total", "Raw records read by the aggregator.");
        describe_counter!(
            "aggregate_dropped_total",
            "Raw records dropped for tickers outside the configured set."
        );
        describe_counter!("enrich_calls_total", "Model calls issued by enrichers.");
        describe_counter!("enrich_retries_total", "Model calls retried after a failure.");
        describe_counter!(
            "enrich_fallbacks_total",
            "Articles that received the sentinel value after retries ran out."
        );
        describe_counter!("digest_sections_total", "Ticker sections written into digests.");
        describe_counter!(
            "digest_unknown_ticker_total",
            "Digest tickers missing from the document."
        );
        describe_gauge!(
            "pipeline_stage_last_run_ts",
            "Unix ts when a stage last wrote its artifact."
        );
    });
}
