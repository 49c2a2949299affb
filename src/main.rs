//! Daily stock-news pipeline. Binary entrypoint.
//!
//! Each subcommand is one stage run by the external scheduler:
//! `aggregate` → `classify` → `summarize` → `notify`.

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use stock_news_digest::enrich::http::{build_sentiment_model, build_summary_model};
use stock_news_digest::notify::build_delivery;
use stock_news_digest::store::{FsStore, RecordStore, StoreConfig};
use stock_news_digest::{config, stages, telemetry};

#[derive(Parser, Debug)]
#[command(name = "stock-news-digest", version, about = "Daily stock news pipeline stages")]
struct Cli {
    /// Pipeline config (TOML or JSON).
    #[arg(long, global = true, env = config::ENV_CONFIG_PATH)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct Dirs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    output: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Merge the day's raw records into one canonical document.
    Aggregate {
        /// Raw container directory (defaults to the configured one).
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        output: PathBuf,
        /// Calendar day to aggregate (defaults to today, local time).
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Attach a sentiment label to every article.
    Classify {
        #[command(flatten)]
        dirs: Dirs,
    },
    /// Attach a summary to every article.
    Summarize {
        #[command(flatten)]
        dirs: Dirs,
        /// Processed container directory to publish the dated document to.
        #[arg(long)]
        publish: Option<PathBuf>,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Compose and deliver the digest.
    Notify {
        #[command(flatten)]
        dirs: Dirs,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// List dates with a processed document.
    Dates {
        /// Processed container directory (defaults to the configured one).
        #[arg(long)]
        input: Option<PathBuf>,
    },
}

/// An explicit directory, or `<root>/<container>` from the config.
fn container(dir: Option<PathBuf>, root: &Path, name: &str) -> FsStore {
    match dir {
        Some(dir) => FsStore::at(dir),
        None => FsStore::new(StoreConfig {
            root: root.to_path_buf(),
            container: name.to_string(),
        }),
    }
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Aggregate {
            input,
            output,
            date,
        } => {
            let date = date.unwrap_or_else(today);
            let raw = container(input, &cfg.storage.root, &cfg.storage.raw_container);
            stages::aggregate_stage(&cfg, &raw, date, &output).await?;
        }
        Command::Classify { dirs } => {
            let model = build_sentiment_model(&cfg)?;
            let (_, report) =
                stages::classify_stage(&cfg, model.as_ref(), &dirs.input, &dirs.output).await?;
            tracing::info!(
                articles = report.articles,
                retries = report.retries,
                fallbacks = report.fallbacks(),
                "classify finished"
            );
        }
        Command::Summarize {
            dirs,
            publish,
            date,
        } => {
            let date = date.unwrap_or_else(today);
            let model = build_summary_model(&cfg)?;
            let publish = publish.map(FsStore::at);
            let (_, report) = stages::summarize_stage(
                &cfg,
                model.as_ref(),
                &dirs.input,
                &dirs.output,
                publish.as_ref().map(|s| s as &dyn RecordStore),
                date,
            )
            .await?;
            tracing::info!(
                articles = report.articles,
                retries = report.retries,
                fallbacks = report.fallbacks(),
                "summarize finished"
            );
        }
        Command::Notify { dirs, date } => {
            let date = date.unwrap_or_else(today);
            let delivery = build_delivery(&cfg.delivery)?;
            let outcome =
                stages::notify_stage(&cfg, delivery.as_ref(), &dirs.input, &dirs.output, date)
                    .await?;
            for e in &outcome.skipped {
                tracing::warn!(error = %e, "digest section skipped");
            }
        }
        Command::Dates { input } => {
            let store = container(input, &cfg.storage.root, &cfg.storage.processed_container);
            for d in stages::processed_dates(&store, &cfg.storage.processed_prefix).await? {
                println!("{d}");
            }
        }
    }
    Ok(())
}
