// tests/e2e_pipeline.rs
use chrono::NaiveDate;
use stock_news_digest::config::{PipelineConfig, TickerConfig};
use stock_news_digest::enrich::summary::LeadBackend;
use stock_news_digest::enrich::{GenerationParams, StaticModel, SummaryModel};
use stock_news_digest::notify::MockDelivery;
use stock_news_digest::runner::{document_path, read_document};
use stock_news_digest::stages::{
    aggregate_stage, classify_stage, notify_stage, processed_dates, summarize_stage,
};
use stock_news_digest::store::{FsStore, RecordStore, StoreConfig};
use stock_news_digest::{PipelineError, RawRecord, SentimentLabel};

/// A processed container that refuses every write.
struct ReadOnlyStore;

#[async_trait::async_trait]
impl RecordStore for ReadOnlyStore {
    async fn put(&self, name: &str, _bytes: Vec<u8>) -> stock_news_digest::Result<()> {
        Err(PipelineError::io(
            name,
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only container"),
        ))
    }

    async fn get(&self, name: &str) -> stock_news_digest::Result<Vec<u8>> {
        Err(PipelineError::io(
            name,
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such blob"),
        ))
    }

    async fn list(&self) -> stock_news_digest::Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn describe(&self) -> String {
        "read-only".to_string()
    }
}

const T1: &str = "Microsoft shares climb after cloud revenue beats estimates";
const T2: &str = "Microsoft faces antitrust inquiry over Teams bundling";

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 7, 22).unwrap()
}

fn cfg() -> PipelineConfig {
    let mut cfg = PipelineConfig::default();
    cfg.tickers = vec![TickerConfig {
        symbol: "MSFT".into(),
        display_name: "Microsoft".into(),
    }];
    cfg.enrich.retry_base_ms = 1;
    cfg
}

fn msft_record() -> RawRecord {
    RawRecord {
        texts: vec![T1.into(), T2.into()],
        url: vec![
            "https://news.example/msft-cloud".into(),
            "https://news.example/msft-teams".into(),
        ],
        name: vec!["Cloud beats".into(), "Teams inquiry".into()],
        description: vec!["cloud".into(), "teams".into()],
        date_published: vec![
            "2023-07-22T05:10:00.0000000Z".into(),
            "2023-07-22T06:45:00.0000000Z".into(),
        ],
    }
}

fn sentiment_model() -> StaticModel<SentimentLabel> {
    StaticModel::new("static-sentiment")
        .with(T1, SentimentLabel::Positive)
        .with(T2, SentimentLabel::Negative)
        .with_default(SentimentLabel::Neutral)
}

struct Dirs {
    _tmp: tempfile::TempDir,
    raw: FsStore,
    processed: FsStore,
    merged: std::path::PathBuf,
    classified: std::path::PathBuf,
    summarized: std::path::PathBuf,
    notified: std::path::PathBuf,
}

async fn setup() -> Dirs {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().to_path_buf();
    let store = |container: &str| {
        FsStore::new(StoreConfig {
            root: root.clone(),
            container: container.into(),
        })
    };
    let raw = store("stock-news-json");
    let processed = store("processed-stock-news-json");
    raw.put(
        "MSFT-2023-07-22T07-00-00.json",
        serde_json::to_vec(&msft_record()).unwrap(),
    )
    .await
    .unwrap();
    // Yesterday's scrape must not leak into today's document.
    raw.put(
        "MSFT-2023-07-21T07-00-00.json",
        serde_json::to_vec(&RawRecord::default()).unwrap(),
    )
    .await
    .unwrap();

    Dirs {
        raw,
        processed,
        merged: root.join("stage/merged"),
        classified: root.join("stage/classified"),
        summarized: root.join("stage/summarized"),
        notified: root.join("stage/notified"),
        _tmp: tmp,
    }
}

#[tokio::test]
async fn daily_run_produces_the_expected_digest() {
    let cfg = cfg();
    let d = setup().await;

    let merged = aggregate_stage(&cfg, &d.raw, day(), &d.merged).await.unwrap();
    assert_eq!((merged.tickers, merged.articles), (1, 2));

    let sentiment = sentiment_model();
    let (_, report) = classify_stage(&cfg, &sentiment, &d.merged, &d.classified)
        .await
        .unwrap();
    assert_eq!(report.fallbacks(), 0);
    assert_eq!(sentiment.calls(), 2);

    let summarizer = SummaryModel::new(
        LeadBackend,
        GenerationParams {
            max_length: 4,
            ..GenerationParams::default()
        },
    );
    summarize_stage(
        &cfg,
        &summarizer,
        &d.classified,
        &d.summarized,
        Some(&d.processed as &dyn RecordStore),
        day(),
    )
    .await
    .unwrap();

    let doc = read_document(&d.summarized).await.unwrap();
    let msft = doc.get("MSFT").unwrap();
    assert_eq!(
        msft.sentiments.as_deref().unwrap(),
        &[SentimentLabel::Positive, SentimentLabel::Negative]
    );
    assert_eq!(
        msft.summaries.as_deref().unwrap(),
        &["Microsoft shares climb after".to_string(), "Microsoft faces antitrust inquiry".to_string()]
    );

    // The published artifact is the summarize output, byte for byte.
    let published = d
        .processed
        .get("processed-stock-news-2023-07-22.json")
        .await
        .unwrap();
    assert_eq!(published, std::fs::read(document_path(&d.summarized)).unwrap());
    assert_eq!(
        processed_dates(&d.processed, &cfg.storage.processed_prefix)
            .await
            .unwrap(),
        vec![day()]
    );

    let delivery = MockDelivery::new();
    let outcome = notify_stage(&cfg, &delivery, &d.summarized, &d.notified, day())
        .await
        .unwrap();
    assert_eq!(outcome.sections, 1);
    assert!(outcome.skipped.is_empty());
    assert_eq!(outcome.receipt.channel, "mock");

    let sent = delivery.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Stock news analysis for 2023-07-22");
    assert!(sent[0]
        .body
        .contains("Sentiments: positive -> 1 | neutral -> 0 | negative -> 1"));
    assert!(sent[0].body.contains("Microsoft faces antitrust inquiry\n"));

    // notify passes the document through unchanged.
    assert_eq!(
        std::fs::read(document_path(&d.notified)).unwrap(),
        std::fs::read(document_path(&d.summarized)).unwrap()
    );
}

#[tokio::test]
async fn failed_delivery_fails_the_stage_without_output() {
    let cfg = cfg();
    let d = setup().await;
    aggregate_stage(&cfg, &d.raw, day(), &d.merged).await.unwrap();
    classify_stage(&cfg, &sentiment_model(), &d.merged, &d.classified)
        .await
        .unwrap();

    let delivery = MockDelivery::failing("connection refused");
    let err = notify_stage(&cfg, &delivery, &d.classified, &d.notified, day())
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("connection refused"));
    assert!(!document_path(&d.notified).exists());
}

#[tokio::test]
async fn aggregate_fails_when_a_configured_ticker_has_no_record() {
    let mut cfg = cfg();
    cfg.tickers.push(TickerConfig {
        symbol: "DOCN".into(),
        display_name: "DigitalOcean".into(),
    });
    let d = setup().await;

    let err = aggregate_stage(&cfg, &d.raw, day(), &d.merged)
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("DOCN"));
    assert!(!document_path(&d.merged).exists());
}

#[tokio::test]
async fn classify_rerun_is_byte_identical() {
    let cfg = cfg();
    let d = setup().await;
    aggregate_stage(&cfg, &d.raw, day(), &d.merged).await.unwrap();

    let (a, _) = classify_stage(&cfg, &sentiment_model(), &d.merged, &d.classified)
        .await
        .unwrap();
    let (b, _) = classify_stage(&cfg, &sentiment_model(), &d.merged, &d.classified)
        .await
        .unwrap();
    assert_eq!(a.sha256, b.sha256);
}

#[tokio::test]
async fn failed_publish_leaves_no_summarize_output() {
    let cfg = cfg();
    let d = setup().await;
    aggregate_stage(&cfg, &d.raw, day(), &d.merged).await.unwrap();
    classify_stage(&cfg, &sentiment_model(), &d.merged, &d.classified)
        .await
        .unwrap();

    let summarizer = SummaryModel::new(LeadBackend, GenerationParams::default());
    let err = summarize_stage(
        &cfg,
        &summarizer,
        &d.classified,
        &d.summarized,
        Some(&ReadOnlyStore as &dyn RecordStore),
        day(),
    )
    .await
    .unwrap_err();
    assert!(format!("{err:#}").contains("read-only container"));
    assert!(!document_path(&d.summarized).exists());
}
