// tests/runner_atomic.rs
use std::path::Path;

use anyhow::anyhow;
use stock_news_digest::runner::{self, document_path, read_document, write_document};
use stock_news_digest::{ArticleSet, CanonicalDocument, SentimentLabel};

fn doc() -> CanonicalDocument {
    let mut doc = CanonicalDocument::new();
    doc.insert(
        "MSFT",
        ArticleSet {
            texts: vec!["Azure growth accelerates".into(), "Activision deal delayed".into()],
            url: vec!["https://a.example/1".into(), "https://a.example/2".into()],
            name: vec!["Azure".into(), "Activision".into()],
            description: vec!["d1".into(), "d2".into()],
            date_published: vec!["2023-07-22T06:00:00Z".into(); 2],
            ..ArticleSet::default()
        },
    );
    doc
}

async fn seed(dir: &Path) {
    write_document(dir, &doc()).await.unwrap();
}

fn label_all(mut doc: CanonicalDocument) -> CanonicalDocument {
    for set in doc.tickers.values_mut() {
        set.sentiments = Some(vec![SentimentLabel::Positive; set.len()]);
    }
    doc
}

#[tokio::test]
async fn failing_stage_writes_nothing() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    seed(input.path()).await;

    let res = runner::run("classify", input.path(), output.path(), |_doc| async {
        Err::<CanonicalDocument, _>(anyhow!("model endpoint unreachable"))
    })
    .await;

    assert!(res.is_err());
    assert_eq!(std::fs::read_dir(output.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn shrinking_stage_output_is_refused() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    seed(input.path()).await;

    let res = runner::run("classify", input.path(), output.path(), |mut doc| async move {
        doc.tickers.clear();
        Ok::<_, anyhow::Error>(doc)
    })
    .await;

    let err = res.unwrap_err();
    assert!(format!("{err:#}").contains("ticker MSFT removed"));
    assert!(!document_path(output.path()).exists());
}

#[tokio::test]
async fn misaligned_stage_output_is_refused() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    seed(input.path()).await;

    let res = runner::run("classify", input.path(), output.path(), |mut doc| async move {
        for set in doc.tickers.values_mut() {
            set.sentiments = Some(vec![SentimentLabel::Negative]);
        }
        Ok::<_, anyhow::Error>(doc)
    })
    .await;

    assert!(res.is_err());
    assert!(!document_path(output.path()).exists());
}

#[tokio::test]
async fn rerun_replaces_output_with_identical_bytes() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    seed(input.path()).await;

    let first = runner::run("classify", input.path(), output.path(), |d| async move {
        Ok::<_, anyhow::Error>(label_all(d))
    })
    .await
    .unwrap();
    let second = runner::run("classify", input.path(), output.path(), |d| async move {
        Ok::<_, anyhow::Error>(label_all(d))
    })
    .await
    .unwrap();

    assert_eq!(first.sha256, second.sha256);
    assert_eq!(first.articles, 2);
    // No temp file left behind.
    let names: Vec<_> = std::fs::read_dir(output.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(names, vec!["merged_stock_news.json".to_string()]);

    let back = read_document(output.path()).await.unwrap();
    assert_eq!(back, label_all(doc()));
}

#[tokio::test]
async fn unknown_fields_survive_a_stage() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let raw = r#"{"IBM":{"texts":["t"],"url":["u"],"name":["n"],"description":["d"],"datePublished":["p"],"provider":["Reuters"]}}"#;
    std::fs::write(document_path(input.path()), raw).unwrap();

    runner::run("classify", input.path(), output.path(), |d| async move {
        Ok::<_, anyhow::Error>(label_all(d))
    })
    .await
    .unwrap();

    let v: serde_json::Value =
        serde_json::from_slice(&std::fs::read(document_path(output.path())).unwrap()).unwrap();
    assert_eq!(v["IBM"]["provider"][0], "Reuters");
    assert_eq!(v["IBM"]["sentiments"][0], "positive");
}
