// src/config.rs
//! Static pipeline configuration.
//!
//! Lookup: explicit path → `$PIPELINE_CONFIG_PATH` → `config/pipeline.toml`
//! → built-in defaults. TOML and JSON are both accepted (by extension).
//! Secret fields set to `"ENV"` are resolved from the environment once, here,
//! and then handed to adapters explicitly.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::aggregate::MergePolicy;
use crate::error::PipelineError;
use crate::model::SentimentLabel;

pub const ENV_CONFIG_PATH: &str = "PIPELINE_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/pipeline.toml";

const ENV_INFERENCE_TOKEN: &str = "HF_API_TOKEN";
const ENV_SMTP_PASSWORD: &str = "SMTP_PASSWORD";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerConfig {
    pub symbol: String,
    pub display_name: String,
}

impl TickerConfig {
    fn new(symbol: &str, display_name: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            display_name: display_name.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SentimentConfig {
    pub model: String,
    /// Class index → label, in the model's own output order.
    pub labels: Vec<SentimentLabel>,
}

impl Default for SentimentConfig {
    fn default() -> Self {
        Self {
            model: "KernAI/stock-news-destilbert".into(),
            labels: vec![
                SentimentLabel::Neutral,
                SentimentLabel::Negative,
                SentimentLabel::Positive,
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    pub model: String,
    /// Upper bound on generated tokens.
    pub max_length: u32,
    pub num_beams: u32,
    pub early_stopping: bool,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            model: "human-centered-summarization/financial-summarization-pegasus".into(),
            max_length: 32,
            num_beams: 5,
            early_stopping: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub endpoint: String,
    /// Bearer token; `"ENV"` reads `HF_API_TOKEN`, empty sends none.
    pub api_token: String,
    pub timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api-inference.huggingface.co/models".into(),
            api_token: "ENV".into(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichConfig {
    /// Concurrent model calls per stage.
    pub concurrency: usize,
    pub max_retries: u32,
    pub retry_base_ms: u64,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_retries: 3,
            retry_base_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateConfig {
    pub merge_policy: MergePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestConfig {
    /// Entries containing this marker are left out of the digest text.
    pub boilerplate_marker: String,
    pub include_urls: bool,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            boilerplate_marker: "All photographs subject to copyright.".into(),
            include_urls: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub root: PathBuf,
    pub raw_container: String,
    pub processed_container: String,
    pub processed_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data"),
            raw_container: "stock-news-json".into(),
            processed_container: "processed-stock-news-json".into(),
            processed_prefix: "processed-stock-news".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: Option<u16>,
    pub username: String,
    /// `"ENV"` reads `SMTP_PASSWORD`.
    pub password: String,
    pub sender: String,
    pub recipient: String,
    pub recipient_name: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: String::new(),
            smtp_port: None,
            username: String::new(),
            password: "ENV".into(),
            sender: "noreply@example.com".into(),
            recipient: "digest@example.com".into(),
            recipient_name: "Reader".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub tickers: Vec<TickerConfig>,
    /// Tickers that get a digest section; empty means all of `tickers`.
    pub digest_tickers: Vec<String>,
    pub sentiment: SentimentConfig,
    pub summary: SummaryConfig,
    pub inference: InferenceConfig,
    pub enrich: EnrichConfig,
    pub aggregate: AggregateConfig,
    pub digest: DigestConfig,
    pub storage: StorageConfig,
    pub delivery: DeliveryConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tickers: vec![
                TickerConfig::new("MSFT", "Microsoft"),
                TickerConfig::new("AAPL", "Apple"),
                TickerConfig::new("AVGO", "Broadcom"),
                TickerConfig::new("IBM", "IBM"),
                TickerConfig::new("TXN", "Texas Instruments"),
                TickerConfig::new("DOCN", "DigitalOcean"),
            ],
            digest_tickers: Vec::new(),
            sentiment: SentimentConfig::default(),
            summary: SummaryConfig::default(),
            inference: InferenceConfig::default(),
            enrich: EnrichConfig::default(),
            aggregate: AggregateConfig::default(),
            digest: DigestConfig::default(),
            storage: StorageConfig::default(),
            delivery: DeliveryConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn ticker_symbols(&self) -> Vec<String> {
        self.tickers.iter().map(|t| t.symbol.clone()).collect()
    }

    pub fn display_name<'a>(&'a self, symbol: &'a str) -> &'a str {
        self.tickers
            .iter()
            .find(|t| t.symbol == symbol)
            .map(|t| t.display_name.as_str())
            .unwrap_or(symbol)
    }

    pub fn digest_tickers(&self) -> Vec<String> {
        if self.digest_tickers.is_empty() {
            self.ticker_symbols()
        } else {
            self.digest_tickers.clone()
        }
    }

    pub fn validate(&self) -> std::result::Result<(), PipelineError> {
        if self.tickers.is_empty() {
            return Err(PipelineError::Config("ticker list is empty".into()));
        }
        let mut seen = HashSet::new();
        for t in &self.tickers {
            if t.symbol.trim().is_empty() {
                return Err(PipelineError::Config("empty ticker symbol".into()));
            }
            if !seen.insert(t.symbol.as_str()) {
                return Err(PipelineError::Config(format!(
                    "ticker {} listed twice",
                    t.symbol
                )));
            }
        }
        for t in &self.digest_tickers {
            if !seen.contains(t.as_str()) {
                // Still allowed: the composer reports it as an unknown ticker.
                tracing::warn!(ticker = %t, "digest ticker is not in the ticker universe");
            }
        }
        let labels: HashSet<_> = self.sentiment.labels.iter().collect();
        if self.sentiment.labels.len() != SentimentLabel::ALL.len()
            || labels.len() != SentimentLabel::ALL.len()
        {
            return Err(PipelineError::Config(
                "sentiment.labels must list positive, neutral and negative exactly once".into(),
            ));
        }
        if self.enrich.concurrency == 0 {
            return Err(PipelineError::Config("enrich.concurrency must be >= 1".into()));
        }
        if self.summary.max_length == 0 {
            return Err(PipelineError::Config("summary.max_length must be >= 1".into()));
        }
        Ok(())
    }

    /// Replace `"ENV"` placeholders with environment values.
    fn resolve_secrets(&mut self) -> Result<()> {
        if is_env_placeholder(&self.inference.api_token) {
            // A missing token is fine for self-hosted endpoints.
            self.inference.api_token = std::env::var(ENV_INFERENCE_TOKEN).unwrap_or_default();
        }
        if is_env_placeholder(&self.delivery.password) {
            self.delivery.password = if self.delivery.enabled {
                std::env::var(ENV_SMTP_PASSWORD)
                    .map_err(|_| anyhow!("Missing {ENV_SMTP_PASSWORD} env var"))?
            } else {
                String::new()
            };
        }
        Ok(())
    }
}

fn is_env_placeholder(v: &str) -> bool {
    v.trim().eq_ignore_ascii_case("env")
}

/// Load configuration from an explicit path. Supports TOML or JSON formats.
pub fn load_from(path: &Path) -> Result<PipelineConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading pipeline config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let mut cfg = parse_config(&content, &ext)
        .with_context(|| format!("parsing pipeline config {}", path.display()))?;
    cfg.resolve_secrets()?;
    cfg.validate()?;
    Ok(cfg)
}

/// Resolve the config location:
/// 1) `explicit` (the `--config` flag)
/// 2) $PIPELINE_CONFIG_PATH
/// 3) config/pipeline.toml
/// 4) built-in defaults
pub fn load(explicit: Option<&Path>) -> Result<PipelineConfig> {
    if let Some(p) = explicit {
        return load_from(p);
    }
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_from(&pb);
        } else {
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
    }
    let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
    if default_p.exists() {
        return load_from(&default_p);
    }
    let mut cfg = PipelineConfig::default();
    cfg.resolve_secrets()?;
    Ok(cfg)
}

fn parse_config(s: &str, hint_ext: &str) -> Result<PipelineConfig> {
    if hint_ext == "json" {
        return Ok(serde_json::from_str(s)?);
    }
    match toml::from_str(s) {
        Ok(cfg) => Ok(cfg),
        Err(toml_err) => serde_json::from_str(s)
            .map_err(|_| anyhow!("unsupported config format: {toml_err}")),
    }
}
