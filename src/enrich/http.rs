// src/enrich/http.rs
//! Hosted inference backend (Hugging Face Inference API JSON shapes) and
//! the factories that pick a backend from configuration.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::sentiment::{ClassRef, ClassScore, ClassifierBackend, LabelMapping, SentimentModel};
use super::summary::{GenerationParams, GeneratorBackend, LeadBackend, SummaryModel};
use super::{ModelCallError, StaticModel, TextModel};
use crate::config::{InferenceConfig, PipelineConfig};
use crate::model::SentimentLabel;

pub type DynSentimentModel = Arc<dyn TextModel<SentimentLabel>>;
pub type DynSummaryModel = Arc<dyn TextModel<String>>;

const TEST_MODE_ENV: &str = "MODEL_TEST_MODE";

/// One model behind `POST {endpoint}/{model_id}`.
pub struct HostedModel {
    http: reqwest::Client,
    url: String,
    model_id: String,
    api_token: String,
    timeout: Duration,
}

impl HostedModel {
    pub fn new(cfg: &InferenceConfig, model_id: &str) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(cfg.timeout_secs.max(1));
        let http = reqwest::Client::builder()
            .user_agent(concat!("stock-news-digest/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            url: format!("{}/{}", cfg.endpoint.trim_end_matches('/'), model_id),
            model_id: model_id.to_string(),
            api_token: cfg.api_token.clone(),
            timeout,
        })
    }

    async fn post<T: Serialize + ?Sized>(&self, body: &T) -> Result<Value, ModelCallError> {
        let mut req = self.http.post(&self.url).json(body);
        if !self.api_token.is_empty() {
            req = req.bearer_auth(&self.api_token);
        }
        let resp = req.send().await.map_err(|e| self.call_error(e))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ModelCallError::Transport(format!(
                "HTTP {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }
        resp.json::<Value>().await.map_err(|e| {
            if e.is_timeout() {
                ModelCallError::Timeout(self.timeout)
            } else {
                ModelCallError::BadResponse(e.to_string())
            }
        })
    }

    fn call_error(&self, e: reqwest::Error) -> ModelCallError {
        if e.is_timeout() {
            ModelCallError::Timeout(self.timeout)
        } else {
            ModelCallError::Transport(e.to_string())
        }
    }
}

#[derive(Serialize)]
struct Options {
    wait_for_model: bool,
}

#[derive(Serialize)]
struct ClassifyReq<'a> {
    inputs: &'a str,
    options: Options,
}

#[derive(Serialize)]
struct GenerateReq<'a> {
    inputs: &'a str,
    parameters: &'a GenerationParams,
    options: Options,
}

#[derive(Deserialize)]
struct LabelScore {
    label: String,
    score: f32,
}

#[derive(Deserialize)]
struct Generated {
    #[serde(alias = "generated_text")]
    summary_text: String,
}

/// `LABEL_2` / `2` → index; `positive` → label.
fn parse_class(label: &str) -> Option<ClassRef> {
    let t = label.trim();
    let digits = t
        .strip_prefix("LABEL_")
        .or_else(|| t.strip_prefix("label_"))
        .unwrap_or(t);
    if let Ok(i) = digits.parse::<usize>() {
        return Some(ClassRef::Index(i));
    }
    t.parse::<SentimentLabel>().ok().map(ClassRef::Label)
}

/// Accepts `[[{label,score},..]]` and `[{label,score},..]`.
pub(crate) fn parse_classification(v: Value) -> Result<Vec<ClassScore>, ModelCallError> {
    let inner = match v {
        Value::Array(mut outer) if matches!(outer.first(), Some(Value::Array(_))) => {
            outer.swap_remove(0)
        }
        other => other,
    };
    let rows: Vec<LabelScore> =
        serde_json::from_value(inner).map_err(|e| ModelCallError::BadResponse(e.to_string()))?;
    rows.into_iter()
        .map(|r| {
            parse_class(&r.label)
                .map(|class| ClassScore {
                    class,
                    score: r.score,
                })
                .ok_or_else(|| ModelCallError::BadResponse(format!("unknown label {:?}", r.label)))
        })
        .collect()
}

pub(crate) fn parse_generation(v: Value) -> Result<String, ModelCallError> {
    let rows: Vec<Generated> =
        serde_json::from_value(v).map_err(|e| ModelCallError::BadResponse(e.to_string()))?;
    rows.into_iter()
        .next()
        .map(|g| g.summary_text)
        .ok_or_else(|| ModelCallError::BadResponse("empty generation".into()))
}

#[async_trait]
impl ClassifierBackend for HostedModel {
    fn name(&self) -> &str {
        &self.model_id
    }

    async fn classify(&self, text: &str) -> Result<Vec<ClassScore>, ModelCallError> {
        let body = ClassifyReq {
            inputs: text,
            options: Options {
                wait_for_model: true,
            },
        };
        parse_classification(self.post(&body).await?)
    }
}

#[async_trait]
impl GeneratorBackend for HostedModel {
    fn name(&self) -> &str {
        &self.model_id
    }

    async fn generate(
        &self,
        text: &str,
        params: &GenerationParams,
    ) -> Result<String, ModelCallError> {
        let body = GenerateReq {
            inputs: text,
            parameters: params,
            options: Options {
                wait_for_model: true,
            },
        };
        parse_generation(self.post(&body).await?)
    }
}

fn test_mode() -> bool {
    std::env::var(TEST_MODE_ENV)
        .map(|v| v == "mock")
        .unwrap_or(false)
}

/// * `MODEL_TEST_MODE=mock` → every article is `neutral`.
/// * otherwise the hosted classifier named in `sentiment.model`.
pub fn build_sentiment_model(cfg: &PipelineConfig) -> anyhow::Result<DynSentimentModel> {
    if test_mode() {
        tracing::warn!("MODEL_TEST_MODE=mock: sentiment model replaced by a constant");
        return Ok(Arc::new(
            StaticModel::new("mock-sentiment").with_default(SentimentLabel::Neutral),
        ));
    }
    let mapping = LabelMapping::new(cfg.sentiment.labels.clone())?;
    let backend = HostedModel::new(&cfg.inference, &cfg.sentiment.model)?;
    Ok(Arc::new(SentimentModel::new(backend, mapping)))
}

/// * `MODEL_TEST_MODE=mock` → lead-words baseline.
/// * otherwise the hosted generator named in `summary.model`.
pub fn build_summary_model(cfg: &PipelineConfig) -> anyhow::Result<DynSummaryModel> {
    let params = GenerationParams::from_config(&cfg.summary);
    if test_mode() {
        tracing::warn!("MODEL_TEST_MODE=mock: summaries use the lead-words baseline");
        return Ok(Arc::new(SummaryModel::new(LeadBackend, params)));
    }
    let backend = HostedModel::new(&cfg.inference, &cfg.summary.model)?;
    Ok(Arc::new(SummaryModel::new(backend, params)))
}
