// src/notify/mod.rs
//! Digest delivery. Adapters are built from `DeliveryConfig`; nothing here
//! reads credentials from process state.

pub mod email;

use std::sync::Mutex;

use async_trait::async_trait;

use crate::config::DeliveryConfig;
use crate::error::{PipelineError, Result};

pub use email::EmailDelivery;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestMessage {
    pub subject: String,
    pub body: String,
}

/// Outcome reported by the delivery service once the send completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub channel: &'static str,
    pub accepted: bool,
    pub detail: String,
}

#[async_trait]
pub trait DeliveryAdapter: Send + Sync {
    async fn send(&self, msg: &DigestMessage) -> Result<DeliveryReceipt>;
    fn name(&self) -> &'static str;
}

/// Used when delivery is disabled: the digest only goes to the log.
pub struct LogDelivery;

#[async_trait]
impl DeliveryAdapter for LogDelivery {
    async fn send(&self, msg: &DigestMessage) -> Result<DeliveryReceipt> {
        tracing::info!(subject = %msg.subject, bytes = msg.body.len(), "delivery disabled, digest logged only");
        tracing::debug!(body = %msg.body, "digest body");
        Ok(DeliveryReceipt {
            channel: "log",
            accepted: true,
            detail: "logged".into(),
        })
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Records every message; can be told to fail.
#[derive(Default)]
pub struct MockDelivery {
    pub sent: Mutex<Vec<DigestMessage>>,
    fail_with: Option<String>,
}

impl MockDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_with: Some(reason.into()),
        }
    }
}

#[async_trait]
impl DeliveryAdapter for MockDelivery {
    async fn send(&self, msg: &DigestMessage) -> Result<DeliveryReceipt> {
        if let Some(reason) = &self.fail_with {
            return Err(PipelineError::Delivery(reason.clone()));
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(msg.clone());
        Ok(DeliveryReceipt {
            channel: "mock",
            accepted: true,
            detail: "recorded".into(),
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// SMTP when enabled, log-only otherwise.
pub fn build_delivery(cfg: &DeliveryConfig) -> Result<Box<dyn DeliveryAdapter>> {
    if !cfg.enabled {
        return Ok(Box::new(LogDelivery));
    }
    Ok(Box::new(EmailDelivery::new(cfg)?))
}
