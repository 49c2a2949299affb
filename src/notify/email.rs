// src/notify/email.rs
use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::response::Response;
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{Address, AsyncTransport, Tokio1Executor};

use super::{DeliveryAdapter, DeliveryReceipt, DigestMessage};
use crate::config::DeliveryConfig;
use crate::error::{PipelineError, Result};

pub struct EmailDelivery {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailDelivery {
    pub fn new(cfg: &DeliveryConfig) -> Result<Self> {
        if cfg.smtp_host.trim().is_empty() {
            return Err(PipelineError::Config("delivery.smtp_host is empty".into()));
        }
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.smtp_host)
            .map_err(|e| PipelineError::Config(format!("invalid smtp host: {e}")))?;
        if let Some(port) = cfg.smtp_port {
            builder = builder.port(port);
        }
        if !cfg.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                cfg.username.clone(),
                cfg.password.clone(),
            ));
        }
        let mailer = builder.build();

        let from = parse_mailbox(&cfg.sender, None)?;
        let to = parse_mailbox(&cfg.recipient, Some(&cfg.recipient_name))?;

        Ok(Self { mailer, from, to })
    }
}

fn parse_mailbox(addr: &str, name: Option<&str>) -> Result<Mailbox> {
    let address: Address = addr
        .trim()
        .parse()
        .map_err(|e| PipelineError::Config(format!("invalid address {addr:?}: {e}")))?;
    let name = name.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string);
    Ok(Mailbox::new(name, address))
}

/// Server reply lines joined into one line.
fn reply_detail(resp: &Response) -> String {
    resp.message().collect::<Vec<_>>().join(" ")
}

#[async_trait]
impl DeliveryAdapter for EmailDelivery {
    async fn send(&self, msg: &DigestMessage) -> Result<DeliveryReceipt> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(msg.subject.clone())
            .header(header::ContentType::TEXT_PLAIN)
            .body(msg.body.clone())
            .map_err(|e| PipelineError::Delivery(format!("build email: {e}")))?;

        let resp = self
            .mailer
            .send(email)
            .await
            .map_err(|e| PipelineError::Delivery(format!("send email: {e}")))?;

        let detail = reply_detail(&resp);
        if !resp.is_positive() {
            return Err(PipelineError::Delivery(format!(
                "smtp rejected digest: {} {detail}",
                resp.code()
            )));
        }
        tracing::info!(to = %self.to, code = %resp.code(), "digest mailed");
        Ok(DeliveryReceipt {
            channel: "email",
            accepted: true,
            detail,
        })
    }

    fn name(&self) -> &'static str {
        "email"
    }
}
