//! Outbound message relay.
//!
//! The engine's [`MessageSender`] capability, implemented over a simple HTTP relay: one POST per message, the
//! relay handles templating-free plain-text delivery. Failures are reported back to the dispatcher, which logs
//! them and leaves the corresponding notification flag unset; nothing is retried here.

use std::sync::Arc;

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
};
use serde_json::json;
use storefront_payment_engine::notifications::{MessageSender, NotificationError, OutboundMessage};
use thiserror::Error;

use crate::config::MailerConfig;

#[derive(Debug, Error)]
pub enum MailerError {
    #[error("Could not initialize mail relay client: {0}")]
    Initialization(String),
}

#[derive(Clone)]
pub struct RelayMailer {
    config: MailerConfig,
    client: Arc<Client>,
}

impl RelayMailer {
    pub fn new(config: MailerConfig) -> Result<Self, MailerError> {
        let mut headers = HeaderMap::with_capacity(2);
        let val = HeaderValue::from_str(&format!("Bearer {}", config.api_key.reveal()))
            .map_err(|e| MailerError::Initialization(e.to_string()))?;
        headers.insert("Authorization", val);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| MailerError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }
}

impl MessageSender for RelayMailer {
    async fn send(&self, message: OutboundMessage) -> Result<(), NotificationError> {
        if !self.config.enabled {
            info!("📧️ Mail relay is disabled. Message to {} ('{}') dropped.", message.to, message.subject);
            return Ok(());
        }
        let body = json!({
            "from": self.config.sender,
            "to": message.to,
            "subject": message.subject,
            "text": message.body,
        });
        let response = self
            .client
            .post(&self.config.relay_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| NotificationError::DeliveryFailed { recipient: message.to.clone(), reason: e.to_string() })?;
        if response.status().is_success() {
            trace!("📧️ Relay accepted message to {}", message.to);
            Ok(())
        } else {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            Err(NotificationError::Rejected(format!("relay answered {status}: {detail}")))
        }
    }
}
