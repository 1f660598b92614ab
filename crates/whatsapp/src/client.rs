use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::{debug, warn};

use orderdesk_core::channel::{ChannelError, OutboundChannel};
use orderdesk_core::config::WhatsAppConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Graph API sender for one business phone number.
pub struct WhatsAppClient {
    http: reqwest::Client,
    messages_url: String,
    access_token: SecretString,
}

impl WhatsAppClient {
    pub fn new(
        api_base_url: &str,
        phone_number_id: &str,
        access_token: SecretString,
    ) -> Result<Self, ChannelError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| ChannelError::Transport(error.to_string()))?;

        Ok(Self {
            http,
            messages_url: format!("{}/{phone_number_id}/messages", api_base_url.trim_end_matches('/')),
            access_token,
        })
    }

    pub fn from_config(config: &WhatsAppConfig) -> Result<Self, ChannelError> {
        Self::new(&config.api_base_url, &config.phone_number_id, config.access_token.clone())
    }

    pub fn messages_url(&self) -> &str {
        &self.messages_url
    }

    async fn post(&self, payload: Value) -> Result<(), ChannelError> {
        let response = self
            .http
            .post(&self.messages_url)
            .bearer_auth(self.access_token.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|error| ChannelError::Transport(error.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        warn!(
            event_name = "egress.whatsapp.rejected",
            status = status.as_u16(),
            body = %body,
            "whatsapp api rejected request"
        );
        Err(ChannelError::Rejected { status: status.as_u16(), body })
    }
}

pub(crate) fn text_payload(recipient: &str, text: &str) -> Value {
    json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": recipient,
        "type": "text",
        "text": {"body": text},
    })
}

pub(crate) fn read_receipt_payload(message_id: &str) -> Value {
    json!({
        "messaging_product": "whatsapp",
        "status": "read",
        "message_id": message_id,
    })
}

#[async_trait]
impl OutboundChannel for WhatsAppClient {
    async fn send_text(&self, recipient: &str, text: &str) -> Result<(), ChannelError> {
        debug!(event_name = "egress.whatsapp.send_text", recipient = %recipient, "sending text message");
        self.post(text_payload(recipient, text)).await
    }

    async fn mark_consumed(&self, message_id: &str) -> Result<(), ChannelError> {
        debug!(event_name = "egress.whatsapp.mark_read", message_id = %message_id, "marking message read");
        self.post(read_receipt_payload(message_id)).await
    }
}

/// Logs outbound traffic instead of sending it. Used when no access token is
/// available, for local runs.
#[derive(Default)]
pub struct NoopOutboundChannel;

#[async_trait]
impl OutboundChannel for NoopOutboundChannel {
    async fn send_text(&self, recipient: &str, text: &str) -> Result<(), ChannelError> {
        debug!(event_name = "egress.noop.send_text", recipient = %recipient, text = %text, "dropping outbound text");
        Ok(())
    }

    async fn mark_consumed(&self, message_id: &str) -> Result<(), ChannelError> {
        debug!(event_name = "egress.noop.mark_read", message_id = %message_id, "dropping read receipt");
        Ok(())
    }
}
