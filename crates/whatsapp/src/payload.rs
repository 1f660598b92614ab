use serde::Deserialize;
use thiserror::Error;

use orderdesk_core::channel::{InboundEvent, InboundKind};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WebhookError {
    #[error("malformed webhook payload: {0}")]
    Malformed(String),
    #[error("webhook signature header is missing")]
    MissingSignature,
    #[error("webhook signature does not match payload")]
    InvalidSignature,
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    object: String,
    #[serde(default)]
    entry: Vec<WebhookEntry>,
}

#[derive(Debug, Deserialize)]
struct WebhookEntry {
    #[serde(default)]
    changes: Vec<WebhookChange>,
}

#[derive(Debug, Deserialize)]
struct WebhookChange {
    value: ChangeValue,
}

#[derive(Debug, Deserialize)]
struct ChangeValue {
    #[serde(default)]
    messages: Vec<WebhookMessage>,
}

#[derive(Debug, Deserialize)]
struct WebhookMessage {
    from: String,
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<TextBody>,
}

#[derive(Debug, Deserialize)]
struct TextBody {
    body: String,
}

/// Flattens `entry[].changes[].value.messages[]` into inbound events, in
/// payload order. Status callbacks carry no messages and yield nothing.
pub fn parse_webhook(body: &[u8]) -> Result<Vec<InboundEvent>, WebhookError> {
    let payload: WebhookPayload =
        serde_json::from_slice(body).map_err(|error| WebhookError::Malformed(error.to_string()))?;
    if payload.object.is_empty() {
        return Err(WebhookError::Malformed("`object` must not be empty".to_string()));
    }

    let mut events = Vec::new();
    for message in payload
        .entry
        .into_iter()
        .flat_map(|entry| entry.changes)
        .flat_map(|change| change.value.messages)
    {
        let kind = match (message.kind.as_str(), message.text) {
            ("text", Some(text)) => InboundKind::Text { text: text.body },
            ("text", None) => {
                return Err(WebhookError::Malformed(format!(
                    "text message `{}` has no body",
                    message.id
                )))
            }
            (other, _) => InboundKind::Unsupported { kind: other.to_string() },
        };
        events.push(InboundEvent { sender_id: message.from, message_id: message.id, kind });
    }

    Ok(events)
}
