use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One inbound chat message, already stripped of transport framing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub sender_id: String,
    pub message_id: String,
    pub kind: InboundKind,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundKind {
    Text { text: String },
    Unsupported { kind: String },
}

impl InboundEvent {
    pub fn text(
        sender_id: impl Into<String>,
        message_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            message_id: message_id.into(),
            kind: InboundKind::Text { text: text.into() },
        }
    }

    pub fn text_body(&self) -> Option<&str> {
        match &self.kind {
            InboundKind::Text { text } => Some(text),
            InboundKind::Unsupported { .. } => None,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("channel transport failed: {0}")]
    Transport(String),
    #[error("channel rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Delivery side of a chat channel.
#[async_trait]
pub trait OutboundChannel: Send + Sync {
    async fn send_text(&self, recipient: &str, text: &str) -> Result<(), ChannelError>;

    async fn mark_consumed(&self, message_id: &str) -> Result<(), ChannelError>;
}
