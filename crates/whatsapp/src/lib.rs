//! WhatsApp Cloud API integration.
//!
//! - **Payload** (`payload`) - webhook body parsing into `InboundEvent`s
//! - **Signature** (`signature`) - `X-Hub-Signature-256` check and the verify handshake
//! - **Client** (`client`) - Graph API sender implementing `OutboundChannel`
//! - **Events** (`events`) - routes inbound events to handlers, one task per event
//!
//! # Architecture
//!
//! ```text
//! Webhook POST → signature → payload → EventDispatcher → Agent Runtime
//!                                                           ↓
//!                                    WhatsAppClient ← reply text
//! ```

pub mod client;
pub mod events;
pub mod payload;
pub mod signature;

pub use client::{NoopOutboundChannel, WhatsAppClient};
pub use events::{
    DispatchError, EventContext, EventDispatcher, EventHandler, EventHandlerError, HandlerResult,
    InboundEventType, TextMessageHandler, TextMessageService,
};
pub use payload::{parse_webhook, WebhookError};
pub use signature::{verify_handshake, verify_signature, SIGNATURE_HEADER};
