use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use orderdesk_core::channel::{InboundEvent, InboundKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InboundEventType {
    Text,
    Unsupported,
}

impl InboundEventType {
    pub fn of(event: &InboundEvent) -> Self {
        match event.kind {
            InboundKind::Text { .. } => Self::Text,
            InboundKind::Unsupported { .. } => Self::Unsupported,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error("text message handler failure: {0}")]
    TextMessage(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> InboundEventType;
    async fn handle(
        &self,
        event: &InboundEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<InboundEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        event: &InboundEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&InboundEventType::of(event)) else {
            info!(
                event_name = "ingress.whatsapp.ignored",
                correlation_id = %ctx.correlation_id,
                sender_id = %event.sender_id,
                message_id = %event.message_id,
                kind = ?event.kind,
                "no handler for inbound event"
            );
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(event, ctx).await.map_err(DispatchError::from)
    }

    /// Runs every event on its own task so one slow sender never delays
    /// another. Failures are logged by the task.
    pub fn spawn_all(
        self: &Arc<Self>,
        events: Vec<InboundEvent>,
        ctx: &EventContext,
    ) -> Vec<JoinHandle<Result<HandlerResult, DispatchError>>> {
        events
            .into_iter()
            .map(|event| {
                let dispatcher = Arc::clone(self);
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    let result = dispatcher.dispatch(&event, &ctx).await;
                    if let Err(error) = &result {
                        warn!(
                            event_name = "ingress.whatsapp.dispatch_failed",
                            correlation_id = %ctx.correlation_id,
                            sender_id = %event.sender_id,
                            message_id = %event.message_id,
                            error = %error,
                            "inbound event dispatch failed"
                        );
                    }
                    result
                })
            })
            .collect()
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

#[async_trait]
pub trait TextMessageService: Send + Sync {
    async fn handle_text(
        &self,
        event: &InboundEvent,
        ctx: &EventContext,
    ) -> Result<(), EventHandlerError>;
}

pub struct TextMessageHandler<S> {
    service: S,
}

impl<S> TextMessageHandler<S>
where
    S: TextMessageService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for TextMessageHandler<S>
where
    S: TextMessageService + 'static,
{
    fn event_type(&self) -> InboundEventType {
        InboundEventType::Text
    }

    async fn handle(
        &self,
        event: &InboundEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        if event.text_body().is_none() {
            return Ok(HandlerResult::Ignored);
        }

        self.service.handle_text(event, ctx).await?;
        Ok(HandlerResult::Processed)
    }
}
