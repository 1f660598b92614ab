use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use orderdesk_core::channel::{InboundEvent, InboundKind, OutboundChannel};
use orderdesk_core::config::AppConfig;
use orderdesk_core::domain::conversation::{ConversationId, Message};
use orderdesk_core::errors::ApplicationError;
use orderdesk_db::{ConversationRepository, RepositoryError};

use crate::conversation::{Transcript, DEFAULT_SYSTEM_PROMPT};
use crate::llm::{ChatRequest, ChatResponse, LlmClient, LlmError};
use crate::tools::{ToolContext, ToolRegistry};

pub const PROCESSING_NOTICE: &str = "Estou processando sua solicitação...";
pub const TOOLS_NOTICE: &str = "Estou buscando informações para você...";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentSettings {
    pub model_timeout: Duration,
    pub tool_timeout: Duration,
    pub progress_notices: bool,
    pub apology_message: String,
    pub system_prompt: String,
}

impl AgentSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model_timeout: Duration::from_secs(config.llm.timeout_secs),
            tool_timeout: Duration::from_secs(config.agent.tool_timeout_secs),
            progress_notices: config.agent.progress_notices,
            apology_message: config.agent.apology_message.clone(),
            system_prompt: config
                .agent
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnState {
    AwaitingModel,
    ExecutingTools,
    AwaitingFinal,
    Done,
    Failed,
}

impl TurnState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingModel => "awaiting_model",
            Self::ExecutingTools => "executing_tools",
            Self::AwaitingFinal => "awaiting_final",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TurnOutcome {
    pub correlation_id: String,
    pub state: TurnState,
    pub visited: Vec<TurnState>,
    /// Text sent to the customer: the model reply, or the apology on failure.
    pub reply: Option<String>,
    pub tools_executed: Vec<String>,
    pub failure: Option<ApplicationError>,
}

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("conversation store failed: {0}")]
    Persistence(#[from] RepositoryError),
    #[error(transparent)]
    Model(#[from] LlmError),
    #[error("model call timed out after {0:?}")]
    ModelTimeout(Duration),
    #[error("tool `{tool}` timed out after {timeout:?}")]
    ToolTimeout { tool: String, timeout: Duration },
    #[error("model returned an empty reply")]
    EmptyReply,
}

impl TurnError {
    /// Whether the same turn could succeed if the customer simply tried again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Model(error) => error.is_retryable(),
            Self::ModelTimeout(_) | Self::EmptyReply => true,
            Self::Persistence(_) | Self::ToolTimeout { .. } => false,
        }
    }
}

impl From<TurnError> for ApplicationError {
    fn from(error: TurnError) -> Self {
        match error {
            TurnError::Persistence(error) => error.into(),
            other => ApplicationError::ExternalService(other.to_string()),
        }
    }
}

/// Serializes turns per sender. Entries nobody holds or waits on are pruned
/// after each turn.
#[derive(Default)]
pub struct SenderLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SenderLocks {
    pub async fn acquire(&self, sender_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(sender_id.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    pub async fn prune_idle(&self) {
        self.locks.lock().await.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.locks.lock().await.is_empty()
    }
}

struct TurnTrace {
    correlation_id: String,
    visited: Vec<TurnState>,
    tools_executed: Vec<String>,
}

impl TurnTrace {
    fn enter(&mut self, state: TurnState) {
        debug!(
            event_name = "agent.turn.state",
            correlation_id = %self.correlation_id,
            state = state.as_str(),
            "turn state changed"
        );
        self.visited.push(state);
    }
}

/// Runs the model/tool loop for inbound chat messages.
pub struct AgentRuntime {
    llm: Arc<dyn LlmClient>,
    tools: Arc<ToolRegistry>,
    conversations: Arc<dyn ConversationRepository>,
    outbound: Arc<dyn OutboundChannel>,
    settings: AgentSettings,
    locks: SenderLocks,
}

impl AgentRuntime {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        tools: Arc<ToolRegistry>,
        conversations: Arc<dyn ConversationRepository>,
        outbound: Arc<dyn OutboundChannel>,
        settings: AgentSettings,
    ) -> Self {
        Self { llm, tools, conversations, outbound, settings, locks: SenderLocks::default() }
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn sender_locks(&self) -> &SenderLocks {
        &self.locks
    }

    /// Returns `None` for events that carry no text.
    pub async fn handle_inbound(&self, event: &InboundEvent) -> Option<TurnOutcome> {
        match &event.kind {
            InboundKind::Text { text } => {
                Some(self.run_turn(&event.sender_id, &event.message_id, text).await)
            }
            InboundKind::Unsupported { kind } => {
                info!(
                    event_name = "agent.turn.ignored",
                    sender_id = %event.sender_id,
                    message_id = %event.message_id,
                    kind = %kind,
                    "ignoring unsupported inbound message"
                );
                None
            }
        }
    }

    pub async fn run_turn(&self, sender_id: &str, message_id: &str, text: &str) -> TurnOutcome {
        let guard = self.locks.acquire(sender_id).await;

        let mut trace = TurnTrace {
            correlation_id: uuid::Uuid::new_v4().to_string(),
            visited: Vec::new(),
            tools_executed: Vec::new(),
        };
        info!(
            event_name = "agent.turn.started",
            correlation_id = %trace.correlation_id,
            sender_id = %sender_id,
            message_id = %message_id,
            "processing inbound message"
        );

        if let Err(error) = self.outbound.mark_consumed(message_id).await {
            warn!(
                event_name = "agent.outbound.failed",
                correlation_id = %trace.correlation_id,
                sender_id = %sender_id,
                error = %error,
                "failed to mark inbound message as read"
            );
        }

        let outcome = match self.drive(sender_id, text, &mut trace).await {
            Ok(reply) => {
                trace.enter(TurnState::Done);
                self.notify(sender_id, &reply, &trace.correlation_id).await;
                info!(
                    event_name = "agent.turn.completed",
                    correlation_id = %trace.correlation_id,
                    sender_id = %sender_id,
                    tools = trace.tools_executed.len(),
                    "turn completed"
                );
                self.outcome(trace, TurnState::Done, Some(reply), None)
            }
            Err(error) => {
                trace.enter(TurnState::Failed);
                warn!(
                    event_name = "agent.turn.failed",
                    correlation_id = %trace.correlation_id,
                    sender_id = %sender_id,
                    error = %error,
                    retryable = error.is_retryable(),
                    "turn failed; sending apology"
                );
                let apology = self.settings.apology_message.clone();
                self.notify(sender_id, &apology, &trace.correlation_id).await;
                self.outcome(trace, TurnState::Failed, Some(apology), Some(error.into()))
            }
        };

        drop(guard);
        self.locks.prune_idle().await;
        outcome
    }

    async fn drive(
        &self,
        sender_id: &str,
        text: &str,
        trace: &mut TurnTrace,
    ) -> Result<String, TurnError> {
        let conversation =
            self.conversations.get_or_create(sender_id, &self.settings.system_prompt).await?;
        let user_message = self.conversations.append(&conversation.id, Message::user(text)).await?;

        let mut transcript = Transcript::from_conversation(&conversation);
        transcript.push_message(user_message);

        if self.settings.progress_notices {
            self.notify(sender_id, PROCESSING_NOTICE, &trace.correlation_id).await;
        }

        trace.enter(TurnState::AwaitingModel);
        let first = self.call_model(&transcript, true).await?;
        if first.tool_calls.is_empty() {
            return self.persist_reply(&conversation.id, first.text).await;
        }

        trace.enter(TurnState::ExecutingTools);
        if self.settings.progress_notices {
            self.notify(sender_id, TOOLS_NOTICE, &trace.correlation_id).await;
        }

        let ctx = ToolContext {
            sender_id: sender_id.to_string(),
            correlation_id: trace.correlation_id.clone(),
        };
        for call in first.tool_calls {
            let dispatched = tokio::time::timeout(
                self.settings.tool_timeout,
                self.tools.dispatch(&ctx, &call.name, call.arguments),
            )
            .await
            .map_err(|_| TurnError::ToolTimeout {
                tool: call.name.clone(),
                timeout: self.settings.tool_timeout,
            })?;
            trace.tools_executed.push(call.name.clone());

            let payload = match dispatched {
                Ok(payload) => {
                    info!(
                        event_name = "agent.tool.executed",
                        correlation_id = %trace.correlation_id,
                        tool = %call.name,
                        "tool executed"
                    );
                    payload
                }
                Err(error) => {
                    warn!(
                        event_name = "agent.tool.failed",
                        correlation_id = %trace.correlation_id,
                        tool = %call.name,
                        error = %error,
                        "tool failed; reporting error to the model"
                    );
                    json!({
                        "error": format!("{}: Erro ao executar a ferramenta", call.name),
                        "tool": call.name,
                    })
                }
            };
            transcript.push_tool_output(call.name, payload);
        }

        trace.enter(TurnState::AwaitingFinal);
        let last = self.call_model(&transcript, false).await?;
        self.persist_reply(&conversation.id, last.text).await
    }

    async fn call_model(
        &self,
        transcript: &Transcript,
        offer_tools: bool,
    ) -> Result<ChatResponse, TurnError> {
        let request = ChatRequest {
            messages: transcript.to_messages(),
            tools: if offer_tools { self.tools.schemas() } else { Vec::new() },
        };

        let response = tokio::time::timeout(self.settings.model_timeout, self.llm.complete(&request))
            .await
            .map_err(|_| TurnError::ModelTimeout(self.settings.model_timeout))??;
        Ok(response)
    }

    async fn persist_reply(
        &self,
        conversation_id: &ConversationId,
        reply: String,
    ) -> Result<String, TurnError> {
        if reply.trim().is_empty() {
            return Err(TurnError::EmptyReply);
        }
        let stored = self.conversations.append(conversation_id, Message::assistant(reply)).await?;
        Ok(stored.content)
    }

    async fn notify(&self, recipient: &str, text: &str, correlation_id: &str) {
        if let Err(error) = self.outbound.send_text(recipient, text).await {
            warn!(
                event_name = "agent.outbound.failed",
                correlation_id = %correlation_id,
                sender_id = %recipient,
                error = %error,
                "failed to deliver outbound message"
            );
        }
    }

    fn outcome(
        &self,
        trace: TurnTrace,
        state: TurnState,
        reply: Option<String>,
        failure: Option<ApplicationError>,
    ) -> TurnOutcome {
        TurnOutcome {
            correlation_id: trace.correlation_id,
            state,
            visited: trace.visited,
            reply,
            tools_executed: trace.tools_executed,
            failure,
        }
    }
}
