//! Conversational ordering agent.
//!
//! Each inbound chat message runs one turn: the transcript and tool schemas go
//! to the model, requested tools run in order against the catalog and order
//! stores, and a tool-free follow-up call produces the reply.
//!
//! # Key Types
//!
//! - `AgentRuntime` - per-turn state machine (see `runtime` module)
//! - `LlmClient` - chat-completion seam, `OpenAiCompatibleClient` for OpenAI/Ollama
//! - `ToolRegistry` - validated name-to-handler map with argument checking
//!
//! The model never decides prices or stock. Order totals and availability come
//! from the order store.

pub mod conversation;
pub mod llm;
pub mod order_tools;
pub mod runtime;
pub mod tools;

pub use llm::{ChatRequest, ChatResponse, LlmClient, LlmError, LlmErrorKind, OpenAiCompatibleClient};
pub use order_tools::order_tool_registry;
pub use runtime::{AgentRuntime, AgentSettings, TurnOutcome, TurnState};
pub use tools::{ToolContext, ToolError, ToolRegistry};
