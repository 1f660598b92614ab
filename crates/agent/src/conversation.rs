//! Working transcript for one turn.
//!
//! Tool results are kept as tagged entries while the turn runs and are only
//! flattened to `"<tool>: <json>"` assistant messages when the transcript is
//! handed to the model. They are never persisted.

use serde_json::Value;

use orderdesk_core::domain::conversation::{Conversation, Message};

/// Sales-assistant persona used when `agent.system_prompt` is not configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "Você é um assistente de vendas que ajuda os clientes a fazer pedidos pelo WhatsApp. \
Use as ferramentas disponíveis para pesquisar produtos, extrair menções a produtos do texto do cliente, \
verificar disponibilidade e criar pedidos. Seja cordial, direto e eficiente. Não mencione que você é uma IA. \
Tente entender o que o cliente deseja comprar, em quais quantidades, e ajude a finalizar o pedido. \
Sempre verifique a disponibilidade antes de criar o pedido e informe se algum produto não está disponível na quantidade solicitada.\n\n\
Após criar um pedido com sucesso, forneça um resumo com os itens, quantidades, preços e total.";

#[derive(Clone, Debug, PartialEq)]
pub enum TranscriptEntry {
    Message(Message),
    ToolOutput { tool: String, payload: Value },
}

impl TranscriptEntry {
    fn to_message(&self) -> Message {
        match self {
            Self::Message(message) => message.clone(),
            Self::ToolOutput { tool, payload } => Message::assistant(format!("{tool}: {payload}")),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn from_conversation(conversation: &Conversation) -> Self {
        Self { entries: conversation.messages.iter().cloned().map(TranscriptEntry::Message).collect() }
    }

    pub fn push_message(&mut self, message: Message) {
        self.entries.push(TranscriptEntry::Message(message));
    }

    pub fn push_tool_output(&mut self, tool: impl Into<String>, payload: Value) {
        self.entries.push(TranscriptEntry::ToolOutput { tool: tool.into(), payload });
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Model-facing view of the transcript.
    pub fn to_messages(&self) -> Vec<Message> {
        self.entries.iter().map(TranscriptEntry::to_message).collect()
    }
}
