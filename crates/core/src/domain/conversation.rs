use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "system" => Some(Self::System),
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Append-only transcript for one sender.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub sender_id: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// Whether `message` may be appended without breaking the system-first rule.
    pub fn accepts(&self, message: &Message) -> bool {
        (message.role == Role::System) == self.messages.is_empty()
    }

    /// The first message is the system message and no other message is.
    pub fn is_well_formed(&self) -> bool {
        self.messages
            .iter()
            .enumerate()
            .all(|(index, message)| (message.role == Role::System) == (index == 0))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{Conversation, ConversationId, Message, Role};

    fn conversation(messages: Vec<Message>) -> Conversation {
        Conversation {
            id: ConversationId("c-1".to_string()),
            sender_id: "5511988887777".to_string(),
            messages,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn system_message_only_accepted_as_first_entry() {
        let empty = conversation(Vec::new());
        assert!(empty.accepts(&Message::system("persona")));
        assert!(!empty.accepts(&Message::user("oi")));

        let seeded = conversation(vec![Message::system("persona")]);
        assert!(!seeded.accepts(&Message::system("second persona")));
        assert!(seeded.accepts(&Message::user("oi")));
    }

    #[test]
    fn well_formed_rejects_late_system_messages() {
        let good = conversation(vec![
            Message::system("persona"),
            Message::user("oi"),
            Message::assistant("ola"),
        ]);
        assert!(good.is_well_formed());

        let bad = conversation(vec![Message::user("oi"), Message::system("persona")]);
        assert!(!bad.is_well_formed());
    }

    #[test]
    fn roles_round_trip_through_storage_labels() {
        for role in [Role::System, Role::User, Role::Assistant] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
    }
}
