use super::ids::{ConversationId, MessageId};

/// Chat speaker role.
///
/// `Other` carries role tags the core does not interpret, so histories coming
/// from foreign stores survive a round-trip unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Role {
    System,
    User,
    Assistant,
    Other(String),
}

impl Role {
    /// Parses a stored role tag; unknown tags are preserved, never rejected.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "system" => Self::System,
            "user" => Self::User,
            "assistant" => Self::Assistant,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Other(tag) => tag,
        }
    }

    pub fn is_system(&self) -> bool {
        matches!(self, Self::System)
    }
}

/// Core message model.
///
/// The identifier is immutable for the lifetime of the message; creation order
/// is carried by position in the canonical sequence, never by a field here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Creates a message with an explicit identifier.
    pub fn new(id: MessageId, role: Role, content: impl Into<String>) -> Self {
        Self {
            id,
            role,
            content: content.into(),
        }
    }

    /// Creates an unpersisted message with a freshly minted identifier.
    ///
    /// Used to extend a history before submission; persistence, if any, is the
    /// store's responsibility.
    pub fn synthesized(role: Role, content: impl Into<String>) -> Self {
        Self::new(MessageId::mint(), role, content)
    }
}

/// In-place mutation request for one message.
///
/// Identifier and relative order never change; only text and role may.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessagePatch {
    pub content: Option<String>,
    pub role: Option<Role>,
}

impl MessagePatch {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            role: None,
        }
    }
}

/// Conversation aggregate as handed out by the store collaborator.
///
/// `token_count` is derived metadata owned by the store; the core only reads
/// it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    pub messages: Vec<Message>,
    pub token_count: u64,
    pub updated_at_unix_seconds: u64,
}

impl Conversation {
    /// Creates an empty conversation shell.
    pub fn new(id: ConversationId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            messages: Vec::new(),
            token_count: 0,
            updated_at_unix_seconds: 0,
        }
    }

    pub fn message_ids(&self) -> impl Iterator<Item = MessageId> + '_ {
        self.messages.iter().map(|message| message.id)
    }
}

/// Submission mode for the execution collaborator.
///
/// The session layer only ever produces `Immediate`; `Background` exists for
/// collaborators that queue work instead of running it inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionMode {
    Immediate,
    Background,
}
