//! Conversation-related types.

use std::fmt::{self, Display};

use serde::Serialize;
use testsmith_model::{ModelMessage, ModelRequest};

/// The author of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// The fixed instructions at the head of the conversation.
    System,
    /// Prompts and test diagnostics.
    User,
    /// Model replies.
    Assistant,
}

impl Role {
    #[inline]
    fn of(msg: &ModelMessage) -> Self {
        match msg {
            ModelMessage::System(_) => Role::System,
            ModelMessage::User(_) => Role::User,
            ModelMessage::Assistant(_) => Role::Assistant,
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A message was rejected by the conversation.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConversationError {
    /// The content is empty or whitespace only.
    #[error("{0} message content must be a non-empty string")]
    EmptyContent(Role),
    /// The message has the same role as the previous one.
    #[error("consecutive messages cannot have the same role ({0})")]
    ConsecutiveRole(Role),
}

/// The transcript of one generation session.
///
/// The first message is always the system message, no two neighbouring
/// messages share a role, and no message is empty. The conversation only
/// grows, except for [`Conversation::reset`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Conversation {
    items: Vec<ModelMessage>,
}

impl Conversation {
    /// Starts a conversation with the given system message.
    pub fn new<S: Into<String>>(system: S) -> Result<Self, ConversationError> {
        let system = system.into();
        if system.trim().is_empty() {
            return Err(ConversationError::EmptyContent(Role::System));
        }
        Ok(Self {
            items: vec![ModelMessage::System(system)],
        })
    }

    /// Appends a user message.
    #[inline]
    pub fn push_user<S: Into<String>>(
        &mut self,
        content: S,
    ) -> Result<(), ConversationError> {
        self.push(ModelMessage::User(content.into()))
    }

    /// Appends an assistant message.
    #[inline]
    pub fn push_assistant<S: Into<String>>(
        &mut self,
        content: S,
    ) -> Result<(), ConversationError> {
        self.push(ModelMessage::Assistant(content.into()))
    }

    fn push(&mut self, msg: ModelMessage) -> Result<(), ConversationError> {
        let role = Role::of(&msg);
        if msg.content().trim().is_empty() {
            return Err(ConversationError::EmptyContent(role));
        }
        if Role::of(self.last()) == role {
            return Err(ConversationError::ConsecutiveRole(role));
        }
        trace!("appending a {role} message");
        self.items.push(msg);
        Ok(())
    }

    /// Drops everything but the system message.
    ///
    /// The system message always exists, since a conversation cannot be
    /// created without one.
    #[inline]
    pub fn reset(&mut self) {
        self.items.truncate(1);
    }

    /// Returns all messages, oldest first.
    #[inline]
    pub fn messages(&self) -> &[ModelMessage] {
        &self.items
    }

    /// Returns the number of messages, the system message included.
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns the newest message.
    #[inline]
    pub fn last(&self) -> &ModelMessage {
        // `items` is never empty, see `new` and `reset`.
        &self.items[self.items.len() - 1]
    }

    /// Builds a model request carrying the whole conversation.
    #[inline]
    pub fn to_request(&self) -> ModelRequest {
        ModelRequest::with_messages(self.items.clone())
    }
}
