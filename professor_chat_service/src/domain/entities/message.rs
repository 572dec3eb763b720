use common::helper::error_chain_fmt;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A chronologically ordered, non-empty conversation.
///
/// The last message is the one the user is asking about: it is the one embedded and augmented with
/// the retrieved context. Every previous message is kept as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    history: Vec<Message>,
    last: Message,
}

impl Conversation {
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn last(&self) -> &Message {
        &self.last
    }

    /// Returns the previous messages and the last one, consuming the conversation
    pub fn into_parts(self) -> (Vec<Message>, Message) {
        (self.history, self.last)
    }
}

impl TryFrom<Vec<Message>> for Conversation {
    type Error = ConversationError;

    fn try_from(mut messages: Vec<Message>) -> Result<Self, Self::Error> {
        let last = messages.pop().ok_or(ConversationError::Empty)?;

        if last.content.trim().is_empty() {
            return Err(ConversationError::BlankLastMessage);
        }

        Ok(Self {
            history: messages,
            last,
        })
    }
}

#[derive(thiserror::Error)]
pub enum ConversationError {
    #[error("The conversation does not contain any message")]
    Empty,
    #[error("The last message of the conversation has no content")]
    BlankLastMessage,
}

impl std::fmt::Debug for ConversationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
