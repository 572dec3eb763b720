use async_trait::async_trait;
use common::helper::error_chain_fmt;
use futures::stream::BoxStream;

use crate::domain::entities::message::Message;

/// An incremental piece of a streamed completion.
///
/// Some chunks carry no text (role announcement, finish reason...): their `content` is `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionFragment {
    pub content: Option<String>,
}

impl CompletionFragment {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
        }
    }
}

/// Lazy, forward-only sequence of fragments. An `Err` item means the stream broke after it started.
pub type FragmentStream = BoxStream<'static, Result<CompletionFragment, CompletionClientError>>;

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Starts a streamed chat completion over `messages`, sent in the given order.
    ///
    /// Errors returned here happen before any fragment was produced.
    async fn complete(&self, messages: Vec<Message>) -> Result<FragmentStream, CompletionClientError>;
}

#[derive(thiserror::Error)]
pub enum CompletionClientError {
    #[error("Language model API rejected the credentials: {0}")]
    Unauthorized(String),
    #[error("Language model API is unavailable: {0}")]
    Unavailable(String),
    #[error("Completion stream was interrupted: {0}")]
    Interrupted(String),
}

impl std::fmt::Debug for CompletionClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
