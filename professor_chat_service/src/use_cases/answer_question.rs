use common::helper::error_chain_fmt;
use std::sync::Arc;
use tracing::info;

use crate::{
    domain::{
        entities::message::Conversation,
        services::{
            context_formatter::format_context, prompt::build_completion_messages,
            stream_relay::StreamRelay,
        },
    },
    ports::{
        completion_client::{CompletionClient, CompletionClientError},
        embedder::{Embedder, EmbedderError},
        vector_index::{VectorIndex, VectorIndexError},
    },
};

/// Answers a student's question about professors, using the professors closest to the question.
///
/// 1. embeds the last message of the conversation
/// 2. queries the vector index for the `top_k` closest professors
/// 3. appends them to the last message and sends the conversation to the language model
///
/// Nothing is retried: the first failing step fails the whole request.
/// The answer is returned as a relay of the completion stream, not started yet.
pub struct AnswerQuestionUseCase {
    embedder: Arc<dyn Embedder>,
    vector_index: Arc<dyn VectorIndex>,
    completion_client: Arc<dyn CompletionClient>,
    top_k: usize,
}

impl AnswerQuestionUseCase {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vector_index: Arc<dyn VectorIndex>,
        completion_client: Arc<dyn CompletionClient>,
        top_k: usize,
    ) -> Self {
        Self {
            embedder,
            vector_index,
            completion_client,
            top_k,
        }
    }

    #[tracing::instrument(
        name = "Answering question",
        skip(self, conversation),
        fields(history_len = conversation.history().len())
    )]
    pub async fn execute(
        &self,
        conversation: Conversation,
    ) -> Result<StreamRelay, AnswerQuestionError> {
        let embedding = self.embedder.embed(&conversation.last().content).await?;

        let professors = self
            .vector_index
            .query(&embedding, self.top_k, true)
            .await?;
        info!(
            nb_professors = professors.len(),
            requested = self.top_k,
            "Retrieved professors"
        );

        let context = format_context(&professors, self.top_k);
        let messages = build_completion_messages(conversation, &context);

        let fragments = self.completion_client.complete(messages).await?;

        Ok(StreamRelay::new(fragments))
    }
}

#[derive(thiserror::Error)]
pub enum AnswerQuestionError {
    #[error(transparent)]
    Embedder(#[from] EmbedderError),
    #[error(transparent)]
    VectorIndex(#[from] VectorIndexError),
    #[error(transparent)]
    Completion(#[from] CompletionClientError),
}

impl std::fmt::Debug for AnswerQuestionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
