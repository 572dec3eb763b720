use actix_web::{
    error::JsonPayloadError,
    http::{header::ContentType, StatusCode},
    web, HttpRequest, HttpResponse, ResponseError,
};
use common::helper::error_chain_fmt;
use tracing::error;

use crate::{
    domain::entities::message::{Conversation, ConversationError, Message},
    ports::{
        completion_client::CompletionClientError, embedder::EmbedderError,
        vector_index::VectorIndexError,
    },
    use_cases::answer_question::{AnswerQuestionError, AnswerQuestionUseCase},
};

/// Streams the answer to the last message of a conversation as plain text.
///
/// Every failure happening before the answer starts gives an error status with an empty body.
/// Once the first bytes are sent the status cannot change anymore: a failure aborts the response,
/// leaving the client with a truncated body.
#[tracing::instrument(
    name = "Chat handler",
    skip(use_case, body),
    fields(nb_messages = body.len())
)]
pub async fn chat(
    use_case: web::Data<AnswerQuestionUseCase>,
    body: web::Json<Vec<Message>>,
) -> Result<HttpResponse, ChatError> {
    let conversation = Conversation::try_from(body.into_inner())?;

    let relay = use_case.execute(conversation).await?;

    Ok(HttpResponse::Ok()
        .content_type(ContentType::plaintext())
        .streaming(relay))
}

/// Rejects request bodies that are not a JSON array of messages, like any other invalid request
pub fn chat_json_error_handler(error: JsonPayloadError, _request: &HttpRequest) -> actix_web::Error {
    ChatError::InvalidBody(error.to_string()).into()
}

#[derive(thiserror::Error)]
pub enum ChatError {
    #[error("Invalid request body: {0}")]
    InvalidBody(String),
    #[error(transparent)]
    InvalidConversation(#[from] ConversationError),
    #[error(transparent)]
    AnswerQuestionError(#[from] AnswerQuestionError),
}

impl std::fmt::Debug for ChatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for ChatError {
    fn status_code(&self) -> StatusCode {
        match self {
            ChatError::InvalidBody(_) | ChatError::InvalidConversation(_) => StatusCode::BAD_REQUEST,
            ChatError::AnswerQuestionError(error) => match error {
                AnswerQuestionError::Embedder(EmbedderError::EmptyInput) => StatusCode::BAD_REQUEST,
                AnswerQuestionError::VectorIndex(VectorIndexError::Unauthorized(_))
                | AnswerQuestionError::Completion(CompletionClientError::Unauthorized(_)) => {
                    StatusCode::BAD_GATEWAY
                }
                // The embedding model and the index disagree: a deployment issue
                AnswerQuestionError::VectorIndex(VectorIndexError::DimensionMismatch { .. }) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                AnswerQuestionError::Embedder(_)
                | AnswerQuestionError::VectorIndex(_)
                | AnswerQuestionError::Completion(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
        }
    }

    #[tracing::instrument(name = "Response error from chat controller", skip(self), fields(error = %self))]
    fn error_response(&self) -> HttpResponse<actix_web::body::BoxBody> {
        error!(error = ?self, "Failed to answer");
        HttpResponse::build(self.status_code()).finish()
    }
}
