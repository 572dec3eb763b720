use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use crate::{
    configuration::CompletionSettings,
    domain::entities::message::Message,
    ports::completion_client::{
        CompletionClient, CompletionClientError, CompletionFragment, FragmentStream,
    },
};

/// Streams chat completions from Groq, or any API following the OpenAI `/chat/completions` contract.
///
/// The model and sampling parameters come from the configuration only.
pub struct CompletionGroqRepository {
    client: reqwest::Client,
    url: String,
    api_key: Secret<String>,
    model: String,
    temperature: Option<f32>,
}

impl CompletionGroqRepository {
    pub fn new(client: reqwest::Client, settings: &CompletionSettings) -> Self {
        Self {
            client,
            url: settings.chat_completions_url(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            temperature: settings.temperature,
        }
    }
}

#[async_trait]
impl CompletionClient for CompletionGroqRepository {
    #[tracing::instrument(
        name = "Requesting chat completion",
        skip(self, messages),
        fields(model = %self.model, nb_messages = messages.len())
    )]
    async fn complete(
        &self,
        messages: Vec<Message>,
    ) -> Result<FragmentStream, CompletionClientError> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: &messages,
            stream: true,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| CompletionClientError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            debug!(%status, details, "Completion request rejected");
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    CompletionClientError::Unauthorized(format!("{}: {}", status, details))
                }
                _ => CompletionClientError::Unavailable(format!("{}: {}", status, details)),
            });
        }

        info!("Completion stream started");

        let fragments = try_stream! {
            let mut bytes = response.bytes_stream();
            let mut lines = LineDecoder::default();
            let mut finished = false;

            'read: while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(|e| CompletionClientError::Interrupted(e.to_string()))?;

                for line in lines.push(&chunk) {
                    match parse_event_line(&line)? {
                        StreamEvent::Fragment { fragment, finish_reason } => {
                            finished |= finish_reason.is_some();
                            yield fragment;
                        }
                        StreamEvent::Done => {
                            finished = true;
                            break 'read;
                        }
                        StreamEvent::Ignored => {}
                    }
                }
            }

            if !finished {
                Err::<(), _>(CompletionClientError::Interrupted(
                    "the stream ended before the completion was finished".into(),
                ))?;
            }
        };

        Ok(fragments.boxed())
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    /// Some providers report failures happening mid-stream as an event
    #[serde(default)]
    error: Option<JsonValue>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, PartialEq)]
enum StreamEvent {
    Fragment {
        fragment: CompletionFragment,
        finish_reason: Option<String>,
    },
    Done,
    /// Comments, blank lines and non-data fields
    Ignored,
}

/// Parses one line of the server-sent events stream.
///
/// Each event carries a single `data:` line holding a JSON chunk, the stream ends with `data: [DONE]`.
fn parse_event_line(line: &str) -> Result<StreamEvent, CompletionClientError> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(StreamEvent::Ignored);
    };
    let data = data.trim();

    if data == "[DONE]" {
        return Ok(StreamEvent::Done);
    }

    let chunk: ChatCompletionChunk = serde_json::from_str(data).map_err(|e| {
        CompletionClientError::Interrupted(format!("invalid completion chunk {}: {}", data, e))
    })?;

    if let Some(error) = chunk.error {
        return Err(CompletionClientError::Interrupted(error.to_string()));
    }

    let (content, finish_reason) = match chunk.choices.into_iter().next() {
        Some(choice) => (choice.delta.content, choice.finish_reason),
        None => (None, None),
    };

    Ok(StreamEvent::Fragment {
        fragment: CompletionFragment { content },
        finish_reason,
    })
}

/// Splits a byte stream into lines, whatever the boundaries of the received chunks.
///
/// Only complete lines are returned; a UTF-8 character split over two chunks is kept until
/// its line is complete.
#[derive(Debug, Default)]
struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(position) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=position).collect();
            let line = String::from_utf8_lossy(&line);
            lines.push(line.trim_end_matches(['\n', '\r']).to_string());
        }

        lines
    }
}
