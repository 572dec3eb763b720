use actix_web::web::Bytes;
use common::helper::error_chain_fmt;
use futures::{stream::FusedStream, Stream, StreamExt};
use std::{
    pin::Pin,
    task::{Context, Poll},
};
use tracing::{debug, error, info, warn, Span};

use crate::ports::completion_client::{CompletionClientError, FragmentStream};

/// Lifecycle of a relay: `Idle -> Streaming -> (Closed | Errored)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    Streaming,
    Closed,
    Errored,
}

/// Relays completion fragments to an HTTP response body, as UTF-8 bytes.
///
/// The relay is pull-based: a fragment is only requested upstream when the HTTP transport polls for
/// the next chunk, so the transport's flow control paces the language model stream. Nothing is
/// buffered.
///
/// - fragments without text are skipped
/// - an upstream failure is forwarded once as an error item, which aborts the response, then the
///   relay ends in `Errored`
/// - the end of the upstream stream ends the relay in `Closed`
///
/// Reaching a terminal state drops the upstream stream, which is never polled again.
/// If the relay is dropped before that (the client went away), the upstream stream is dropped with it,
/// cancelling the completion request.
pub struct StreamRelay {
    fragments: Option<FragmentStream>,
    state: RelayState,
    relayed_bytes: usize,
    span: Span,
}

impl StreamRelay {
    pub fn new(fragments: FragmentStream) -> Self {
        Self {
            fragments: Some(fragments),
            state: RelayState::Idle,
            relayed_bytes: 0,
            // Polled by the HTTP server outside of the request handler: keeps the request span
            span: Span::current(),
        }
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    /// Number of bytes emitted so far
    pub fn relayed_bytes(&self) -> usize {
        self.relayed_bytes
    }

    fn terminate(&mut self, state: RelayState) {
        self.fragments = None;
        self.state = state;
    }
}

impl Stream for StreamRelay {
    type Item = Result<Bytes, StreamRelayError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let _entered = this.span.clone().entered();

        loop {
            let Some(fragments) = this.fragments.as_mut() else {
                return Poll::Ready(None);
            };

            if this.state == RelayState::Idle {
                debug!("Started relaying the completion stream");
                this.state = RelayState::Streaming;
            }

            match fragments.poll_next_unpin(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(fragment))) => match fragment.content {
                    Some(text) if !text.is_empty() => {
                        this.relayed_bytes += text.len();
                        return Poll::Ready(Some(Ok(Bytes::from(text))));
                    }
                    _ => continue,
                },
                Poll::Ready(Some(Err(error))) => {
                    this.terminate(RelayState::Errored);
                    error!(
                        ?error,
                        relayed_bytes = this.relayed_bytes,
                        "Completion stream failed, aborting the response"
                    );
                    return Poll::Ready(Some(Err(StreamRelayError::Interrupted(error))));
                }
                Poll::Ready(None) => {
                    this.terminate(RelayState::Closed);
                    info!(relayed_bytes = this.relayed_bytes, "Completion stream closed");
                    return Poll::Ready(None);
                }
            }
        }
    }
}

impl FusedStream for StreamRelay {
    fn is_terminated(&self) -> bool {
        self.fragments.is_none()
    }
}

impl Drop for StreamRelay {
    fn drop(&mut self) {
        if self.fragments.is_some() {
            let _entered = self.span.enter();
            warn!(
                relayed_bytes = self.relayed_bytes,
                "Response dropped before the end of the completion stream, cancelling it"
            );
        }
    }
}

#[derive(thiserror::Error)]
pub enum StreamRelayError {
    #[error("The answer was interrupted: {0}")]
    Interrupted(#[source] CompletionClientError),
}

impl std::fmt::Debug for StreamRelayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
