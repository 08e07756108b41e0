//! Stream orchestrator — resolves the thread, builds the prompt, and
//! re-emits backend chunks as normalized wire events.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use crate::catalog::{Helper, Step};
use crate::error::{Error, StreamError};
use crate::llm::{ChatMessage, StreamChunk};

use super::backend::{ChatBackend, TurnRequest};
use super::events::StreamEvent;
use super::opening::opening_prompt;

/// What this turn sends to the backend.
pub enum TurnKind {
    /// Start-journey: synthesize the opening prompt for a step instead of
    /// relaying user text.
    Open {
        step: Step,
        /// Relevance-gated prior-helper insights.
        insights: Vec<(Helper, Vec<String>)>,
    },
    /// A user message.
    Message(String),
}

/// Parameters for one streamed turn.
pub struct TurnParams {
    /// Reuse an existing thread, or `None` to create one first.
    pub thread_id: Option<String>,
    pub kind: TurnKind,
    pub system: Option<String>,
    /// Recent persisted history, replayed by the stateless backend.
    pub history: Vec<ChatMessage>,
}

/// Bridges the configured backend to the normalized event stream.
///
/// The produced sequence is lazy, finite, and non-restartable: exactly one
/// `thread_id` first, exactly one `done`/`error` last. Dropping the
/// consumer cancels backend consumption.
pub struct StreamOrchestrator {
    backend: Arc<dyn ChatBackend>,
    turn_timeout: Duration,
}

impl StreamOrchestrator {
    pub fn new(backend: Arc<dyn ChatBackend>, turn_timeout: Duration) -> Self {
        Self {
            backend,
            turn_timeout,
        }
    }

    /// Run one turn and stream its events.
    ///
    /// Thread creation failures surface as `Err`; everything after the
    /// `thread_id` event is reported in-stream.
    pub async fn stream_turn(
        &self,
        params: TurnParams,
    ) -> Result<ReceiverStream<StreamEvent>, Error> {
        let thread_id = match params.thread_id {
            Some(id) => id,
            None => self.backend.open_thread().await.map_err(Error::Stream)?,
        };

        let message = match params.kind {
            TurnKind::Open { step, insights } => opening_prompt(&step, &insights),
            TurnKind::Message(text) => text,
        };
        let turn = TurnRequest {
            system: params.system,
            history: params.history,
            message,
        };

        let backend = Arc::clone(&self.backend);
        let timeout = self.turn_timeout;
        let (tx, rx) = tokio::sync::mpsc::channel::<StreamEvent>(16);

        tokio::spawn(async move {
            // The thread id is the first event, before the backend call.
            if tx
                .send(StreamEvent::ThreadId {
                    thread_id: thread_id.clone(),
                })
                .await
                .is_err()
            {
                return;
            }

            let mut chunks = match backend.submit_turn(&thread_id, turn).await {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = tx.send(StreamEvent::Error { error: e.to_string() }).await;
                    return;
                }
            };

            loop {
                let event = match tokio::time::timeout(timeout, chunks.next()).await {
                    // A hung backend must not stall the consumer forever.
                    Err(_) => StreamEvent::Error {
                        error: StreamError::Timeout(timeout).to_string(),
                    },
                    // Backend ended without an explicit Done chunk.
                    Ok(None) => StreamEvent::Done,
                    Ok(Some(Err(e))) => StreamEvent::Error { error: e.to_string() },
                    Ok(Some(Ok(chunk))) => match chunk {
                        StreamChunk::TextDelta(content) => StreamEvent::Text { content },
                        StreamChunk::ToolUse { name, arguments } => StreamEvent::ToolCall {
                            tool_name: name,
                            tool_args: arguments,
                        },
                        StreamChunk::ToolResult { name, result } => StreamEvent::ToolResult {
                            tool_name: name,
                            result,
                        },
                        StreamChunk::Done => StreamEvent::Done,
                    },
                };

                let terminal = event.is_terminal();
                if tx.send(event).await.is_err() {
                    // Consumer detached: release the backend stream without
                    // emitting further data.
                    return;
                }
                if terminal {
                    return;
                }
            }
        });

        Ok(ReceiverStream::new(rx))
    }
}
