//! Conversation backend strategies.
//!
//! `ChatBackend` is the capability the orchestrator talks to. Two
//! implementations are selected at startup: `ThreadedBackend` keeps
//! per-thread history and enforces one turn in flight per thread;
//! `StatelessBackend` has no continuity and materializes a single
//! completion as a stream. Both produce the identical chunk contract.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use uuid::Uuid;

use crate::config::{BackendMode, ServiceConfig};
use crate::error::StreamError;
use crate::llm::{ChatMessage, ChunkStream, CompletionRequest, LlmProvider, StreamChunk};

/// One conversation turn to submit.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub system: Option<String>,
    /// Recent history. Used by the stateless backend only; the threaded
    /// backend replays its own thread history instead.
    pub history: Vec<ChatMessage>,
    pub message: String,
}

/// Abstract conversation backend.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Create a new thread and return its opaque id.
    async fn open_thread(&self) -> Result<String, StreamError>;

    /// Submit one turn on a thread. At most one turn may be in flight per
    /// thread; a second concurrent submission fails with `ThreadBusy`.
    async fn submit_turn(
        &self,
        thread_id: &str,
        turn: TurnRequest,
    ) -> Result<ChunkStream, StreamError>;
}

/// Build the configured backend strategy.
pub fn create_backend(config: &ServiceConfig, llm: Arc<dyn LlmProvider>) -> Arc<dyn ChatBackend> {
    match config.backend_mode {
        BackendMode::Threaded => Arc::new(ThreadedBackend::new(llm)),
        BackendMode::Stateless => Arc::new(StatelessBackend::new(llm)),
    }
}

// ── Threaded backend ────────────────────────────────────────────────────

#[derive(Default)]
struct ThreadState {
    history: Vec<ChatMessage>,
    busy: bool,
}

/// Stateful-thread backend: an in-process registry of thread histories
/// with an in-flight guard per thread.
///
/// Thread state is continuity only — transcripts are durable in the
/// ledger, so a restart merely costs the backend-side history.
pub struct ThreadedBackend {
    llm: Arc<dyn LlmProvider>,
    threads: Arc<Mutex<HashMap<String, ThreadState>>>,
}

impl ThreadedBackend {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            threads: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[cfg(test)]
    fn is_busy(&self, thread_id: &str) -> bool {
        self.threads
            .lock()
            .map(|threads| threads.get(thread_id).is_some_and(|s| s.busy))
            .unwrap_or(false)
    }
}

/// Releases the in-flight guard when the turn's stream completes or is
/// dropped. On clean completion the turn is committed to history.
struct TurnGuard {
    threads: Arc<Mutex<HashMap<String, ThreadState>>>,
    thread_id: String,
    user_message: String,
    assistant_acc: String,
    finished: bool,
}

impl TurnGuard {
    /// Commit the turn to thread history and clear the guard.
    fn commit(&mut self) {
        if let Ok(mut threads) = self.threads.lock() {
            if let Some(state) = threads.get_mut(&self.thread_id) {
                state
                    .history
                    .push(ChatMessage::user(self.user_message.clone()));
                state
                    .history
                    .push(ChatMessage::assistant(self.assistant_acc.clone()));
                state.busy = false;
            }
        }
        self.finished = true;
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        // Abandoned turn (consumer dropped the stream, or it errored):
        // release the guard without committing the partial response.
        if !self.finished {
            if let Ok(mut threads) = self.threads.lock() {
                if let Some(state) = threads.get_mut(&self.thread_id) {
                    state.busy = false;
                }
            }
        }
    }
}

#[async_trait]
impl ChatBackend for ThreadedBackend {
    async fn open_thread(&self) -> Result<String, StreamError> {
        let id = Uuid::new_v4().to_string();
        if let Ok(mut threads) = self.threads.lock() {
            threads.insert(id.clone(), ThreadState::default());
        }
        tracing::debug!(thread = %id, "Thread opened");
        Ok(id)
    }

    async fn submit_turn(
        &self,
        thread_id: &str,
        turn: TurnRequest,
    ) -> Result<ChunkStream, StreamError> {
        // Claim the thread and snapshot its history. Unknown ids (a
        // restarted process handed back an old id) start a fresh history
        // under the same identifier.
        let history = {
            let mut threads = self
                .threads
                .lock()
                .map_err(|_| StreamError::Backend("thread registry poisoned".to_string()))?;
            let state = threads.entry(thread_id.to_string()).or_default();
            if state.busy {
                return Err(StreamError::ThreadBusy(thread_id.to_string()));
            }
            state.busy = true;
            state.history.clone()
        };

        let mut messages = Vec::new();
        if let Some(system) = &turn.system {
            messages.push(ChatMessage::system(system));
        }
        messages.extend(history);
        messages.push(ChatMessage::user(&turn.message));

        let guard = TurnGuard {
            threads: Arc::clone(&self.threads),
            thread_id: thread_id.to_string(),
            user_message: turn.message.clone(),
            assistant_acc: String::new(),
            finished: false,
        };

        let inner = match self
            .llm
            .complete_stream(CompletionRequest::new(messages))
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                // guard drops here and releases the thread
                return Err(StreamError::Backend(e.to_string()));
            }
        };

        let stream = futures::stream::unfold(
            Some((inner, guard)),
            |state| async move {
                let (mut inner, mut guard) = state?;
                match inner.next().await {
                    Some(Ok(chunk)) => {
                        match &chunk {
                            StreamChunk::TextDelta(text) => guard.assistant_acc.push_str(text),
                            StreamChunk::Done => guard.commit(),
                            _ => {}
                        }
                        Some((Ok(chunk), Some((inner, guard))))
                    }
                    Some(Err(e)) => Some((Err(e), None)),
                    None => None,
                }
            },
        );
        Ok(stream.boxed())
    }
}

// ── Stateless backend ───────────────────────────────────────────────────

/// No thread continuity: each turn sends the caller-supplied recent
/// history and materializes one completion as a stream.
pub struct StatelessBackend {
    llm: Arc<dyn LlmProvider>,
}

impl StatelessBackend {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl ChatBackend for StatelessBackend {
    async fn open_thread(&self) -> Result<String, StreamError> {
        // Synthetic id; nothing is held against it.
        Ok(Uuid::new_v4().to_string())
    }

    async fn submit_turn(
        &self,
        _thread_id: &str,
        turn: TurnRequest,
    ) -> Result<ChunkStream, StreamError> {
        let mut messages = Vec::new();
        if let Some(system) = &turn.system {
            messages.push(ChatMessage::system(system));
        }
        messages.extend(turn.history);
        messages.push(ChatMessage::user(&turn.message));

        let response = self
            .llm
            .complete(CompletionRequest::new(messages))
            .await
            .map_err(|e| StreamError::Backend(e.to_string()))?;

        let chunks = vec![
            Ok(StreamChunk::TextDelta(response.content)),
            Ok(StreamChunk::Done),
        ];
        Ok(futures::stream::iter(chunks).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::{CompletionResponse, FinishReason};
    use tokio_stream::wrappers::ReceiverStream;

    /// Scripted provider: streams the given chunks, one per poll.
    struct ScriptedLlm {
        chunks: Vec<StreamChunk>,
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        fn model_name(&self) -> &str {
            "scripted"
        }
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            let content = self
                .chunks
                .iter()
                .filter_map(|c| match c {
                    StreamChunk::TextDelta(t) => Some(t.as_str()),
                    _ => None,
                })
                .collect();
            Ok(CompletionResponse {
                content,
                input_tokens: 0,
                output_tokens: 0,
                finish_reason: FinishReason::Stop,
            })
        }
        async fn complete_stream(
            &self,
            _request: CompletionRequest,
        ) -> Result<ChunkStream, LlmError> {
            Ok(futures::stream::iter(self.chunks.clone().into_iter().map(Ok)).boxed())
        }
    }

    /// Provider whose stream stays open until the sender is dropped.
    struct HangingLlm {
        _keep: Arc<Mutex<Vec<tokio::sync::mpsc::Sender<Result<StreamChunk, LlmError>>>>>,
    }

    impl HangingLlm {
        fn new() -> Self {
            Self {
                _keep: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for HangingLlm {
        fn model_name(&self) -> &str {
            "hanging"
        }
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            unimplemented!("not used")
        }
        async fn complete_stream(
            &self,
            _request: CompletionRequest,
        ) -> Result<ChunkStream, LlmError> {
            let (tx, rx) = tokio::sync::mpsc::channel(1);
            self._keep.lock().unwrap().push(tx);
            Ok(ReceiverStream::new(rx).boxed())
        }
    }

    fn turn(message: &str) -> TurnRequest {
        TurnRequest {
            system: None,
            history: Vec::new(),
            message: message.to_string(),
        }
    }

    fn scripted(text: &str) -> Arc<ScriptedLlm> {
        Arc::new(ScriptedLlm {
            chunks: vec![
                StreamChunk::TextDelta(text.to_string()),
                StreamChunk::Done,
            ],
        })
    }

    #[tokio::test]
    async fn threaded_rejects_concurrent_turns() {
        let backend = ThreadedBackend::new(Arc::new(HangingLlm::new()));
        let thread = backend.open_thread().await.unwrap();

        let _first = backend.submit_turn(&thread, turn("one")).await.unwrap();
        let second = backend.submit_turn(&thread, turn("two")).await;
        assert!(matches!(second, Err(StreamError::ThreadBusy(_))));
    }

    #[tokio::test]
    async fn threaded_commits_history_and_releases_on_done() {
        let backend = ThreadedBackend::new(scripted("hello there"));
        let thread = backend.open_thread().await.unwrap();

        let mut stream = backend.submit_turn(&thread, turn("hi")).await.unwrap();
        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            if let StreamChunk::TextDelta(t) = chunk.unwrap() {
                text.push_str(&t);
            }
        }
        assert_eq!(text, "hello there");
        assert!(!backend.is_busy(&thread));

        // Second turn sees the committed history.
        let history_len = backend.threads.lock().unwrap()[&thread].history.len();
        assert_eq!(history_len, 2, "user + assistant committed");

        let mut stream = backend.submit_turn(&thread, turn("again")).await.unwrap();
        while stream.next().await.is_some() {}
        let history_len = backend.threads.lock().unwrap()[&thread].history.len();
        assert_eq!(history_len, 4);
    }

    #[tokio::test]
    async fn threaded_releases_guard_when_stream_dropped() {
        let backend = ThreadedBackend::new(Arc::new(HangingLlm::new()));
        let thread = backend.open_thread().await.unwrap();

        let stream = backend.submit_turn(&thread, turn("one")).await.unwrap();
        assert!(backend.is_busy(&thread));
        drop(stream);
        assert!(!backend.is_busy(&thread));

        // A new turn on the same thread is accepted; the abandoned turn
        // was not committed.
        assert!(backend.submit_turn(&thread, turn("two")).await.is_ok());
        let history_len = backend.threads.lock().unwrap()[&thread].history.len();
        assert_eq!(history_len, 0);
    }

    #[tokio::test]
    async fn threads_do_not_share_state() {
        let backend = ThreadedBackend::new(Arc::new(HangingLlm::new()));
        let a = backend.open_thread().await.unwrap();
        let b = backend.open_thread().await.unwrap();

        let _first = backend.submit_turn(&a, turn("one")).await.unwrap();
        // Busy on thread A does not block thread B.
        assert!(backend.submit_turn(&b, turn("two")).await.is_ok());
    }

    #[tokio::test]
    async fn stateless_materializes_one_completion() {
        let backend = StatelessBackend::new(scripted("full response"));
        let thread = backend.open_thread().await.unwrap();

        let mut stream = backend
            .submit_turn(
                &thread,
                TurnRequest {
                    system: Some("be brief".to_string()),
                    history: vec![ChatMessage::user("earlier"), ChatMessage::assistant("ok")],
                    message: "now".to_string(),
                },
            )
            .await
            .unwrap();

        let chunks: Vec<_> = (&mut stream).collect::<Vec<_>>().await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(
            *chunks[0].as_ref().unwrap(),
            StreamChunk::TextDelta("full response".to_string())
        );
        assert_eq!(*chunks[1].as_ref().unwrap(), StreamChunk::Done);
    }

    #[tokio::test]
    async fn create_backend_selects_by_mode() {
        let llm = scripted("x");
        let threaded = create_backend(
            &ServiceConfig {
                backend_mode: BackendMode::Threaded,
                ..Default::default()
            },
            llm.clone(),
        );
        let stateless = create_backend(
            &ServiceConfig {
                backend_mode: BackendMode::Stateless,
                ..Default::default()
            },
            llm,
        );
        // Both honor the same contract.
        for backend in [threaded, stateless] {
            let thread = backend.open_thread().await.unwrap();
            let mut stream = backend.submit_turn(&thread, turn("hi")).await.unwrap();
            let mut saw_done = false;
            while let Some(chunk) = stream.next().await {
                if chunk.unwrap() == StreamChunk::Done {
                    saw_done = true;
                }
            }
            assert!(saw_done);
        }
    }
}
