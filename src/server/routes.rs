//! REST + SSE endpoints for the coaching service.

use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::catalog::{Helper, JourneyCatalog};
use crate::chat::{StreamEvent, StreamOrchestrator, TurnKind, TurnParams, helper_system_prompt};
use crate::context::{ContextSynchronizer, ConversationTurn};
use crate::error::Error;
use crate::llm::ChatMessage;
use crate::progress::ProgressionEngine;
use crate::store::{Database, NewMessage};

use super::auth::resolve_user;

/// Messages of recent history replayed to the stateless backend.
const HISTORY_LIMIT: usize = 20;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn Database>,
    pub orchestrator: Arc<StreamOrchestrator>,
    pub synchronizer: Arc<ContextSynchronizer>,
    pub engine: Arc<ProgressionEngine>,
    pub catalog: Arc<JourneyCatalog>,
    /// Identity used when no user header is present (None = reject).
    pub fallback_identity: Option<String>,
}

/// Build the Axum router with all API routes.
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat))
        .route("/api/tasks/complete", post(complete_task))
        .route("/api/journey/init", post(init_journey))
        .route("/api/context/extract", post(extract_context))
        .route("/api/sessions", get(list_sessions))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Error mapping ───────────────────────────────────────────────────────

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Config(_) | Error::Database(_) | Error::Llm(_) | Error::Stream(_) => {
                warn!("Request failed: {}", self);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = Json(serde_json::json!({
            "error": self.public_message(),
            "code": self.code(),
        }));
        (status, body).into_response()
    }
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "questline"
    }))
}

// ── Chat ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub helper: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
    pub project_id: String,
    #[serde(default)]
    pub start_journey: bool,
    /// Pre-assembled cross-helper context; skips the synchronizer read.
    #[serde(default)]
    pub context: Option<String>,
}

/// POST /api/chat
///
/// Streams normalized conversation events over SSE: `thread_id` first,
/// then `text`/`tool_call`/`tool_result`, then exactly one of
/// `done`/`error`.
async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, Error> {
    let user = resolve_user(&headers, state.fallback_identity.as_deref())?;
    let helper = Helper::parse(&req.helper)
        .ok_or_else(|| Error::Validation(format!("unknown helper: {}", req.helper)))?;
    if !req.start_journey && req.message.as_deref().unwrap_or("").is_empty() {
        return Err(Error::Validation(
            "message is required unless startJourney is set".to_string(),
        ));
    }

    let session = state
        .db
        .ensure_session(&user, &req.project_id, helper)
        .await?;

    // Cross-helper context: the request-supplied override skips the
    // synchronizer read entirely.
    let context_overridden = req.context.is_some();
    let (shared_context, insights) = match req.context {
        Some(context) => (context, Vec::new()),
        None => {
            let insights = state
                .synchronizer
                .relevant_insights(&user, &req.project_id, helper)
                .await?;
            let rendered = insights
                .iter()
                .flat_map(|(source, entries)| {
                    entries
                        .iter()
                        .map(|e| format!("- {}: {e}", source.display_name()))
                })
                .collect::<Vec<_>>()
                .join("\n");
            (rendered, insights)
        }
    };

    // Snapshot recent history before the new user message lands in the
    // ledger; the stateless backend replays it plus the new message.
    let history = state
        .db
        .list_messages(session.id, HISTORY_LIMIT)
        .await?
        .into_iter()
        .map(|m| match m.role.as_str() {
            "assistant" => ChatMessage::assistant(m.content),
            _ => ChatMessage::user(m.content),
        })
        .collect();

    let kind = if req.start_journey {
        let journey = state.db.get_or_create_journey(&user, &req.project_id).await?;
        let step = state
            .catalog
            .step_for(helper, journey.current_level)
            .ok_or_else(|| {
                Error::not_found("step", format!("{helper}/level {}", journey.current_level))
            })?;
        TurnKind::Open {
            step: step.clone(),
            insights,
        }
    } else {
        // Message turns are persisted up front; this is the primary write
        // path and fails the request.
        let message = req.message.unwrap_or_default();
        state
            .db
            .append_message(session.id, &NewMessage::text("user", message.as_str()))
            .await?;
        TurnKind::Message(message)
    };

    // The synthesized opening already carries its insight bullets, so an
    // opening built from fetched insights keeps them out of the system
    // prompt; an overridden context rides in the system prompt instead.
    let system_context = if req.start_journey && !context_overridden {
        ""
    } else {
        shared_context.as_str()
    };
    let events = state
        .orchestrator
        .stream_turn(TurnParams {
            thread_id: req.thread_id,
            kind,
            system: Some(helper_system_prompt(helper, system_context)),
            history,
        })
        .await?;

    info!(user = %user, project = %req.project_id, helper = %helper, "Chat turn started");

    // Tap the stream to persist the assistant reply once the turn
    // completes. Best-effort: a failed write is logged, never surfaced.
    let db = Arc::clone(&state.db);
    let session_id = session.id;
    let acc = Arc::new(Mutex::new(String::new()));
    let stream = events.then(move |event| {
        let db = Arc::clone(&db);
        let acc = Arc::clone(&acc);
        async move {
            match &event {
                StreamEvent::Text { content } => {
                    if let Ok(mut acc) = acc.lock() {
                        acc.push_str(content);
                    }
                }
                StreamEvent::Done => {
                    let text = acc.lock().map(|acc| acc.clone()).unwrap_or_default();
                    if !text.is_empty() {
                        if let Err(e) = db
                            .append_message(session_id, &NewMessage::text("assistant", text))
                            .await
                        {
                            warn!(session = %session_id, "Failed to persist assistant reply: {e}");
                        }
                    }
                }
                _ => {}
            }
            Ok::<_, Infallible>(Event::default().data(event.to_json()))
        }
    });

    Ok(Sse::new(stream))
}

// ── Task completion ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteTaskRequest {
    pub task_id: String,
    pub project_id: String,
}

/// POST /api/tasks/complete
async fn complete_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CompleteTaskRequest>,
) -> Result<impl IntoResponse, Error> {
    let user = resolve_user(&headers, state.fallback_identity.as_deref())?;
    let outcome = state
        .engine
        .complete_task(&user, &req.project_id, &req.task_id)
        .await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "xpAwarded": outcome.xp_awarded,
        "leveledUp": outcome.leveled_up,
    })))
}

// ── Journey initialization ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitJourneyRequest {
    pub project_id: String,
    pub helper: String,
    pub level_id: i64,
}

/// POST /api/journey/init
async fn init_journey(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<InitJourneyRequest>,
) -> Result<impl IntoResponse, Error> {
    let user = resolve_user(&headers, state.fallback_identity.as_deref())?;
    let helper = Helper::parse(&req.helper)
        .ok_or_else(|| Error::Validation(format!("unknown helper: {}", req.helper)))?;
    let (progress, tasks) = state
        .engine
        .initialize_level(&user, &req.project_id, helper, req.level_id)
        .await?;
    Ok(Json(serde_json::json!({
        "progress": progress,
        "tasks": tasks,
    })))
}

// ── Context extraction ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractContextRequest {
    pub helper: String,
    pub project_id: String,
    #[serde(default)]
    pub project_name: Option<String>,
    pub conversation: Vec<ConversationTurn>,
    #[serde(default)]
    pub message_id: Option<String>,
}

/// POST /api/context/extract
///
/// Runs insight extraction over the supplied conversation and merges the
/// delta into the shared knowledge base. Extraction failures merge as a
/// no-op; they are not surfaced as request errors.
async fn extract_context(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ExtractContextRequest>,
) -> Result<impl IntoResponse, Error> {
    let user = resolve_user(&headers, state.fallback_identity.as_deref())?;
    let helper = Helper::parse(&req.helper)
        .ok_or_else(|| Error::Validation(format!("unknown helper: {}", req.helper)))?;
    if req.conversation.is_empty() {
        return Err(Error::Validation("conversation must not be empty".to_string()));
    }

    if let Some(message_id) = &req.message_id {
        tracing::debug!(%message_id, "Extraction triggered by message");
    }
    let project_name = req.project_name.as_deref().unwrap_or(&req.project_id);
    let outcome = state
        .synchronizer
        .synchronize(&user, &req.project_id, project_name, helper, &req.conversation)
        .await?;
    Ok(Json(outcome))
}

// ── Session listings ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionsQuery {
    pub project_id: String,
}

/// GET /api/sessions?projectId=...
async fn list_sessions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SessionsQuery>,
) -> Result<impl IntoResponse, Error> {
    let user = resolve_user(&headers, state.fallback_identity.as_deref())?;
    let sessions = state.db.list_sessions(&user, &query.project_id).await?;
    Ok(Json(sessions))
}
