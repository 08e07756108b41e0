//! Unified `Database` trait — single async interface for all persistence.
//!
//! The ledger is the only durable shared resource: sessions and their
//! append-only message log, context rows, journey/progress/task rows, and
//! the task event log. All mutation goes through upserts/inserts keyed by
//! natural composite keys.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::catalog::Helper;
use crate::context::HelperContext;
use crate::error::DatabaseError;
use crate::progress::{HelperLevelTask, JourneyProgress, JourneyState, TaskEvent, UserStats};

/// A chat session grouping messages for one (user, project, helper).
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: Uuid,
    pub user_id: String,
    pub project_id: String,
    pub helper: Helper,
    /// Derived from the first user message (first 50 chars), set once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// First 100 chars of the first content, for listings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A persisted conversation message. Immutable once written.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// A message to append to a session.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub role: String,
    pub content: String,
    pub tool_call: Option<serde_json::Value>,
    pub tool_result: Option<serde_json::Value>,
}

impl NewMessage {
    pub fn text(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
            tool_call: None,
            tool_result: None,
        }
    }
}

/// Backend-agnostic database trait covering the whole ledger.
#[async_trait]
pub trait Database: Send + Sync {
    // ── Sessions & messages ─────────────────────────────────────────

    /// Get or create the session for (user, project, helper).
    async fn ensure_session(
        &self,
        user_id: &str,
        project_id: &str,
        helper: Helper,
    ) -> Result<ChatSession, DatabaseError>;

    /// Append a message to a session. The denormalized session fields
    /// (title, preview, last_message_at) are refreshed best-effort: their
    /// failure is logged and does not fail the append.
    async fn append_message(
        &self,
        session_id: Uuid,
        message: &NewMessage,
    ) -> Result<StoredMessage, DatabaseError>;

    /// Messages in a session, oldest first, up to `limit`.
    async fn list_messages(
        &self,
        session_id: Uuid,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, DatabaseError>;

    /// Sessions for a (user, project), most recently active first.
    async fn list_sessions(
        &self,
        user_id: &str,
        project_id: &str,
    ) -> Result<Vec<ChatSession>, DatabaseError>;

    // ── Helper contexts ─────────────────────────────────────────────

    async fn get_context(
        &self,
        user_id: &str,
        project_id: &str,
        helper: Helper,
    ) -> Result<Option<HelperContext>, DatabaseError>;

    /// Conditional upsert: with `expected_version = None` the row must not
    /// exist yet; with `Some(v)` the stored version must equal `v`.
    /// Returns `VersionConflict` otherwise.
    async fn upsert_context(
        &self,
        ctx: &HelperContext,
        expected_version: Option<i64>,
    ) -> Result<(), DatabaseError>;

    // ── Journey & user stats ────────────────────────────────────────

    async fn get_or_create_journey(
        &self,
        user_id: &str,
        project_id: &str,
    ) -> Result<JourneyState, DatabaseError>;

    async fn update_journey(
        &self,
        user_id: &str,
        project_id: &str,
        current_level: i64,
        xp: i64,
    ) -> Result<(), DatabaseError>;

    async fn get_or_create_user_stats(&self, user_id: &str) -> Result<UserStats, DatabaseError>;

    async fn update_user_stats(
        &self,
        user_id: &str,
        total_xp: i64,
        current_level: i64,
    ) -> Result<(), DatabaseError>;

    // ── Progress & tasks ────────────────────────────────────────────

    /// Upsert the progress row keyed (user, project, level, helper).
    async fn upsert_progress(
        &self,
        user_id: &str,
        project_id: &str,
        helper: Helper,
        level_id: i64,
    ) -> Result<JourneyProgress, DatabaseError>;

    /// Bulk-insert task rows; rows whose composite key already exists are
    /// left untouched.
    async fn insert_tasks(&self, tasks: &[HelperLevelTask]) -> Result<(), DatabaseError>;

    async fn get_task(
        &self,
        user_id: &str,
        project_id: &str,
        task_id: &str,
    ) -> Result<Option<HelperLevelTask>, DatabaseError>;

    /// Conditionally mark a task completed. Returns false when the task
    /// was already completed (lost race).
    async fn mark_task_completed(
        &self,
        user_id: &str,
        project_id: &str,
        task_id: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;

    async fn list_tasks(
        &self,
        user_id: &str,
        project_id: &str,
        helper: Helper,
        level_id: i64,
    ) -> Result<Vec<HelperLevelTask>, DatabaseError>;

    /// All task rows at a level for (user, project), across helpers.
    async fn list_tasks_at_level(
        &self,
        user_id: &str,
        project_id: &str,
        level_id: i64,
    ) -> Result<Vec<HelperLevelTask>, DatabaseError>;

    // ── Task events ─────────────────────────────────────────────────

    async fn insert_task_event(&self, event: &TaskEvent) -> Result<(), DatabaseError>;

    async fn list_task_events(
        &self,
        user_id: &str,
        project_id: &str,
    ) -> Result<Vec<TaskEvent>, DatabaseError>;
}
