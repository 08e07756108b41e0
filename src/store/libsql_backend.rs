//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::Helper;
use crate::context::{HelperContext, HelperPayload};
use crate::error::DatabaseError;
use crate::progress::{HelperLevelTask, JourneyProgress, JourneyState, TaskEvent, UserStats};
use crate::store::migrations;
use crate::store::traits::{ChatSession, Database, NewMessage, StoredMessage};

/// Denormalized session fields derived from the first message.
const TITLE_CHARS: usize = 50;
const PREVIEW_CHARS: usize = 100;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Connection(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(backend.conn()).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(backend.conn()).await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 datetime string (our canonical write format).
fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn parse_optional_datetime(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_ref().map(|s| parse_datetime(s))
}

fn parse_helper(s: &str) -> Helper {
    Helper::parse(s).unwrap_or(Helper::Muse)
}

fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_else(|_| Uuid::nil())
}

/// Truncate a string to at most `max` characters on a char boundary.
fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn opt_text(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

fn parse_string_list(s: &str) -> Vec<String> {
    serde_json::from_str(s).unwrap_or_default()
}

// ── Row mappers ─────────────────────────────────────────────────────

const SESSION_COLUMNS: &str =
    "id, user_id, project_id, helper, title, preview, last_message_at, created_at";

fn row_to_session(row: &libsql::Row) -> Result<ChatSession, libsql::Error> {
    let id: String = row.get(0)?;
    let helper: String = row.get(3)?;
    let last_message_at: Option<String> = row.get(6)?;
    let created_at: String = row.get(7)?;
    Ok(ChatSession {
        id: parse_uuid(&id),
        user_id: row.get(1)?,
        project_id: row.get(2)?,
        helper: parse_helper(&helper),
        title: row.get(4)?,
        preview: row.get(5)?,
        last_message_at: parse_optional_datetime(&last_message_at),
        created_at: parse_datetime(&created_at),
    })
}

const MESSAGE_COLUMNS: &str =
    "id, session_id, role, content, tool_call, tool_result, created_at";

fn row_to_message(row: &libsql::Row) -> Result<StoredMessage, libsql::Error> {
    let id: String = row.get(0)?;
    let session_id: String = row.get(1)?;
    let tool_call: Option<String> = row.get(4)?;
    let tool_result: Option<String> = row.get(5)?;
    let created_at: String = row.get(6)?;
    Ok(StoredMessage {
        id: parse_uuid(&id),
        session_id: parse_uuid(&session_id),
        role: row.get(2)?,
        content: row.get(3)?,
        tool_call: tool_call.and_then(|s| serde_json::from_str(&s).ok()),
        tool_result: tool_result.and_then(|s| serde_json::from_str(&s).ok()),
        created_at: parse_datetime(&created_at),
    })
}

const CONTEXT_COLUMNS: &str = "user_id, project_id, helper, key_insights, decisions_made, \
     artifacts_created, summary, payload, version, updated_at";

fn row_to_context(row: &libsql::Row) -> Result<HelperContext, libsql::Error> {
    let helper: String = row.get(2)?;
    let key_insights: String = row.get(3)?;
    let decisions_made: String = row.get(4)?;
    let artifacts_created: String = row.get(5)?;
    let payload: Option<String> = row.get(7)?;
    let updated_at: String = row.get(9)?;
    Ok(HelperContext {
        user_id: row.get(0)?,
        project_id: row.get(1)?,
        helper: parse_helper(&helper),
        key_insights: parse_string_list(&key_insights),
        decisions_made: parse_string_list(&decisions_made),
        artifacts_created: parse_string_list(&artifacts_created),
        summary: row.get(6)?,
        payload: payload.and_then(|s| serde_json::from_str::<HelperPayload>(&s).ok()),
        version: row.get(8)?,
        updated_at: parse_datetime(&updated_at),
    })
}

const TASK_COLUMNS: &str = "user_id, project_id, helper, level_id, task_id, title, goal, \
     required, completed, completed_at, xp_reward";

fn row_to_task(row: &libsql::Row) -> Result<HelperLevelTask, libsql::Error> {
    let helper: String = row.get(2)?;
    let required: i64 = row.get(7)?;
    let completed: i64 = row.get(8)?;
    let completed_at: Option<String> = row.get(9)?;
    Ok(HelperLevelTask {
        user_id: row.get(0)?,
        project_id: row.get(1)?,
        helper: parse_helper(&helper),
        level_id: row.get(3)?,
        task_id: row.get(4)?,
        title: row.get(5)?,
        goal: row.get(6)?,
        required: required != 0,
        completed: completed != 0,
        completed_at: parse_optional_datetime(&completed_at),
        xp_reward: row.get(10)?,
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    // ── Sessions & messages ─────────────────────────────────────────

    async fn ensure_session(
        &self,
        user_id: &str,
        project_id: &str,
        helper: Helper,
    ) -> Result<ChatSession, DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT OR IGNORE INTO sessions (id, user_id, project_id, helper, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                Uuid::new_v4().to_string(),
                user_id,
                project_id,
                helper.to_string(),
                now
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("ensure_session: {e}")))?;

        let mut rows = conn
            .query(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions
                     WHERE user_id = ?1 AND project_id = ?2 AND helper = ?3"
                ),
                params![user_id, project_id, helper.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("ensure_session: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_session(&row)
                .map_err(|e| DatabaseError::Query(format!("ensure_session row parse: {e}"))),
            Ok(None) => Err(DatabaseError::Query(
                "ensure_session: row missing after insert".to_string(),
            )),
            Err(e) => Err(DatabaseError::Query(format!("ensure_session: {e}"))),
        }
    }

    async fn append_message(
        &self,
        session_id: Uuid,
        message: &NewMessage,
    ) -> Result<StoredMessage, DatabaseError> {
        let conn = self.conn();
        let id = Uuid::new_v4();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO messages (id, session_id, role, content, tool_call, tool_result, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id.to_string(),
                session_id.to_string(),
                message.role.as_str(),
                message.content.as_str(),
                opt_text(message.tool_call.as_ref().map(|v| v.to_string())),
                opt_text(message.tool_result.as_ref().map(|v| v.to_string())),
                now.to_rfc3339()
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("append_message: {e}")))?;

        // Denormalized session fields are best-effort: a failure here is
        // logged and never fails the append.
        let preview = truncate_chars(&message.content, PREVIEW_CHARS);
        let result = conn
            .execute(
                "UPDATE sessions SET
                     last_message_at = ?2,
                     preview = COALESCE(preview, ?3)
                 WHERE id = ?1",
                params![session_id.to_string(), now.to_rfc3339(), preview],
            )
            .await;
        if let Err(e) = result {
            warn!(session = %session_id, "Failed to refresh session preview: {e}");
        }
        if message.role == "user" {
            let title = truncate_chars(&message.content, TITLE_CHARS);
            let result = conn
                .execute(
                    "UPDATE sessions SET title = ?2 WHERE id = ?1 AND title IS NULL",
                    params![session_id.to_string(), title],
                )
                .await;
            if let Err(e) = result {
                warn!(session = %session_id, "Failed to set session title: {e}");
            }
        }

        debug!(message = %id, session = %session_id, role = message.role, "Message appended");
        Ok(StoredMessage {
            id,
            session_id,
            role: message.role.clone(),
            content: message.content.clone(),
            tool_call: message.tool_call.clone(),
            tool_result: message.tool_result.clone(),
            created_at: now,
        })
    }

    async fn list_messages(
        &self,
        session_id: Uuid,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE session_id = ?1 ORDER BY created_at ASC LIMIT ?2"
                ),
                params![session_id.to_string(), limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_messages: {e}")))?;

        let mut messages = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let message = row_to_message(&row)
                .map_err(|e| DatabaseError::Query(format!("list_messages row parse: {e}")))?;
            messages.push(message);
        }
        Ok(messages)
    }

    async fn list_sessions(
        &self,
        user_id: &str,
        project_id: &str,
    ) -> Result<Vec<ChatSession>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions
                     WHERE user_id = ?1 AND project_id = ?2
                     ORDER BY COALESCE(last_message_at, created_at) DESC"
                ),
                params![user_id, project_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_sessions: {e}")))?;

        let mut sessions = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let session = row_to_session(&row)
                .map_err(|e| DatabaseError::Query(format!("list_sessions row parse: {e}")))?;
            sessions.push(session);
        }
        Ok(sessions)
    }

    // ── Helper contexts ─────────────────────────────────────────────

    async fn get_context(
        &self,
        user_id: &str,
        project_id: &str,
        helper: Helper,
    ) -> Result<Option<HelperContext>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {CONTEXT_COLUMNS} FROM helper_contexts
                     WHERE user_id = ?1 AND project_id = ?2 AND helper = ?3"
                ),
                params![user_id, project_id, helper.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_context: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let ctx = row_to_context(&row)
                    .map_err(|e| DatabaseError::Query(format!("get_context row parse: {e}")))?;
                Ok(Some(ctx))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_context: {e}"))),
        }
    }

    async fn upsert_context(
        &self,
        ctx: &HelperContext,
        expected_version: Option<i64>,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let key_insights = serde_json::to_string(&ctx.key_insights)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        let decisions_made = serde_json::to_string(&ctx.decisions_made)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        let artifacts_created = serde_json::to_string(&ctx.artifacts_created)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        let payload = ctx
            .payload
            .as_ref()
            .map(|p| serde_json::to_string(p))
            .transpose()
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        let affected = match expected_version {
            // Fresh row: insert must not race another writer's insert.
            None => conn
                .execute(
                    "INSERT OR IGNORE INTO helper_contexts
                         (user_id, project_id, helper, key_insights, decisions_made,
                          artifacts_created, summary, payload, version, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        ctx.user_id.as_str(),
                        ctx.project_id.as_str(),
                        ctx.helper.to_string(),
                        key_insights,
                        decisions_made,
                        artifacts_created,
                        ctx.summary.as_str(),
                        opt_text(payload),
                        ctx.version,
                        ctx.updated_at.to_rfc3339()
                    ],
                )
                .await
                .map_err(|e| DatabaseError::Query(format!("upsert_context insert: {e}")))?,
            // Existing row: conditional on the stored version.
            Some(version) => conn
                .execute(
                    "UPDATE helper_contexts SET
                         key_insights = ?4, decisions_made = ?5, artifacts_created = ?6,
                         summary = ?7, payload = ?8, version = ?9, updated_at = ?10
                     WHERE user_id = ?1 AND project_id = ?2 AND helper = ?3 AND version = ?11",
                    params![
                        ctx.user_id.as_str(),
                        ctx.project_id.as_str(),
                        ctx.helper.to_string(),
                        key_insights,
                        decisions_made,
                        artifacts_created,
                        ctx.summary.as_str(),
                        opt_text(payload),
                        ctx.version,
                        ctx.updated_at.to_rfc3339(),
                        version
                    ],
                )
                .await
                .map_err(|e| DatabaseError::Query(format!("upsert_context update: {e}")))?,
        };

        if affected == 0 {
            return Err(DatabaseError::VersionConflict {
                entity: "helper_context".to_string(),
                key: format!("{}/{}/{}", ctx.user_id, ctx.project_id, ctx.helper),
            });
        }
        Ok(())
    }

    // ── Journey & user stats ────────────────────────────────────────

    async fn get_or_create_journey(
        &self,
        user_id: &str,
        project_id: &str,
    ) -> Result<JourneyState, DatabaseError> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO journeys (user_id, project_id) VALUES (?1, ?2)",
            params![user_id, project_id],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("get_or_create_journey: {e}")))?;

        let mut rows = conn
            .query(
                "SELECT current_level, xp FROM journeys
                 WHERE user_id = ?1 AND project_id = ?2",
                params![user_id, project_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_or_create_journey: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(JourneyState {
                user_id: user_id.to_string(),
                project_id: project_id.to_string(),
                current_level: row.get(0).unwrap_or(1),
                xp: row.get(1).unwrap_or(0),
            }),
            Ok(None) => Err(DatabaseError::Query(
                "get_or_create_journey: row missing after insert".to_string(),
            )),
            Err(e) => Err(DatabaseError::Query(format!("get_or_create_journey: {e}"))),
        }
    }

    async fn update_journey(
        &self,
        user_id: &str,
        project_id: &str,
        current_level: i64,
        xp: i64,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE journeys SET current_level = ?3, xp = ?4
                 WHERE user_id = ?1 AND project_id = ?2",
                params![user_id, project_id, current_level, xp],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_journey: {e}")))?;
        Ok(())
    }

    async fn get_or_create_user_stats(&self, user_id: &str) -> Result<UserStats, DatabaseError> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO user_stats (user_id) VALUES (?1)",
            params![user_id],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("get_or_create_user_stats: {e}")))?;

        let mut rows = conn
            .query(
                "SELECT total_xp, current_level FROM user_stats WHERE user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_or_create_user_stats: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(UserStats {
                user_id: user_id.to_string(),
                total_xp: row.get(0).unwrap_or(0),
                current_level: row.get(1).unwrap_or(1),
            }),
            Ok(None) => Err(DatabaseError::Query(
                "get_or_create_user_stats: row missing after insert".to_string(),
            )),
            Err(e) => Err(DatabaseError::Query(format!("get_or_create_user_stats: {e}"))),
        }
    }

    async fn update_user_stats(
        &self,
        user_id: &str,
        total_xp: i64,
        current_level: i64,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE user_stats SET total_xp = ?2, current_level = ?3 WHERE user_id = ?1",
                params![user_id, total_xp, current_level],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_user_stats: {e}")))?;
        Ok(())
    }

    // ── Progress & tasks ────────────────────────────────────────────

    async fn upsert_progress(
        &self,
        user_id: &str,
        project_id: &str,
        helper: Helper,
        level_id: i64,
    ) -> Result<JourneyProgress, DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO journey_progress (user_id, project_id, level_id, helper, started_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT (user_id, project_id, level_id, helper) DO UPDATE SET updated_at = ?5",
            params![user_id, project_id, level_id, helper.to_string(), now],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("upsert_progress: {e}")))?;

        let mut rows = conn
            .query(
                "SELECT started_at, updated_at FROM journey_progress
                 WHERE user_id = ?1 AND project_id = ?2 AND level_id = ?3 AND helper = ?4",
                params![user_id, project_id, level_id, helper.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_progress: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let started_at: String = row.get(0).unwrap_or_default();
                let updated_at: String = row.get(1).unwrap_or_default();
                Ok(JourneyProgress {
                    user_id: user_id.to_string(),
                    project_id: project_id.to_string(),
                    level_id,
                    helper,
                    started_at: parse_datetime(&started_at),
                    updated_at: parse_datetime(&updated_at),
                })
            }
            Ok(None) => Err(DatabaseError::Query(
                "upsert_progress: row missing after upsert".to_string(),
            )),
            Err(e) => Err(DatabaseError::Query(format!("upsert_progress: {e}"))),
        }
    }

    async fn insert_tasks(&self, tasks: &[HelperLevelTask]) -> Result<(), DatabaseError> {
        let conn = self.conn();
        for task in tasks {
            conn.execute(
                "INSERT OR IGNORE INTO helper_level_tasks
                     (user_id, project_id, helper, level_id, task_id, title, goal,
                      required, completed, completed_at, xp_reward)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, NULL, ?9)",
                params![
                    task.user_id.as_str(),
                    task.project_id.as_str(),
                    task.helper.to_string(),
                    task.level_id,
                    task.task_id.as_str(),
                    task.title.as_str(),
                    task.goal.as_str(),
                    task.required as i64,
                    task.xp_reward
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_tasks: {e}")))?;
        }
        Ok(())
    }

    async fn get_task(
        &self,
        user_id: &str,
        project_id: &str,
        task_id: &str,
    ) -> Result<Option<HelperLevelTask>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {TASK_COLUMNS} FROM helper_level_tasks
                     WHERE user_id = ?1 AND project_id = ?2 AND task_id = ?3
                     LIMIT 1"
                ),
                params![user_id, project_id, task_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_task: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let task = row_to_task(&row)
                    .map_err(|e| DatabaseError::Query(format!("get_task row parse: {e}")))?;
                Ok(Some(task))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_task: {e}"))),
        }
    }

    async fn mark_task_completed(
        &self,
        user_id: &str,
        project_id: &str,
        task_id: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE helper_level_tasks SET completed = 1, completed_at = ?4
                 WHERE user_id = ?1 AND project_id = ?2 AND task_id = ?3 AND completed = 0",
                params![user_id, project_id, task_id, completed_at.to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_task_completed: {e}")))?;
        Ok(affected > 0)
    }

    async fn list_tasks(
        &self,
        user_id: &str,
        project_id: &str,
        helper: Helper,
        level_id: i64,
    ) -> Result<Vec<HelperLevelTask>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {TASK_COLUMNS} FROM helper_level_tasks
                     WHERE user_id = ?1 AND project_id = ?2 AND helper = ?3 AND level_id = ?4
                     ORDER BY rowid ASC"
                ),
                params![user_id, project_id, helper.to_string(), level_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_tasks: {e}")))?;

        let mut tasks = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let task = row_to_task(&row)
                .map_err(|e| DatabaseError::Query(format!("list_tasks row parse: {e}")))?;
            tasks.push(task);
        }
        Ok(tasks)
    }

    async fn list_tasks_at_level(
        &self,
        user_id: &str,
        project_id: &str,
        level_id: i64,
    ) -> Result<Vec<HelperLevelTask>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {TASK_COLUMNS} FROM helper_level_tasks
                     WHERE user_id = ?1 AND project_id = ?2 AND level_id = ?3
                     ORDER BY rowid ASC"
                ),
                params![user_id, project_id, level_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_tasks_at_level: {e}")))?;

        let mut tasks = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let task = row_to_task(&row)
                .map_err(|e| DatabaseError::Query(format!("list_tasks_at_level row parse: {e}")))?;
            tasks.push(task);
        }
        Ok(tasks)
    }

    // ── Task events ─────────────────────────────────────────────────

    async fn insert_task_event(&self, event: &TaskEvent) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO task_events (id, user_id, project_id, task_id, xp_awarded, leveled_up, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    event.id.to_string(),
                    event.user_id.as_str(),
                    event.project_id.as_str(),
                    event.task_id.as_str(),
                    event.xp_awarded,
                    event.leveled_up as i64,
                    event.created_at.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_task_event: {e}")))?;
        Ok(())
    }

    async fn list_task_events(
        &self,
        user_id: &str,
        project_id: &str,
    ) -> Result<Vec<TaskEvent>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                "SELECT id, user_id, project_id, task_id, xp_awarded, leveled_up, created_at
                 FROM task_events
                 WHERE user_id = ?1 AND project_id = ?2
                 ORDER BY created_at ASC",
                params![user_id, project_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_task_events: {e}")))?;

        let mut events = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let id: String = row.get(0).unwrap_or_default();
            let leveled_up: i64 = row.get(5).unwrap_or(0);
            let created_at: String = row.get(6).unwrap_or_default();
            events.push(TaskEvent {
                id: parse_uuid(&id),
                user_id: row.get(1).unwrap_or_default(),
                project_id: row.get(2).unwrap_or_default(),
                task_id: row.get(3).unwrap_or_default(),
                xp_awarded: row.get(4).unwrap_or(0),
                leveled_up: leveled_up != 0,
                created_at: parse_datetime(&created_at),
            });
        }
        Ok(events)
    }
}
