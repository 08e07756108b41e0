//! Progression models: journey state, per-helper progress, task rows,
//! and the completion event log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::Helper;

/// Single-track journey state per (user, project). Authoritative for
/// level and XP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JourneyState {
    pub user_id: String,
    pub project_id: String,
    /// Starts at 1; capped at the catalog ceiling.
    pub current_level: i64,
    /// Resets to 0 on level-up; XP is not carried forward.
    pub xp: i64,
}

impl JourneyState {
    pub fn new(user_id: &str, project_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            project_id: project_id.to_string(),
            current_level: 1,
            xp: 0,
        }
    }
}

/// User-wide cumulative totals, mirrored on level-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStats {
    pub user_id: String,
    pub total_xp: i64,
    pub current_level: i64,
}

impl UserStats {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            total_xp: 0,
            current_level: 1,
        }
    }
}

/// Per-helper engagement row. Several helpers may be in progress for the
/// same (user, project) at once; these rows never gate level-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyProgress {
    pub user_id: String,
    pub project_id: String,
    pub level_id: i64,
    pub helper: Helper,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One task row per (user, project, helper, level, task). Bulk-created at
/// level initialization; mutated only by the completion operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelperLevelTask {
    pub user_id: String,
    pub project_id: String,
    pub helper: Helper,
    pub level_id: i64,
    pub task_id: String,
    pub title: String,
    pub goal: String,
    pub required: bool,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub xp_reward: i64,
}

/// Immutable completion log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    pub id: Uuid,
    pub user_id: String,
    pub project_id: String,
    pub task_id: String,
    pub xp_awarded: i64,
    pub leveled_up: bool,
    pub created_at: DateTime<Utc>,
}

/// Result of a task completion.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionOutcome {
    pub xp_awarded: i64,
    pub leveled_up: bool,
}
