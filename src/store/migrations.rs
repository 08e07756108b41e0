//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: r#"
        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            project_id TEXT NOT NULL,
            helper TEXT NOT NULL,
            title TEXT,
            preview TEXT,
            last_message_at TEXT,
            created_at TEXT NOT NULL,
            UNIQUE (user_id, project_id, helper)
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_user_project
            ON sessions(user_id, project_id);

        CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            tool_call TEXT,
            tool_result TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id);

        CREATE TABLE IF NOT EXISTS helper_contexts (
            user_id TEXT NOT NULL,
            project_id TEXT NOT NULL,
            helper TEXT NOT NULL,
            key_insights TEXT NOT NULL DEFAULT '[]',
            decisions_made TEXT NOT NULL DEFAULT '[]',
            artifacts_created TEXT NOT NULL DEFAULT '[]',
            summary TEXT NOT NULL DEFAULT '',
            payload TEXT,
            version INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (user_id, project_id, helper)
        );

        CREATE TABLE IF NOT EXISTS journeys (
            user_id TEXT NOT NULL,
            project_id TEXT NOT NULL,
            current_level INTEGER NOT NULL DEFAULT 1,
            xp INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (user_id, project_id)
        );

        CREATE TABLE IF NOT EXISTS user_stats (
            user_id TEXT PRIMARY KEY,
            total_xp INTEGER NOT NULL DEFAULT 0,
            current_level INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS journey_progress (
            user_id TEXT NOT NULL,
            project_id TEXT NOT NULL,
            level_id INTEGER NOT NULL,
            helper TEXT NOT NULL,
            started_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (user_id, project_id, level_id, helper)
        );

        CREATE TABLE IF NOT EXISTS helper_level_tasks (
            user_id TEXT NOT NULL,
            project_id TEXT NOT NULL,
            helper TEXT NOT NULL,
            level_id INTEGER NOT NULL,
            task_id TEXT NOT NULL,
            title TEXT NOT NULL,
            goal TEXT NOT NULL,
            required INTEGER NOT NULL DEFAULT 0,
            completed INTEGER NOT NULL DEFAULT 0,
            completed_at TEXT,
            xp_reward INTEGER NOT NULL DEFAULT 10,
            PRIMARY KEY (user_id, project_id, helper, level_id, task_id)
        );
        CREATE INDEX IF NOT EXISTS idx_tasks_user_project_level
            ON helper_level_tasks(user_id, project_id, level_id);
        CREATE INDEX IF NOT EXISTS idx_tasks_task_id
            ON helper_level_tasks(user_id, project_id, task_id);

        CREATE TABLE IF NOT EXISTS task_events (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            project_id TEXT NOT NULL,
            task_id TEXT NOT NULL,
            xp_awarded INTEGER NOT NULL,
            leveled_up INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_task_events_user_project
            ON task_events(user_id, project_id);
    "#,
}];

/// Run all pending migrations against the given connection.
///
/// Creates the `_migrations` table if it doesn't exist.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    Ok(())
}

async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match rows.next().await {
        Ok(Some(row)) => Ok(row.get(0).unwrap_or(0)),
        Ok(None) => Ok(0),
        Err(e) => Err(DatabaseError::Migration(format!(
            "Failed to read migration version: {e}"
        ))),
    }
}

async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}
