//! Progression engine — level initialization and task completion.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::catalog::{Helper, JourneyCatalog, MAX_LEVEL, task_goal, task_title};
use crate::error::Error;
use crate::store::Database;

use super::model::{CompletionOutcome, HelperLevelTask, JourneyProgress, TaskEvent};

/// Drives the task/level progression state machine.
///
/// Level-up is gated by required-task completion, not cumulative XP: when
/// every required task at the journey's current level is completed (and
/// the required set is non-empty), the level increments and XP resets.
pub struct ProgressionEngine {
    db: Arc<dyn Database>,
    catalog: Arc<JourneyCatalog>,
}

impl ProgressionEngine {
    pub fn new(db: Arc<dyn Database>, catalog: Arc<JourneyCatalog>) -> Self {
        Self { db, catalog }
    }

    /// Initialize a level for a helper: upsert the progress row and
    /// bulk-create the level's task rows from the catalog.
    ///
    /// Safe to call again for the same key; existing task rows (and their
    /// completion state) are left alone.
    pub async fn initialize_level(
        &self,
        user_id: &str,
        project_id: &str,
        helper: Helper,
        level_id: i64,
    ) -> Result<(JourneyProgress, Vec<HelperLevelTask>), Error> {
        if !(1..=MAX_LEVEL).contains(&level_id) {
            return Err(Error::Validation(format!(
                "levelId must be between 1 and {MAX_LEVEL}, got {level_id}"
            )));
        }
        let step = self
            .catalog
            .step_for(helper, level_id)
            .ok_or_else(|| Error::not_found("step", format!("{helper}/level {level_id}")))?;

        let progress = self
            .db
            .upsert_progress(user_id, project_id, helper, level_id)
            .await?;

        let rows: Vec<HelperLevelTask> = step
            .tasks
            .iter()
            .map(|spec| HelperLevelTask {
                user_id: user_id.to_string(),
                project_id: project_id.to_string(),
                helper,
                level_id,
                task_id: spec.id.clone(),
                title: task_title(&spec.id),
                goal: task_goal(&spec.id).to_string(),
                required: spec.required,
                completed: false,
                completed_at: None,
                xp_reward: spec.xp_reward,
            })
            .collect();
        self.db.insert_tasks(&rows).await?;

        let tasks = self
            .db
            .list_tasks(user_id, project_id, helper, level_id)
            .await?;
        tracing::info!(
            user = user_id,
            project = project_id,
            helper = %helper,
            level = level_id,
            tasks = tasks.len(),
            "Level initialized"
        );
        Ok((progress, tasks))
    }

    /// Complete a task, award XP, and evaluate level-up.
    ///
    /// Completing an already-completed task is a conflict, not a no-op.
    pub async fn complete_task(
        &self,
        user_id: &str,
        project_id: &str,
        task_id: &str,
    ) -> Result<CompletionOutcome, Error> {
        let task = self
            .db
            .get_task(user_id, project_id, task_id)
            .await?
            .ok_or_else(|| Error::not_found("task", task_id))?;

        if task.completed {
            return Err(Error::Conflict("Task already completed".to_string()));
        }

        // Conditional update; a concurrent completion loses here too.
        let now = Utc::now();
        if !self
            .db
            .mark_task_completed(user_id, project_id, task_id, now)
            .await?
        {
            return Err(Error::Conflict("Task already completed".to_string()));
        }

        let mut journey = self.db.get_or_create_journey(user_id, project_id).await?;
        let mut stats = self.db.get_or_create_user_stats(user_id).await?;
        journey.xp += task.xp_reward;
        stats.total_xp += task.xp_reward;

        let leveled_up = self
            .required_level_complete(user_id, project_id, journey.current_level)
            .await?;
        if leveled_up {
            journey.current_level = (journey.current_level + 1).min(MAX_LEVEL);
            // XP earned before the transition is discarded, not carried.
            journey.xp = 0;
            stats.current_level = journey.current_level;
            tracing::info!(
                user = user_id,
                project = project_id,
                level = journey.current_level,
                "Level up"
            );
        }

        self.db
            .update_journey(user_id, project_id, journey.current_level, journey.xp)
            .await?;
        self.db
            .update_user_stats(user_id, stats.total_xp, stats.current_level)
            .await?;

        let event = TaskEvent {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            project_id: project_id.to_string(),
            task_id: task_id.to_string(),
            xp_awarded: task.xp_reward,
            leveled_up,
            created_at: now,
        };
        self.db.insert_task_event(&event).await?;

        Ok(CompletionOutcome {
            xp_awarded: task.xp_reward,
            leveled_up,
        })
    }

    /// True iff the level's required set is non-empty and every required
    /// task row is completed. An empty required set never levels up.
    async fn required_level_complete(
        &self,
        user_id: &str,
        project_id: &str,
        level: i64,
    ) -> Result<bool, Error> {
        let tasks = self
            .db
            .list_tasks_at_level(user_id, project_id, level)
            .await?;
        let required: Vec<_> = tasks.iter().filter(|t| t.required).collect();
        Ok(!required.is_empty() && required.iter().all(|t| t.completed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlBackend;

    async fn engine() -> ProgressionEngine {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let catalog = Arc::new(JourneyCatalog::load(None).unwrap());
        ProgressionEngine::new(db, catalog)
    }

    fn engine_with(db: Arc<dyn Database>, toml: &str) -> ProgressionEngine {
        ProgressionEngine::new(db, Arc::new(JourneyCatalog::from_toml(toml).unwrap()))
    }

    #[tokio::test]
    async fn initialize_level_creates_resolved_tasks() {
        let engine = engine().await;
        let (progress, tasks) = engine
            .initialize_level("u-1", "p-1", Helper::Muse, 1)
            .await
            .unwrap();

        assert_eq!(progress.level_id, 1);
        assert_eq!(progress.helper, Helper::Muse);
        assert_eq!(tasks.len(), 3);

        let define = tasks.iter().find(|t| t.task_id == "define-problem").unwrap();
        assert_eq!(define.title, "Define Problem");
        assert_eq!(
            define.goal,
            "Write one sentence naming the problem and who has it"
        );
        assert!(define.required);
        assert!(!define.completed);
        assert_eq!(define.xp_reward, 10);
    }

    #[tokio::test]
    async fn initialize_level_is_idempotent_for_completion_state() {
        let engine = engine().await;
        engine
            .initialize_level("u-1", "p-1", Helper::Muse, 1)
            .await
            .unwrap();
        engine
            .complete_task("u-1", "p-1", "define-problem")
            .await
            .unwrap();

        // Re-initializing must not reset the completed flag.
        let (_, tasks) = engine
            .initialize_level("u-1", "p-1", Helper::Muse, 1)
            .await
            .unwrap();
        let define = tasks.iter().find(|t| t.task_id == "define-problem").unwrap();
        assert!(define.completed);
    }

    #[tokio::test]
    async fn initialize_rejects_bad_level_and_unknown_step() {
        let engine = engine().await;
        assert!(matches!(
            engine.initialize_level("u", "p", Helper::Muse, 0).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            engine.initialize_level("u", "p", Helper::Muse, 9).await,
            Err(Error::Validation(_))
        ));
        // Muse has no step at level 3.
        assert!(matches!(
            engine.initialize_level("u", "p", Helper::Muse, 3).await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn completing_twice_conflicts_and_awards_once() {
        let engine = engine().await;
        engine
            .initialize_level("u-1", "p-1", Helper::Muse, 1)
            .await
            .unwrap();

        let outcome = engine
            .complete_task("u-1", "p-1", "define-problem")
            .await
            .unwrap();
        assert_eq!(outcome.xp_awarded, 10);
        assert!(!outcome.leveled_up);

        let err = engine
            .complete_task("u-1", "p-1", "define-problem")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(err.to_string(), "Conflict: Task already completed");

        let journey = engine
            .db
            .get_or_create_journey("u-1", "p-1")
            .await
            .unwrap();
        assert_eq!(journey.xp, 10, "xp increases exactly once");
    }

    #[tokio::test]
    async fn completing_unknown_task_is_not_found() {
        let engine = engine().await;
        assert!(matches!(
            engine.complete_task("u-1", "p-1", "no-such-task").await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn level_up_requires_all_required_tasks_regardless_of_optional() {
        let engine = engine().await;
        engine
            .initialize_level("u-1", "p-1", Helper::Muse, 1)
            .await
            .unwrap();

        // A(required), B(required), C(optional): completing A alone does
        // not level up; completing B fires regardless of C.
        let outcome = engine
            .complete_task("u-1", "p-1", "define-problem")
            .await
            .unwrap();
        assert!(!outcome.leveled_up);

        let outcome = engine
            .complete_task("u-1", "p-1", "identify-audience")
            .await
            .unwrap();
        assert!(outcome.leveled_up);

        let journey = engine
            .db
            .get_or_create_journey("u-1", "p-1")
            .await
            .unwrap();
        assert_eq!(journey.current_level, 2);
        assert_eq!(journey.xp, 0, "xp resets on level-up");

        let stats = engine.db.get_or_create_user_stats("u-1").await.unwrap();
        assert_eq!(stats.current_level, 2);
        assert_eq!(stats.total_xp, 20, "user-wide total is cumulative");
    }

    #[tokio::test]
    async fn optional_only_level_never_advances() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let engine = engine_with(
            Arc::clone(&db),
            r#"
                [[steps]]
                id = "free-play"
                level = 1
                helper = "muse"
                seed = "s"
                call_to_action = "c"
                tasks = [
                    { id = "optional-one", required = false },
                    { id = "optional-two", required = false },
                ]
            "#,
        );
        engine
            .initialize_level("u-1", "p-1", Helper::Muse, 1)
            .await
            .unwrap();

        engine
            .complete_task("u-1", "p-1", "optional-one")
            .await
            .unwrap();
        let outcome = engine
            .complete_task("u-1", "p-1", "optional-two")
            .await
            .unwrap();
        assert!(!outcome.leveled_up, "empty required set never levels up");

        let journey = db.get_or_create_journey("u-1", "p-1").await.unwrap();
        assert_eq!(journey.current_level, 1);
        assert_eq!(journey.xp, 20, "xp accumulates without level-up");
    }

    #[tokio::test]
    async fn level_is_capped_at_the_ceiling() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let engine = engine_with(
            Arc::clone(&db),
            r#"
                [[steps]]
                id = "last-stretch"
                level = 5
                helper = "sage"
                seed = "s"
                call_to_action = "c"
                tasks = [{ id = "final-task", required = true }]
            "#,
        );
        // Put the journey at the ceiling already.
        db.get_or_create_journey("u-1", "p-1").await.unwrap();
        db.update_journey("u-1", "p-1", MAX_LEVEL, 40).await.unwrap();

        engine
            .initialize_level("u-1", "p-1", Helper::Sage, 5)
            .await
            .unwrap();
        let outcome = engine
            .complete_task("u-1", "p-1", "final-task")
            .await
            .unwrap();
        assert!(outcome.leveled_up);

        let journey = db.get_or_create_journey("u-1", "p-1").await.unwrap();
        assert_eq!(journey.current_level, MAX_LEVEL);
        assert_eq!(journey.xp, 0);
    }

    #[tokio::test]
    async fn completion_writes_an_event() {
        let engine = engine().await;
        engine
            .initialize_level("u-1", "p-1", Helper::Muse, 1)
            .await
            .unwrap();
        engine
            .complete_task("u-1", "p-1", "brainstorm-names")
            .await
            .unwrap();

        let events = engine
            .db
            .list_task_events("u-1", "p-1")
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].task_id, "brainstorm-names");
        assert_eq!(events[0].xp_awarded, 10);
        assert!(!events[0].leveled_up);
    }
}
