//! Context synchronizer — extraction plus serialized merge into the
//! shared knowledge base.

use std::sync::Arc;

use crate::catalog::Helper;
use crate::error::{DatabaseError, Error};
use crate::llm::LlmProvider;
use crate::store::Database;

use super::extractor::{ContextExtractor, ConversationTurn};
use super::model::{ExtractionDelta, HelperContext, apply_delta};

/// Re-reads after a lost conditional update before giving up.
const MERGE_RETRIES: u32 = 3;

/// Result of a synchronize call: the (possibly unchanged) stored context
/// and the raw delta the extractor produced.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SyncOutcome {
    pub context: HelperContext,
    pub delta: ExtractionDelta,
    /// False when the delta was empty and nothing was written.
    pub applied: bool,
}

/// Extracts insights from helper conversations and merges them into the
/// per-(user, project, helper) context rows.
///
/// Merges for the same key are serialized through a conditional update on
/// the row version: a lost race re-reads and re-merges the same delta.
pub struct ContextSynchronizer {
    db: Arc<dyn Database>,
    extractor: ContextExtractor,
}

impl ContextSynchronizer {
    pub fn new(db: Arc<dyn Database>, llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            db,
            extractor: ContextExtractor::new(llm),
        }
    }

    /// Extract insights from `turns` and merge them into the stored
    /// context. An empty delta (including every extraction failure)
    /// leaves the stored row untouched.
    pub async fn synchronize(
        &self,
        user_id: &str,
        project_id: &str,
        project_name: &str,
        helper: Helper,
        turns: &[ConversationTurn],
    ) -> Result<SyncOutcome, Error> {
        let existing = self.db.get_context(user_id, project_id, helper).await?;
        let delta = self
            .extractor
            .extract(helper, project_name, turns, existing.as_ref())
            .await;

        if delta.is_empty() {
            let context =
                existing.unwrap_or_else(|| HelperContext::new(user_id, project_id, helper));
            return Ok(SyncOutcome {
                context,
                delta,
                applied: false,
            });
        }

        let mut current = existing;
        for attempt in 0..MERGE_RETRIES {
            let expected_version = current.as_ref().map(|c| c.version);
            let mut merged = current
                .clone()
                .unwrap_or_else(|| HelperContext::new(user_id, project_id, helper));
            apply_delta(&mut merged, &delta);

            match self.db.upsert_context(&merged, expected_version).await {
                Ok(()) => {
                    return Ok(SyncOutcome {
                        context: merged,
                        delta,
                        applied: true,
                    });
                }
                Err(DatabaseError::VersionConflict { .. }) => {
                    tracing::debug!(
                        helper = %helper,
                        attempt,
                        "Context merge lost the version race, re-reading"
                    );
                    current = self.db.get_context(user_id, project_id, helper).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(DatabaseError::VersionConflict {
            entity: "helper_context".to_string(),
            key: format!("{user_id}/{project_id}/{helper}"),
        }
        .into())
    }

    /// Insights from the helpers `helper` is allowed to read, in relevance
    /// order. Helpers with an empty relevance list (the journey's first)
    /// get an empty result.
    pub async fn relevant_insights(
        &self,
        user_id: &str,
        project_id: &str,
        helper: Helper,
    ) -> Result<Vec<(Helper, Vec<String>)>, Error> {
        let mut sections = Vec::new();
        for &source in helper.relevance() {
            if let Some(ctx) = self.db.get_context(user_id, project_id, source).await? {
                if !ctx.key_insights.is_empty() {
                    sections.push((source, ctx.key_insights));
                }
            }
        }
        Ok(sections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::{ChunkStream, CompletionRequest, CompletionResponse, FinishReason};
    use crate::store::LibSqlBackend;

    /// Stub provider returning a canned extraction payload.
    struct StubLlm {
        response: String,
    }

    #[async_trait::async_trait]
    impl LlmProvider for StubLlm {
        fn model_name(&self) -> &str {
            "stub"
        }
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            Ok(CompletionResponse {
                content: self.response.clone(),
                input_tokens: 0,
                output_tokens: 0,
                finish_reason: FinishReason::Stop,
            })
        }
        async fn complete_stream(
            &self,
            _request: CompletionRequest,
        ) -> Result<ChunkStream, LlmError> {
            unimplemented!("not used in sync tests")
        }
    }

    /// Stub provider whose calls always fail.
    struct FailingLlm;

    #[async_trait::async_trait]
    impl LlmProvider for FailingLlm {
        fn model_name(&self) -> &str {
            "failing"
        }
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            Err(LlmError::RequestFailed {
                provider: "stub".to_string(),
                reason: "down".to_string(),
            })
        }
        async fn complete_stream(
            &self,
            _request: CompletionRequest,
        ) -> Result<ChunkStream, LlmError> {
            unimplemented!("not used in sync tests")
        }
    }

    fn turns() -> Vec<ConversationTurn> {
        vec![ConversationTurn {
            role: "user".to_string(),
            content: "we decided on axum".to_string(),
        }]
    }

    async fn db() -> Arc<dyn Database> {
        Arc::new(LibSqlBackend::new_memory().await.unwrap())
    }

    #[tokio::test]
    async fn synchronize_merges_and_persists() {
        let db = db().await;
        let llm = Arc::new(StubLlm {
            response: r#"{"key_insights": ["team prefers Rust"], "context_summary": "Picking the stack.", "helper_data": {"backend": "axum"}}"#.to_string(),
        });
        let sync = ContextSynchronizer::new(Arc::clone(&db), llm);

        let outcome = sync
            .synchronize("u-1", "p-1", "Proj", Helper::Architect, &turns())
            .await
            .unwrap();
        assert!(outcome.applied);
        assert_eq!(outcome.context.key_insights, vec!["team prefers Rust"]);
        assert_eq!(outcome.context.summary, "Picking the stack.");

        let stored = db
            .get_context("u-1", "p-1", Helper::Architect)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.key_insights, vec!["team prefers Rust"]);
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn extraction_failure_is_a_noop() {
        let db = db().await;

        // Seed a stored context first.
        let llm = Arc::new(StubLlm {
            response: r#"{"key_insights": ["seed insight"]}"#.to_string(),
        });
        let sync = ContextSynchronizer::new(Arc::clone(&db), llm);
        sync.synchronize("u-1", "p-1", "Proj", Helper::Muse, &turns())
            .await
            .unwrap();

        let before = db
            .get_context("u-1", "p-1", Helper::Muse)
            .await
            .unwrap()
            .unwrap();

        let sync = ContextSynchronizer::new(Arc::clone(&db), Arc::new(FailingLlm));
        let outcome = sync
            .synchronize("u-1", "p-1", "Proj", Helper::Muse, &turns())
            .await
            .unwrap();
        assert!(!outcome.applied);

        let after = db
            .get_context("u-1", "p-1", Helper::Muse)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.key_insights, before.key_insights);
        assert_eq!(after.version, before.version);
    }

    #[tokio::test]
    async fn relevant_insights_respects_relevance_list() {
        let db = db().await;
        let llm = Arc::new(StubLlm {
            response: r#"{"key_insights": ["muse insight"]}"#.to_string(),
        });
        let sync = ContextSynchronizer::new(Arc::clone(&db), llm);
        sync.synchronize("u-1", "p-1", "Proj", Helper::Muse, &turns())
            .await
            .unwrap();

        // Architect reads Muse.
        let sections = sync
            .relevant_insights("u-1", "p-1", Helper::Architect)
            .await
            .unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].0, Helper::Muse);
        assert_eq!(sections[0].1, vec!["muse insight"]);

        // Muse reads nothing.
        let sections = sync
            .relevant_insights("u-1", "p-1", Helper::Muse)
            .await
            .unwrap();
        assert!(sections.is_empty());
    }
}
