//! LLM extraction of structured insights from a helper conversation.
//!
//! Extraction is stateless: each call sees the conversation turns and an
//! optional snapshot of the stored context, and returns a delta. Any
//! failure — transport error, unparseable output — degrades to the empty
//! delta so existing state is never corrupted.

use std::sync::Arc;

use crate::catalog::Helper;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider, Role};

use super::model::{ExtractionDelta, HelperContext, HelperPayload};

/// One conversation turn handed to the extractor.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ConversationTurn {
    pub role: String,
    pub content: String,
}

/// Runs insight extraction against the completion backend.
pub struct ContextExtractor {
    llm: Arc<dyn LlmProvider>,
}

impl ContextExtractor {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Extract a delta from the conversation.
    ///
    /// Never fails: extraction problems are logged and return the empty
    /// delta, which the caller treats as a no-op merge.
    pub async fn extract(
        &self,
        helper: Helper,
        project_name: &str,
        turns: &[ConversationTurn],
        existing: Option<&HelperContext>,
    ) -> ExtractionDelta {
        if turns.is_empty() {
            return ExtractionDelta::default();
        }

        let prompt = extraction_prompt(helper, project_name, turns, existing);
        let messages = vec![
            ChatMessage::system("You are a data extraction assistant. Output only valid JSON."),
            ChatMessage::user(&prompt),
        ];
        let request = CompletionRequest::new(messages)
            .with_max_tokens(1024)
            .with_temperature(0.0);

        match self.llm.complete(request).await {
            Ok(response) => match parse_extraction(helper, &response.content) {
                Some(delta) => delta,
                None => {
                    tracing::warn!(
                        helper = %helper,
                        "Failed to parse extraction JSON — raw: {}",
                        response.content.trim()
                    );
                    ExtractionDelta::default()
                }
            },
            Err(e) => {
                tracing::warn!(helper = %helper, "LLM extraction call failed: {}", e);
                ExtractionDelta::default()
            }
        }
    }
}

/// Per-helper schema fragment for the structured payload.
fn payload_schema(helper: Helper) -> &'static str {
    match helper {
        Helper::Muse => {
            r#"{"problem_statement": "string or null", "target_audience": "string or null", "value_proposition": "string or null"}"#
        }
        Helper::Architect => {
            r#"{"frontend": "string or null", "backend": "string or null", "database": "string or null", "hosting": "string or null"}"#
        }
        Helper::Builder => {
            r#"{"mvp_features": ["array of strings"] or null, "current_milestone": "string or null"}"#
        }
        Helper::Herald => {
            r#"{"channels": ["array of strings"] or null, "launch_date": "string or null", "tagline": "string or null"}"#
        }
        Helper::Mentor => {
            r#"{"metrics": ["array of strings"] or null, "north_star": "string or null"}"#
        }
        Helper::Sage => {
            r#"{"risks": ["array of strings"] or null, "pivots_considered": ["array of strings"] or null}"#
        }
    }
}

/// Build the extraction prompt for a helper conversation.
fn extraction_prompt(
    helper: Helper,
    project_name: &str,
    turns: &[ConversationTurn],
    existing: Option<&HelperContext>,
) -> String {
    let conversation_text: String = turns
        .iter()
        .filter(|t| t.role == "user" || t.role == "assistant")
        .map(|t| {
            let role = if t.role == "user" { "User" } else { "Assistant" };
            format!("{}: {}", role, t.content)
        })
        .collect::<Vec<_>>()
        .join("\n");

    let existing_section = match existing {
        Some(ctx) if !ctx.key_insights.is_empty() || !ctx.decisions_made.is_empty() => {
            format!(
                "\nPreviously stored insights:\n{}\n\nPreviously stored decisions:\n{}\n\n\
                 If the conversation invalidates any stored entry, list its exact text under \
                 superseded_insights / superseded_decisions.\n",
                bullet_list(&ctx.key_insights),
                bullet_list(&ctx.decisions_made),
            )
        }
        _ => String::new(),
    };

    format!(
        "You are reviewing a coaching conversation between the {} helper and the founder of \
         the project \"{}\".\n\n\
         Conversation:\n{}\n{}\n\
         Extract the following. Use empty arrays / null for anything not present.\n\
         {{\n\
           \"key_insights\": [\"array of short insight strings\"],\n\
           \"decisions_made\": [\"array of short decision strings\"],\n\
           \"artifacts_created\": [\"array of artifact names\"],\n\
           \"context_summary\": \"2-3 sentences describing the CURRENT state, not the full history\",\n\
           \"helper_data\": {{}},\n\
           \"superseded_insights\": [\"exact text of stored insights now invalid\"],\n\
           \"superseded_decisions\": [\"exact text of stored decisions now invalid\"]\n\
         }}\n\n\
         helper_data schema: {}\n\n\
         Respond with ONLY valid JSON, no explanation or markdown formatting.",
        helper.display_name(),
        project_name,
        conversation_text,
        existing_section,
        payload_schema(helper),
    )
}

fn bullet_list(entries: &[String]) -> String {
    entries
        .iter()
        .map(|e| format!("- {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Default, serde::Deserialize)]
struct RawExtraction {
    #[serde(default)]
    key_insights: Vec<String>,
    #[serde(default)]
    decisions_made: Vec<String>,
    #[serde(default)]
    artifacts_created: Vec<String>,
    #[serde(default)]
    context_summary: String,
    #[serde(default)]
    helper_data: serde_json::Value,
    #[serde(default)]
    superseded_insights: Vec<String>,
    #[serde(default)]
    superseded_decisions: Vec<String>,
}

/// Strip markdown code fences the model sometimes wraps JSON in.
fn strip_fences(text: &str) -> &str {
    static FENCE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let fence = FENCE.get_or_init(|| {
        regex::Regex::new(r"(?s)^\s*```(?:json)?\s*(.*?)\s*```\s*$").unwrap()
    });
    match fence.captures(text) {
        Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or(text),
        None => text.trim(),
    }
}

/// Parse extractor output into a delta. Returns `None` on malformed JSON;
/// a malformed `helper_data` object alone degrades to no payload.
fn parse_extraction(helper: Helper, content: &str) -> Option<ExtractionDelta> {
    let raw: RawExtraction = serde_json::from_str(strip_fences(content)).ok()?;

    let payload = raw
        .helper_data
        .as_object()
        .filter(|obj| !obj.is_empty())
        .and_then(|_| payload_from_value(helper, &raw.helper_data));

    Some(ExtractionDelta {
        key_insights: raw.key_insights,
        decisions_made: raw.decisions_made,
        artifacts_created: raw.artifacts_created,
        context_summary: raw.context_summary,
        payload,
        superseded_insights: raw.superseded_insights,
        superseded_decisions: raw.superseded_decisions,
    })
}

/// Deserialize a raw JSON object into the payload variant for `helper`.
fn payload_from_value(helper: Helper, value: &serde_json::Value) -> Option<HelperPayload> {
    let value = value.clone();
    match helper {
        Helper::Muse => serde_json::from_value(value).ok().map(HelperPayload::Muse),
        Helper::Architect => serde_json::from_value(value).ok().map(HelperPayload::Architect),
        Helper::Builder => serde_json::from_value(value).ok().map(HelperPayload::Builder),
        Helper::Herald => serde_json::from_value(value).ok().map(HelperPayload::Herald),
        Helper::Mentor => serde_json::from_value(value).ok().map(HelperPayload::Mentor),
        Helper::Sage => serde_json::from_value(value).ok().map(HelperPayload::Sage),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::model::TechStack;

    fn turn(role: &str, content: &str) -> ConversationTurn {
        ConversationTurn {
            role: role.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn prompt_includes_conversation_and_schema() {
        let turns = vec![
            turn("user", "I want to build a recipe app"),
            turn("assistant", "Who is it for?"),
        ];
        let prompt = extraction_prompt(Helper::Muse, "Tastebud", &turns, None);
        assert!(prompt.contains("User: I want to build a recipe app"));
        assert!(prompt.contains("Assistant: Who is it for?"));
        assert!(prompt.contains("Tastebud"));
        assert!(prompt.contains("problem_statement"));
        assert!(prompt.contains("superseded_insights"));
    }

    #[test]
    fn prompt_surfaces_existing_entries_for_supersession() {
        let mut ctx = HelperContext::new("u", "p", Helper::Architect);
        ctx.key_insights.push("team knows Python".to_string());
        let turns = vec![turn("user", "actually we switched to Rust")];
        let prompt = extraction_prompt(Helper::Architect, "Proj", &turns, Some(&ctx));
        assert!(prompt.contains("- team knows Python"));
        assert!(prompt.contains("superseded_insights"));
    }

    #[test]
    fn parse_plain_json() {
        let content = r#"{
            "key_insights": ["audience is home cooks"],
            "decisions_made": [],
            "artifacts_created": [],
            "context_summary": "Exploring a recipe app.",
            "helper_data": {},
            "superseded_insights": [],
            "superseded_decisions": []
        }"#;
        let delta = parse_extraction(Helper::Muse, content).unwrap();
        assert_eq!(delta.key_insights, vec!["audience is home cooks"]);
        assert!(delta.payload.is_none());
    }

    #[test]
    fn parse_fenced_json() {
        let content = "```json\n{\"key_insights\": [\"a\"], \"helper_data\": {\"backend\": \"axum\"}}\n```";
        let delta = parse_extraction(Helper::Architect, content).unwrap();
        assert_eq!(delta.key_insights, vec!["a"]);
        assert_eq!(
            delta.payload,
            Some(HelperPayload::Architect(TechStack {
                backend: Some("axum".to_string()),
                ..Default::default()
            }))
        );
    }

    #[test]
    fn parse_garbage_returns_none() {
        assert!(parse_extraction(Helper::Muse, "I could not find anything.").is_none());
        assert!(parse_extraction(Helper::Muse, "").is_none());
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let delta = parse_extraction(Helper::Sage, "{}").unwrap();
        assert!(delta.is_empty());
    }

    #[test]
    fn empty_helper_data_yields_no_payload() {
        let delta =
            parse_extraction(Helper::Builder, r#"{"helper_data": {}, "key_insights": ["x"]}"#)
                .unwrap();
        assert!(delta.payload.is_none());
    }
}
