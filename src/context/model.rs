//! Shared knowledge-base models: per-helper context rows, typed payloads,
//! and the merge algorithm.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::Helper;

/// Cap on the insight/decision/artifact lists. Insertion order defines
/// recency; the last `LIST_CAP` entries are retained.
pub const LIST_CAP: usize = 10;

// ── Helper-specific payloads ────────────────────────────────────────────
//
// A closed set of per-helper structured records. Every field is optional;
// merging is per-field (a new Some overwrites, None retains the stored
// value), never a blind object spread.

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdeationBoard {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problem_statement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_audience: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_proposition: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechStack {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontend: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hosting: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildPlan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mvp_features: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_milestone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LaunchPlan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tagline: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GrowthPlan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub north_star: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyNotes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risks: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pivots_considered: Option<Vec<String>>,
}

/// Helper-specific structured payload, one variant per helper.
///
/// The variant is selected by the helper enum, so an unmapped key can
/// never reach storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "helper", content = "data", rename_all = "snake_case")]
pub enum HelperPayload {
    Muse(IdeationBoard),
    Architect(TechStack),
    Builder(BuildPlan),
    Herald(LaunchPlan),
    Mentor(GrowthPlan),
    Sage(StrategyNotes),
}

impl HelperPayload {
    /// The helper this payload belongs to. Total mapping, no string keys.
    pub fn helper(&self) -> Helper {
        match self {
            Self::Muse(_) => Helper::Muse,
            Self::Architect(_) => Helper::Architect,
            Self::Builder(_) => Helper::Builder,
            Self::Herald(_) => Helper::Herald,
            Self::Mentor(_) => Helper::Mentor,
            Self::Sage(_) => Helper::Sage,
        }
    }

    /// An empty payload for the given helper.
    pub fn empty_for(helper: Helper) -> Self {
        match helper {
            Helper::Muse => Self::Muse(IdeationBoard::default()),
            Helper::Architect => Self::Architect(TechStack::default()),
            Helper::Builder => Self::Builder(BuildPlan::default()),
            Helper::Herald => Self::Herald(LaunchPlan::default()),
            Helper::Mentor => Self::Mentor(GrowthPlan::default()),
            Helper::Sage => Self::Sage(StrategyNotes::default()),
        }
    }

    /// Merge `new` into `self` field by field. A variant mismatch replaces
    /// the stored payload wholesale (cannot happen through the typed API).
    pub fn merge(&mut self, new: HelperPayload) {
        match (self, new) {
            (Self::Muse(a), Self::Muse(b)) => {
                merge_field(&mut a.problem_statement, b.problem_statement);
                merge_field(&mut a.target_audience, b.target_audience);
                merge_field(&mut a.value_proposition, b.value_proposition);
            }
            (Self::Architect(a), Self::Architect(b)) => {
                merge_field(&mut a.frontend, b.frontend);
                merge_field(&mut a.backend, b.backend);
                merge_field(&mut a.database, b.database);
                merge_field(&mut a.hosting, b.hosting);
            }
            (Self::Builder(a), Self::Builder(b)) => {
                merge_field(&mut a.mvp_features, b.mvp_features);
                merge_field(&mut a.current_milestone, b.current_milestone);
            }
            (Self::Herald(a), Self::Herald(b)) => {
                merge_field(&mut a.channels, b.channels);
                merge_field(&mut a.launch_date, b.launch_date);
                merge_field(&mut a.tagline, b.tagline);
            }
            (Self::Mentor(a), Self::Mentor(b)) => {
                merge_field(&mut a.metrics, b.metrics);
                merge_field(&mut a.north_star, b.north_star);
            }
            (Self::Sage(a), Self::Sage(b)) => {
                merge_field(&mut a.risks, b.risks);
                merge_field(&mut a.pivots_considered, b.pivots_considered);
            }
            (this, new) => *this = new,
        }
    }
}

fn merge_field<T>(existing: &mut Option<T>, new: Option<T>) {
    if new.is_some() {
        *existing = new;
    }
}

// ── Context row ─────────────────────────────────────────────────────────

/// Shared knowledge-base row, one per (user, project, helper).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelperContext {
    pub user_id: String,
    pub project_id: String,
    pub helper: Helper,
    /// Bounded, deduplicated list of key insights.
    pub key_insights: Vec<String>,
    /// Bounded, deduplicated list of decisions made.
    pub decisions_made: Vec<String>,
    /// Bounded list of artifacts created.
    pub artifacts_created: Vec<String>,
    /// Rolling summary of *current* state, not cumulative history.
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<HelperPayload>,
    /// Compare-and-swap token; bumped on every applied merge.
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl HelperContext {
    pub fn new(user_id: &str, project_id: &str, helper: Helper) -> Self {
        Self {
            user_id: user_id.to_string(),
            project_id: project_id.to_string(),
            helper,
            key_insights: Vec::new(),
            decisions_made: Vec::new(),
            artifacts_created: Vec::new(),
            summary: String::new(),
            payload: None,
            version: 0,
            updated_at: Utc::now(),
        }
    }
}

// ── Extraction delta ────────────────────────────────────────────────────

/// Output of one extraction call. The default value is the empty delta,
/// which callers treat as a no-op merge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionDelta {
    #[serde(default)]
    pub key_insights: Vec<String>,
    #[serde(default)]
    pub decisions_made: Vec<String>,
    #[serde(default)]
    pub artifacts_created: Vec<String>,
    #[serde(default)]
    pub context_summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<HelperPayload>,
    #[serde(default)]
    pub superseded_insights: Vec<String>,
    #[serde(default)]
    pub superseded_decisions: Vec<String>,
}

impl ExtractionDelta {
    /// True when applying this delta would change nothing.
    pub fn is_empty(&self) -> bool {
        self.key_insights.is_empty()
            && self.decisions_made.is_empty()
            && self.artifacts_created.is_empty()
            && self.context_summary.is_empty()
            && self.payload.is_none()
            && self.superseded_insights.is_empty()
            && self.superseded_decisions.is_empty()
    }
}

/// Merge a bounded list: drop superseded entries, append new ones,
/// deduplicate by exact match, keep the last `LIST_CAP`.
fn merge_list(stored: &mut Vec<String>, superseded: &[String], new: &[String]) {
    stored.retain(|entry| !superseded.contains(entry));
    for entry in new {
        if !stored.contains(entry) {
            stored.push(entry.clone());
        }
    }
    if stored.len() > LIST_CAP {
        stored.drain(..stored.len() - LIST_CAP);
    }
}

/// Apply an extraction delta to a stored context.
///
/// Implements the merge contract: supersession first, then append with
/// dedup and cap, structural payload merge, and summary replacement only
/// when the extractor produced a non-empty one.
pub fn apply_delta(ctx: &mut HelperContext, delta: &ExtractionDelta) {
    merge_list(&mut ctx.key_insights, &delta.superseded_insights, &delta.key_insights);
    merge_list(&mut ctx.decisions_made, &delta.superseded_decisions, &delta.decisions_made);
    merge_list(&mut ctx.artifacts_created, &[], &delta.artifacts_created);

    if let Some(new_payload) = &delta.payload {
        match &mut ctx.payload {
            Some(existing) => existing.merge(new_payload.clone()),
            None => ctx.payload = Some(new_payload.clone()),
        }
    }

    if !delta.context_summary.is_empty() {
        ctx.summary = delta.context_summary.clone();
    }

    ctx.version += 1;
    ctx.updated_at = Utc::now();
}
