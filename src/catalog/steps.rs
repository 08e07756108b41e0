//! Journey catalog — config-derived, read-only step index.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

use super::helper::Helper;

/// Default XP reward per task.
pub const DEFAULT_XP_REWARD: i64 = 10;

/// Maximum journey level; level-up never exceeds this.
pub const MAX_LEVEL: i64 = 5;

const DEFAULT_CATALOG: &str = include_str!("default_catalog.toml");

/// A task as declared in the catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskSpec {
    pub id: String,
    pub required: bool,
    #[serde(default = "default_xp")]
    pub xp_reward: i64,
}

fn default_xp() -> i64 {
    DEFAULT_XP_REWARD
}

/// One journey step ("orb"): a helper bound to a task set and seed prompt.
#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    pub id: String,
    pub level: i64,
    pub helper: Helper,
    /// Seed content shown to the backend when the step's conversation opens.
    pub seed: String,
    pub call_to_action: String,
    pub tasks: Vec<TaskSpec>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    steps: Vec<Step>,
}

/// The full journey catalog with a precomputed step index.
///
/// Loaded once at startup and never mutated.
#[derive(Debug)]
pub struct JourneyCatalog {
    steps: Vec<Step>,
    by_id: HashMap<String, usize>,
}

impl JourneyCatalog {
    /// Parse a catalog from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let file: CatalogFile =
            toml::from_str(text).map_err(|e| ConfigError::CatalogParse(e.to_string()))?;
        if file.steps.is_empty() {
            return Err(ConfigError::CatalogParse("catalog has no steps".to_string()));
        }
        let mut by_id = HashMap::with_capacity(file.steps.len());
        for (i, step) in file.steps.iter().enumerate() {
            if by_id.insert(step.id.clone(), i).is_some() {
                return Err(ConfigError::CatalogParse(format!(
                    "duplicate step id: {}",
                    step.id
                )));
            }
        }
        Ok(Self {
            steps: file.steps,
            by_id,
        })
    }

    /// Load from a TOML file, or the embedded default when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::from_toml(&std::fs::read_to_string(p)?),
            None => Self::from_toml(DEFAULT_CATALOG),
        }
    }

    /// Resolve a step by id. O(1) via the precomputed index.
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.by_id.get(id).map(|&i| &self.steps[i])
    }

    /// Enumerate all steps across all levels, in catalog order.
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter()
    }

    /// The step for a given helper at a given level, if any.
    pub fn step_for(&self, helper: Helper, level: i64) -> Option<&Step> {
        self.steps
            .iter()
            .find(|s| s.helper == helper && s.level == level)
    }

    /// All task specs at a level, across helpers.
    pub fn tasks_at_level(&self, level: i64) -> Vec<&TaskSpec> {
        self.steps
            .iter()
            .filter(|s| s.level == level)
            .flat_map(|s| s.tasks.iter())
            .collect()
    }
}

/// Derive a human-readable title from a kebab-case task id.
///
/// `"define-problem"` → `"Define Problem"`.
pub fn task_title(id: &str) -> String {
    id.split('-')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolve the goal description for a task id.
pub fn task_goal(id: &str) -> &'static str {
    match id {
        "define-problem" => "Write one sentence naming the problem and who has it",
        "identify-audience" => "Describe the first group of people you will build for",
        "brainstorm-names" => "Collect at least five candidate names for the venture",
        "choose-tech-stack" => "Pick the frontend, backend, database, and hosting you will start with",
        "sketch-architecture" => "Draw the main components and how they talk to each other",
        "estimate-costs" => "Estimate monthly running costs for the first hundred users",
        "scope-mvp-features" => "List the features the MVP ships with and the ones it will not",
        "build-first-feature" => "Get one end-to-end feature working, however rough",
        "set-up-deploys" => "Make releasing a one-command operation",
        "pick-launch-channels" => "Choose the two or three channels your launch will lead with",
        "draft-announcement" => "Write the announcement post in your own voice",
        "schedule-launch" => "Put a launch date on the calendar and work backward from it",
        "define-north-star" => "Choose the one metric that best reflects delivered value",
        "review-first-metrics" => "Read a week of real usage and write down what surprised you",
        "plan-next-experiment" => "Design one experiment that could move your north star",
        "map-top-risks" => "Name the three risks most likely to sink the venture",
        "reflect-on-journey" => "Write a short retrospective: keep, drop, change",
        _ => "Complete this task to progress",
    }
}
