//! Task/level progression.
//!
//! Advancement is gated by required-task completion, never by cumulative
//! score; per-level XP resets on every transition.

pub mod engine;
pub mod model;

pub use engine::ProgressionEngine;
pub use model::{
    CompletionOutcome, HelperLevelTask, JourneyProgress, JourneyState, TaskEvent, UserStats,
};
