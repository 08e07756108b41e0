//! Journey catalog — helpers, steps, and task content.
//!
//! Pure lookup, no mutation: catalog content is parsed from TOML once at
//! startup (embedded default or a configured file) and indexed for O(1)
//! step resolution.

pub mod helper;
pub mod steps;

pub use helper::{ALL_HELPERS, Helper};
pub use steps::{DEFAULT_XP_REWARD, JourneyCatalog, MAX_LEVEL, Step, TaskSpec, task_goal, task_title};
