//! Cross-helper context synchronization.
//!
//! Each helper's conversation is distilled into structured insight records
//! and merged — with supersession and deduplication — into a shared
//! knowledge base every other helper can read, gated by its relevance
//! list.

pub mod extractor;
pub mod model;
pub mod sync;

pub use extractor::{ContextExtractor, ConversationTurn};
pub use model::{
    BuildPlan, ExtractionDelta, GrowthPlan, HelperContext, HelperPayload, IdeationBoard,
    LIST_CAP, LaunchPlan, StrategyNotes, TechStack, apply_delta,
};
pub use sync::{ContextSynchronizer, SyncOutcome};
