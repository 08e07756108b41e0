//! Streaming conversation orchestration.
//!
//! Multiplexes the completion backend's chunks into the normalized wire
//! protocol while managing thread continuity and cancellation.

pub mod backend;
pub mod events;
pub mod opening;
pub mod orchestrator;

pub use backend::{ChatBackend, StatelessBackend, ThreadedBackend, TurnRequest, create_backend};
pub use events::StreamEvent;
pub use opening::{helper_system_prompt, opening_prompt};
pub use orchestrator::{StreamOrchestrator, TurnKind, TurnParams};
