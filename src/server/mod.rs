//! HTTP surface — REST endpoints plus the SSE conversation stream.

pub mod auth;
pub mod routes;

pub use routes::{AppState, api_routes};
