//! Configuration types.
//!
//! All environment reading happens once in `ServiceConfig::from_env`; the
//! rest of the service receives the resolved config at construction time.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Which conversation backend strategy to run.
///
/// Selected at startup; both implement the same event contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    /// Stateful threads: the backend keeps per-thread history and enforces
    /// one turn in flight per thread.
    Threaded,
    /// No thread continuity: each turn is a single request/response
    /// materialized as a stream.
    Stateless,
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Conversation backend strategy.
    pub backend_mode: BackendMode,
    /// Model identifier passed to the completion backend.
    pub model: String,
    /// API key for the completion backend.
    pub api_key: SecretString,
    /// SQLite database path.
    pub db_path: PathBuf,
    /// HTTP listen port.
    pub port: u16,
    /// Bounded wait for a single backend chunk before the stream is
    /// terminated with an `error` event.
    pub turn_timeout: Duration,
    /// Fallback identity used when a request carries no user header.
    /// `None` means unauthenticated requests are rejected.
    pub fallback_identity: Option<String>,
    /// Optional path to a journey catalog TOML file. The embedded default
    /// catalog is used when absent.
    pub catalog_path: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            backend_mode: BackendMode::Threaded,
            model: "claude-sonnet-4-20250514".to_string(),
            api_key: SecretString::from(""),
            db_path: PathBuf::from("./data/questline.db"),
            port: 8080,
            turn_timeout: Duration::from_secs(60),
            fallback_identity: None,
            catalog_path: None,
        }
    }
}

impl ServiceConfig {
    /// Build the config from environment variables.
    ///
    /// `QUESTLINE_API_KEY` is required; everything else has a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("QUESTLINE_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("QUESTLINE_API_KEY".to_string()))?;

        let backend_mode = match std::env::var("QUESTLINE_BACKEND").as_deref() {
            Ok("stateless") => BackendMode::Stateless,
            Ok("threaded") | Err(_) => BackendMode::Threaded,
            Ok(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "QUESTLINE_BACKEND".to_string(),
                    message: format!("expected 'threaded' or 'stateless', got '{other}'"),
                });
            }
        };

        let port = match std::env::var("QUESTLINE_PORT") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "QUESTLINE_PORT".to_string(),
                message: format!("not a valid port: '{raw}'"),
            })?,
            Err(_) => 8080,
        };

        let turn_timeout_secs: u64 = match std::env::var("QUESTLINE_TURN_TIMEOUT_SECS") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "QUESTLINE_TURN_TIMEOUT_SECS".to_string(),
                message: format!("not a number: '{raw}'"),
            })?,
            Err(_) => 60,
        };

        Ok(Self {
            backend_mode,
            model: std::env::var("QUESTLINE_MODEL")
                .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string()),
            api_key: SecretString::from(api_key),
            db_path: std::env::var("QUESTLINE_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data/questline.db")),
            port,
            turn_timeout: Duration::from_secs(turn_timeout_secs),
            fallback_identity: std::env::var("QUESTLINE_FALLBACK_USER").ok(),
            catalog_path: std::env::var("QUESTLINE_CATALOG_PATH").ok().map(PathBuf::from),
        })
    }
}
