//! Error types for Questline.

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    /// No resolvable user identity and no permitted fallback identity.
    #[error("Unauthorized")]
    Unauthorized,

    /// The entity does not exist or does not belong to the caller.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A required field is missing or malformed; the client must correct
    /// and resend.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The operation was already performed (e.g. task already completed).
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl Error {
    /// Stable wire discriminator for the structured error payload.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::Database(_) => "database_error",
            Self::Llm(_) => "llm_error",
            Self::Stream(_) => "stream_error",
            Self::Unauthorized => "unauthorized",
            Self::NotFound { .. } => "not_found",
            Self::Validation(_) => "validation_error",
            Self::Conflict(_) => "conflict",
        }
    }

    /// Message safe to put in the client-facing error payload. Internal
    /// failure detail stays in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::Conflict(m) | Self::Validation(m) => m.clone(),
            Self::NotFound { entity, id } => format!("{entity} not found: {id}"),
            Self::Unauthorized => "Unauthorized".to_string(),
            Self::Config(_) | Self::Database(_) | Self::Llm(_) | Self::Stream(_) => {
                "Internal error".to_string()
            }
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse catalog: {0}")]
    CatalogParse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    /// Conditional update lost the race: the stored row version did not
    /// match the expected one.
    #[error("Version conflict on {entity} with key {key}")]
    VersionConflict { entity: String, key: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// LLM transport errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Request to {provider} failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Rate limited by {provider}")]
    RateLimited { provider: String },

    #[error("Malformed response from {provider}: {reason}")]
    MalformedResponse { provider: String, reason: String },
}

/// Stream orchestration errors.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// A turn is already executing on this thread.
    #[error("Thread {0} has a turn in flight")]
    ThreadBusy(String),

    #[error("Backend timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Backend stream failed: {0}")]
    Backend(String),
}
