//! Error types for the intake backend.

use uuid::Uuid;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Duplicate enquiry detected ({original})")]
    Duplicate { original: Uuid },

    #[error("Extraction error: {0}")]
    Llm(#[from] LlmError),

    #[error("Notification error: {0}")]
    Notify(String),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Persistence errors. Any failure mid-assembly rolls the whole transaction back.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Request validation errors (strict portal path).
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid enquiry date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Invalid enquiry time '{0}': expected HH:MM")]
    InvalidTime(String),

    #[error("Invalid value '{value}' for {field}")]
    InvalidField { field: &'static str, value: String },

    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

/// LLM provider and extraction errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from model: {0}")]
    InvalidResponse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Stable machine-readable code for HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "err_not_found",
            Self::Duplicate { .. } => "err_duplicate",
            Self::Validation(_) => "err_invalid_input",
            Self::Database(_) => "err_persistence",
            Self::Config(_) => "err_config",
            Self::Llm(_) => "err_extraction",
            Self::Notify(_) => "err_notify",
        }
    }
}

/// Result type alias for the intake backend.
pub type Result<T> = std::result::Result<T, Error>;
