//! Configuration types.
//!
//! Everything is read from the environment once at startup and passed into
//! constructors explicitly. No module reads env vars after boot.

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Path to the libsql database file.
    pub db_path: String,
    /// Bind address for the HTTP server.
    pub bind_addr: String,
    /// Base URL used to build "edit this enquiry" links in acknowledgments.
    pub enquiry_base_url: String,
    /// LLM extraction backend. `None` disables the raw-email ingest endpoint.
    pub llm: Option<LlmConfig>,
    /// Outbound SMTP. `None` disables acknowledgment emails.
    pub mailer: Option<MailerConfig>,
}

impl AppConfig {
    /// Build configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let db_path =
            std::env::var("INTAKE_DB_PATH").unwrap_or_else(|_| "./data/intake.db".to_string());

        let bind_addr =
            std::env::var("INTAKE_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());

        let enquiry_base_url = std::env::var("INTAKE_ENQUIRY_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:8000".to_string());

        Ok(Self {
            db_path,
            bind_addr,
            enquiry_base_url,
            llm: llm_from_env()?,
            mailer: MailerConfig::from_env(),
        })
    }
}

/// Build LLM config from environment variables.
///
/// Returns `Ok(None)` when no API key is set (extraction disabled).
fn llm_from_env() -> Result<Option<LlmConfig>, ConfigError> {
    let backend = match std::env::var("INTAKE_LLM_BACKEND").as_deref() {
        Ok("openai") => LlmBackend::OpenAi,
        Ok("anthropic") | Err(_) => LlmBackend::Anthropic,
        Ok(other) => {
            return Err(ConfigError::InvalidValue {
                key: "INTAKE_LLM_BACKEND".to_string(),
                message: format!("unknown backend '{other}' (expected anthropic or openai)"),
            });
        }
    };

    let key_var = match backend {
        LlmBackend::Anthropic => "ANTHROPIC_API_KEY",
        LlmBackend::OpenAi => "OPENAI_API_KEY",
    };
    let Ok(api_key) = std::env::var(key_var) else {
        return Ok(None);
    };

    let model = std::env::var("INTAKE_LLM_MODEL")
        .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string());

    Ok(Some(LlmConfig {
        backend,
        api_key: SecretString::from(api_key),
        model,
    }))
}

/// Outbound SMTP configuration for acknowledgment emails.
#[derive(Debug, Clone)]
pub struct MailerConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl MailerConfig {
    /// Build config from environment variables.
    /// Returns `None` if `INTAKE_SMTP_HOST` is not set (acknowledgments disabled).
    pub fn from_env() -> Option<Self> {
        let smtp_host = std::env::var("INTAKE_SMTP_HOST").ok()?;

        let smtp_port: u16 = std::env::var("INTAKE_SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = std::env::var("INTAKE_SMTP_USERNAME").unwrap_or_default();
        let password = SecretString::from(std::env::var("INTAKE_SMTP_PASSWORD").unwrap_or_default());
        let from_address =
            std::env::var("INTAKE_SMTP_FROM").unwrap_or_else(|_| username.clone());

        Some(Self {
            smtp_host,
            smtp_port,
            username,
            password,
            from_address,
        })
    }
}
