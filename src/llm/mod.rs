//! LLM integration for email extraction.
//!
//! Supports:
//! - **Anthropic**: Direct API access via rig-core
//! - **OpenAI**: Direct API access via rig-core
//!
//! The rig-core agent is wrapped behind the narrow `LlmProvider` trait so the
//! extraction pipeline can be tested with a canned provider.

pub mod extract;

pub use extract::{EnquiryExtractor, ExtractedCustomer, ExtractedEnquiry, ExtractedPayload};

use std::sync::Arc;

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use secrecy::ExposeSecret;

use crate::error::LlmError;

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
}

/// Minimal completion interface the extractor needs.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a single prompt and return the model's text reply.
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;

    /// The configured model name.
    fn model_name(&self) -> &str;
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.backend {
        LlmBackend::Anthropic => create_anthropic_provider(config),
        LlmBackend::OpenAi => create_openai_provider(config),
    }
}

fn create_anthropic_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "anthropic".to_string(),
                reason: format!("Failed to create Anthropic client: {}", e),
            }
        })?;

    let agent = client.agent(&config.model).build();
    tracing::info!("Using Anthropic (model: {})", config.model);
    Ok(Arc::new(RigProvider {
        agent,
        provider: "anthropic",
        model: config.model.clone(),
    }))
}

fn create_openai_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "openai".to_string(),
                reason: format!("Failed to create OpenAI client: {}", e),
            }
        })?;

    let agent = client.agent(&config.model).build();
    tracing::info!("Using OpenAI (model: {})", config.model);
    Ok(Arc::new(RigProvider {
        agent,
        provider: "openai",
        model: config.model.clone(),
    }))
}

/// Bridges a rig agent to the `LlmProvider` trait.
struct RigProvider<M: rig::completion::CompletionModel> {
    agent: rig::agent::Agent<M>,
    provider: &'static str,
    model: String,
}

#[async_trait]
impl<M: rig::completion::CompletionModel> LlmProvider for RigProvider<M> {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.agent
            .prompt(prompt)
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: self.provider.to_string(),
                reason: e.to_string(),
            })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_provider_with_test_key_constructs() {
        // rig-core clients accept any string as API key at construction time;
        // the actual auth failure happens when making a request.
        let config = LlmConfig {
            backend: LlmBackend::Anthropic,
            api_key: secrecy::SecretString::from("test-key"),
            model: "claude-sonnet-4-20250514".to_string(),
        };
        let provider = create_provider(&config);
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().model_name(), "claude-sonnet-4-20250514");
    }

    #[tokio::test]
    async fn create_openai_provider_constructs() {
        let config = LlmConfig {
            backend: LlmBackend::OpenAi,
            api_key: secrecy::SecretString::from("sk-test"),
            model: "gpt-4o".to_string(),
        };
        let provider = create_provider(&config);
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().model_name(), "gpt-4o");
    }
}
