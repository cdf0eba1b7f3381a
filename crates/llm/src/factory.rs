//! Completion client factory.
//!
//! Resolves a provider name from configuration into a concrete client.

use crate::client::LlmClient;
use crate::providers::{ollama::DEFAULT_OLLAMA_URL, openai::DEFAULT_OPENAI_URL};
use crate::providers::{OllamaClient, OpenAiClient};
use crate::types::ProviderType;
use agri_core::{AppError, AppResult};
use std::sync::Arc;

/// Create a completion client based on the provider name.
///
/// # Arguments
/// * `provider` - Provider identifier ("ollama", "openai")
/// * `endpoint` - Optional custom endpoint URL
/// * `api_key` - API key, required for OpenAI
///
/// # Errors
/// Returns `AppError::Llm` if the provider is unknown or a required key is
/// missing.
pub fn create_client(
    provider: &str,
    endpoint: Option<&str>,
    api_key: Option<&str>,
) -> AppResult<Arc<dyn LlmClient>> {
    let provider_type = ProviderType::parse(provider)
        .ok_or_else(|| AppError::Llm(format!("Unknown provider: {}", provider)))?;

    match provider_type {
        ProviderType::Ollama => {
            let base_url = endpoint.unwrap_or(DEFAULT_OLLAMA_URL);
            tracing::debug!("Using Ollama at {}", base_url);
            Ok(Arc::new(OllamaClient::with_base_url(base_url)))
        }
        ProviderType::OpenAI => {
            let api_key = api_key.ok_or_else(|| {
                AppError::Llm("OpenAI provider requires API key".to_string())
            })?;
            let base_url = endpoint.unwrap_or(DEFAULT_OPENAI_URL);
            tracing::debug!("Using OpenAI-compatible endpoint {}", base_url);
            Ok(Arc::new(OpenAiClient::with_base_url(base_url, api_key)))
        }
    }
}
