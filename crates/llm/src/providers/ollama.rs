//! Ollama completion provider.
//!
//! Ollama API: https://github.com/ollama/ollama/blob/main/docs/api.md

use super::line_events;
use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmUsage, StreamEvent};
use agri_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::instrument;

/// Default Ollama endpoint.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Ollama API request format.
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize, Default)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// Ollama API response format (one object, or one NDJSON line when streaming).
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

impl OllamaResponse {
    fn usage(&self) -> LlmUsage {
        LlmUsage::new(
            self.prompt_eval_count.unwrap_or(0),
            self.eval_count.unwrap_or(0),
        )
    }
}

/// Ollama completion client.
pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaClient {
    /// Create a client for the default local endpoint.
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_OLLAMA_URL)
    }

    /// Create a client for a custom endpoint.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a client with an explicit request timeout.
    ///
    /// A timed-out call surfaces as an `AppError::Llm`, which callers turn
    /// into their own fallback output.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build Ollama HTTP client with timeout: {}", e);
                reqwest::Client::new()
            });

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    fn to_ollama_request(&self, request: &LlmRequest, stream: bool) -> OllamaRequest {
        OllamaRequest {
            model: request.model.clone(),
            prompt: request.prompt.clone(),
            system: request.system.clone(),
            stream,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        }
    }

    async fn post(&self, request: &OllamaRequest) -> AppResult<reqwest::Response> {
        let url = format!("{}/api/generate", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to send request to Ollama: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Llm(format!(
                "Ollama API error ({}): {}",
                status, error_text
            )));
        }

        Ok(response)
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert one NDJSON line into stream events.
fn parse_stream_line(line: &str) -> Vec<StreamEvent> {
    let chunk: OllamaResponse = match serde_json::from_str(line) {
        Ok(chunk) => chunk,
        Err(e) => return vec![StreamEvent::Error(format!("Failed to parse chunk: {}", e))],
    };

    if let Some(error) = chunk.error {
        return vec![StreamEvent::Error(error)];
    }

    let mut events = Vec::with_capacity(2);
    if !chunk.response.is_empty() {
        events.push(StreamEvent::Token(chunk.response.clone()));
    }
    if chunk.done {
        events.push(StreamEvent::Done(Some(chunk.usage())));
    }
    events
}

#[async_trait::async_trait]
impl LlmClient for OllamaClient {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    #[instrument(skip(self, request), fields(model = %request.model, prompt_len = request.prompt.len()))]
    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        tracing::debug!("Sending completion request to Ollama");

        let body = self.to_ollama_request(request, false);
        let response = self.post(&body).await?;

        let parsed: OllamaResponse = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse Ollama response: {}", e)))?;

        if let Some(error) = parsed.error {
            return Err(AppError::Llm(format!("Ollama returned an error: {}", error)));
        }

        tracing::debug!("Received {} chars from Ollama", parsed.response.len());

        Ok(LlmResponse {
            usage: parsed.usage(),
            content: parsed.response,
            model: parsed.model,
        })
    }

    #[instrument(skip(self, request), fields(model = %request.model, prompt_len = request.prompt.len()))]
    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        tracing::debug!("Starting streaming request to Ollama");

        let body = self.to_ollama_request(request, true);
        let response = self.post(&body).await?;

        Ok(line_events(
            Box::pin(response.bytes_stream()),
            parse_stream_line,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_client_creation() {
        let client = OllamaClient::new();
        assert_eq!(client.provider_name(), "ollama");
        assert_eq!(client.base_url, DEFAULT_OLLAMA_URL);

        let client = OllamaClient::with_base_url("http://gpu-box:11434/");
        assert_eq!(client.base_url, "http://gpu-box:11434");
    }

    #[test]
    fn test_ollama_request_conversion() {
        let client = OllamaClient::new();
        let request = LlmRequest::new("Hello", "llama3.2")
            .with_temperature(0.0)
            .with_max_tokens(4);

        let body = client.to_ollama_request(&request, false);
        assert_eq!(body.model, "llama3.2");
        assert_eq!(body.prompt, "Hello");
        assert_eq!(body.options.temperature, Some(0.0));
        assert_eq!(body.options.num_predict, Some(4));

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["options"]["num_predict"], 4);
        assert!(json.get("system").is_none());
    }

    #[test]
    fn test_parse_stream_line() {
        let events = parse_stream_line(r#"{"model":"m","response":"Sow ","done":false}"#);
        assert_eq!(events, vec![StreamEvent::Token("Sow ".to_string())]);

        let events = parse_stream_line(
            r#"{"model":"m","response":"","done":true,"prompt_eval_count":10,"eval_count":5}"#,
        );
        assert_eq!(events, vec![StreamEvent::Done(Some(LlmUsage::new(10, 5)))]);

        let events = parse_stream_line(r#"{"error":"model not found"}"#);
        assert_eq!(events, vec![StreamEvent::Error("model not found".to_string())]);

        let events = parse_stream_line("not json");
        assert!(matches!(&events[0], StreamEvent::Error(_)));
    }
}
