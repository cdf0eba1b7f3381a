//! OpenAI-compatible chat completions provider.
//!
//! Works against api.openai.com and any server exposing the same
//! `/v1/chat/completions` surface (vLLM, llama.cpp server, LM Studio).

use super::line_events;
use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmUsage, StreamEvent};
use agri_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::instrument;

/// Default OpenAI endpoint.
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";

const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ChatContent>,
    #[serde(default)]
    delta: Option<ChatContent>,
}

#[derive(Debug, Deserialize)]
struct ChatContent {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl From<ChatUsage> for LlmUsage {
    fn from(usage: ChatUsage) -> Self {
        LlmUsage::new(usage.prompt_tokens, usage.completion_tokens)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// OpenAI-compatible completion client.
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiClient {
    /// Create a client for api.openai.com.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(DEFAULT_OPENAI_URL, api_key)
    }

    /// Create a client for a compatible server.
    pub fn with_base_url(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build OpenAI HTTP client with timeout: {}", e);
                reqwest::Client::new()
            });

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    fn to_chat_request(&self, request: &LlmRequest, stream: bool) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system",
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: request.prompt.clone(),
        });

        ChatRequest {
            model: request.model.clone(),
            messages,
            stream,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }

    async fn post(&self, body: &ChatRequest) -> AppResult<reqwest::Response> {
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to send request to OpenAI: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|env| env.error.message)
                .unwrap_or(text);
            return Err(AppError::Llm(format!(
                "OpenAI API error ({}): {}",
                status, message
            )));
        }

        Ok(response)
    }
}

/// Convert one server-sent-events line into stream events.
///
/// Only `data:` lines carry payloads; comments and `event:` lines are skipped.
fn parse_sse_line(line: &str) -> Vec<StreamEvent> {
    let Some(data) = line.strip_prefix("data:") else {
        return Vec::new();
    };
    let data = data.trim();

    if data == "[DONE]" {
        return vec![StreamEvent::Done(None)];
    }

    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(data) {
        return vec![StreamEvent::Error(envelope.error.message)];
    }

    let chunk: ChatResponse = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => return vec![StreamEvent::Error(format!("Failed to parse chunk: {}", e))],
    };

    let mut events = Vec::new();
    for choice in chunk.choices {
        if let Some(text) = choice.delta.and_then(|d| d.content) {
            if !text.is_empty() {
                events.push(StreamEvent::Token(text));
            }
        }
    }
    if let Some(usage) = chunk.usage {
        events.push(StreamEvent::Done(Some(usage.into())));
    }
    events
}

#[async_trait::async_trait]
impl LlmClient for OpenAiClient {
    fn provider_name(&self) -> &str {
        "openai"
    }

    #[instrument(skip(self, request), fields(model = %request.model, prompt_len = request.prompt.len()))]
    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        tracing::debug!("Sending completion request to OpenAI");

        let body = self.to_chat_request(request, false);
        let response = self.post(&body).await?;

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse OpenAI response: {}", e)))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .ok_or_else(|| AppError::Llm("OpenAI response contained no choices".to_string()))?;

        Ok(LlmResponse {
            content,
            model: parsed.model,
            usage: parsed.usage.map(LlmUsage::from).unwrap_or_default(),
        })
    }

    #[instrument(skip(self, request), fields(model = %request.model, prompt_len = request.prompt.len()))]
    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        tracing::debug!("Starting streaming request to OpenAI");

        let body = self.to_chat_request(request, true);
        let response = self.post(&body).await?;

        Ok(line_events(Box::pin(response.bytes_stream()), parse_sse_line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_includes_system() {
        let client = OpenAiClient::new("sk-test");
        let request = LlmRequest::new("When to sow wheat?", "gpt-4o-mini")
            .with_system("You are an agronomist")
            .with_temperature(0.3);

        let body = client.to_chat_request(&request, true);
        assert_eq!(body.messages.len(), 2);
        assert_eq!(body.messages[0].role, "system");
        assert_eq!(body.messages[1].content, "When to sow wheat?");
        assert!(body.stream);

        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn test_parse_sse_delta() {
        let events =
            parse_sse_line(r#"data: {"model":"m","choices":[{"delta":{"content":"Irrigate"}}]}"#);
        assert_eq!(events, vec![StreamEvent::Token("Irrigate".to_string())]);
    }

    #[test]
    fn test_parse_sse_control_lines() {
        assert_eq!(parse_sse_line("data: [DONE]"), vec![StreamEvent::Done(None)]);
        assert!(parse_sse_line(": keep-alive").is_empty());
        assert!(parse_sse_line("event: ping").is_empty());

        let events = parse_sse_line(r#"data: {"error":{"message":"rate limited"}}"#);
        assert_eq!(events, vec![StreamEvent::Error("rate limited".to_string())]);
    }

    #[test]
    fn test_parse_sse_usage_chunk() {
        let events = parse_sse_line(
            r#"data: {"choices":[],"usage":{"prompt_tokens":7,"completion_tokens":3}}"#,
        );
        assert_eq!(events, vec![StreamEvent::Done(Some(LlmUsage::new(7, 3)))]);
    }
}
