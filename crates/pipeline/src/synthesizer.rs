//! Answer synthesis.
//!
//! Builds a bounded context block from the best retrieved passages and asks
//! the completion service for an answer, either in one call or streamed
//! through a [`StreamSanitizer`]. A trusted passage can also be returned
//! verbatim via [`direct_answer`] without any generation.

use crate::sanitizer::{sanitize, strip_record_markers, StreamSanitizer};
use crate::types::RetrieverHit;
use agri_core::{AppError, AppResult, GenerationSettings};
use agri_llm::{LlmClient, LlmRequest, StreamEvent};
use agri_prompt::{build_prompt, BuiltPrompt, PromptDefinition};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// Turn a rendered prompt into a completion request.
pub(crate) fn request_from_prompt(built: BuiltPrompt, model: &str) -> LlmRequest {
    let request = LlmRequest::new(built.user, model);
    match built.system {
        Some(system) => request.with_system(system),
        None => request,
    }
}

fn truncate_passage(content: &str, budget: usize) -> String {
    let content = content.trim();
    if content.chars().count() <= budget {
        return content.to_string();
    }
    let cut: String = content.chars().take(budget).collect();
    format!("{} [truncated]", cut.trim_end())
}

/// Everything the synthesizer needs for one answer.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisInput<'a> {
    pub question: &'a str,
    /// Best curated passage to quote alongside the guidelines. The pipeline
    /// leaves this empty because a passing curated record is answered
    /// verbatim; it is set by callers that synthesize over a record instead.
    pub golden: Option<&'a RetrieverHit>,
    /// Passing guideline passages, best first
    pub pops: &'a [RetrieverHit],
    /// Formatted conversation memory, when the question is a follow-up
    pub conversation: Option<&'a str>,
    pub region: Option<&'a str>,
}

/// Render the reference block: at most one curated passage and
/// `max_pops_passages` guideline passages, each cut to the character budget
/// and annotated with its region and similarity.
pub fn build_context(
    golden: Option<&RetrieverHit>,
    pops: &[RetrieverHit],
    settings: &GenerationSettings,
) -> String {
    golden
        .into_iter()
        .chain(pops.iter().take(settings.max_pops_passages))
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "Passage {} ({}, region: {}, similarity: {:.2}):\n{}",
                i + 1,
                hit.source,
                hit.metadata.region,
                hit.cosine,
                truncate_passage(&hit.content, settings.passage_char_budget)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// A stored passage as a final answer.
pub fn direct_answer(hit: &RetrieverHit) -> String {
    let stripped = strip_record_markers(&hit.content);
    if stripped.is_empty() {
        hit.content.trim().to_string()
    } else {
        stripped
    }
}

/// Completion-backed answer writer.
pub struct AnswerSynthesizer {
    llm: Arc<dyn LlmClient>,
    model: String,
    prompt: PromptDefinition,
}

impl AnswerSynthesizer {
    pub fn new(llm: Arc<dyn LlmClient>, model: impl Into<String>, prompt: PromptDefinition) -> Self {
        Self {
            llm,
            model: model.into(),
            prompt,
        }
    }

    fn request(&self, input: &SynthesisInput<'_>, settings: &GenerationSettings) -> AppResult<LlmRequest> {
        let mut variables = HashMap::new();
        variables.insert("question".to_string(), input.question.to_string());
        variables.insert(
            "context".to_string(),
            build_context(input.golden, input.pops, settings),
        );
        if let Some(conversation) = input.conversation.filter(|c| !c.is_empty()) {
            variables.insert("conversation".to_string(), conversation.to_string());
        }
        if let Some(region) = input.region {
            variables.insert("region".to_string(), region.to_string());
        }

        let built = build_prompt(&self.prompt, variables)
            .map_err(|e| AppError::Synthesis(e.to_string()))?;

        Ok(request_from_prompt(built, &self.model)
            .with_temperature(settings.temperature)
            .with_max_tokens(settings.max_tokens))
    }

    /// Generate an answer in one call.
    pub async fn complete(
        &self,
        input: &SynthesisInput<'_>,
        settings: &GenerationSettings,
    ) -> AppResult<String> {
        let request = self.request(input, settings)?;
        tracing::debug!("Synthesizing answer, prompt {} chars", request.prompt.len());

        let response = self
            .llm
            .complete(&request)
            .await
            .map_err(|e| AppError::Synthesis(e.to_string()))?;

        let answer = sanitize(&response.content);
        if answer.trim().is_empty() {
            return Err(AppError::Synthesis("completion service returned an empty answer".to_string()));
        }
        Ok(answer.trim_end().to_string())
    }

    /// Generate an answer, forwarding sanitized increments to `sink`.
    ///
    /// Returns the full sanitized answer. An error event after some text has
    /// arrived ends the stream early but keeps that text.
    pub async fn stream(
        &self,
        input: &SynthesisInput<'_>,
        settings: &GenerationSettings,
        sink: &UnboundedSender<String>,
    ) -> AppResult<String> {
        let request = self.request(input, settings)?.with_streaming();

        let mut events = self
            .llm
            .stream(&request)
            .await
            .map_err(|e| AppError::Synthesis(e.to_string()))?;

        let mut sanitizer = StreamSanitizer::new();
        let forward = |delta: Option<String>| {
            if let Some(delta) = delta {
                if sink.send(delta).is_err() {
                    tracing::debug!("Stream receiver dropped");
                }
            }
        };

        while let Some(event) = events.next().await {
            match event {
                StreamEvent::Token(token) => forward(sanitizer.push(&token)),
                StreamEvent::Error(message) => {
                    if sanitizer.text().trim().is_empty() {
                        return Err(AppError::Synthesis(message));
                    }
                    tracing::warn!("Stream ended with an error after partial output: {}", message);
                    break;
                }
                // Providers may send more than one terminal event
                StreamEvent::Done(_) => break,
            }
        }
        forward(sanitizer.finish());

        let answer = sanitizer.text();
        if answer.trim().is_empty() {
            return Err(AppError::Synthesis("completion stream produced no answer".to_string()));
        }
        Ok(answer.trim_end().to_string())
    }
}
