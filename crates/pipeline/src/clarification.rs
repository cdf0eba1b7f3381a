//! Clarifying question generation.
//!
//! Advisory only: the generator is asked when no source answered
//! confidently, its output rides along as metadata, and any failure just
//! produces an empty list.

use crate::synthesizer::request_from_prompt;
use agri_core::{AppError, AppResult};
use agri_llm::LlmClient;
use agri_prompt::{build_prompt, PromptDefinition};
use std::collections::HashMap;
use std::sync::Arc;

/// Parse a clarification reply into at most `max` questions.
///
/// Bullets and numbering are stripped, lines not ending in `?` are dropped,
/// duplicates are removed (case-insensitive). A reply of "none" yields an
/// empty list.
pub fn parse_questions(response: &str, max: usize) -> Vec<String> {
    let trimmed = response.trim().trim_end_matches('.');
    if trimmed.eq_ignore_ascii_case("none") {
        return Vec::new();
    }

    let mut questions: Vec<String> = Vec::new();
    for line in response.lines() {
        let line = line
            .trim()
            .trim_start_matches(|c: char| {
                c.is_ascii_digit() || matches!(c, '-' | '*' | '•' | '.' | ')' | '(')
            })
            .trim();

        if line.len() < 2 || !line.ends_with('?') {
            continue;
        }
        if questions.iter().any(|q| q.eq_ignore_ascii_case(line)) {
            continue;
        }
        questions.push(line.to_string());
        if questions.len() >= max {
            break;
        }
    }
    questions
}

/// Follow-up question generator.
pub struct ClarificationGenerator {
    llm: Arc<dyn LlmClient>,
    model: String,
    prompt: PromptDefinition,
}

impl ClarificationGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, model: impl Into<String>, prompt: PromptDefinition) -> Self {
        Self {
            llm,
            model: model.into(),
            prompt,
        }
    }

    /// Suggest up to `max` clarifying questions. Never fails.
    pub async fn generate(
        &self,
        question: &str,
        region: Option<&str>,
        max: usize,
        max_tokens: u32,
    ) -> Vec<String> {
        if max == 0 {
            return Vec::new();
        }

        match self.request(question, region, max, max_tokens).await {
            Ok(questions) => {
                tracing::debug!("Generated {} clarifying questions", questions.len());
                questions
            }
            Err(e) => {
                tracing::warn!("Clarification generation failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn request(
        &self,
        question: &str,
        region: Option<&str>,
        max: usize,
        max_tokens: u32,
    ) -> AppResult<Vec<String>> {
        let mut variables = HashMap::new();
        variables.insert("question".to_string(), question.to_string());
        variables.insert("max".to_string(), max.to_string());
        if let Some(region) = region {
            variables.insert("region".to_string(), region.to_string());
        }

        let built = build_prompt(&self.prompt, variables)?;
        let request = request_from_prompt(built, &self.model)
            .with_temperature(0.2)
            .with_max_tokens(max_tokens);

        let response = self
            .llm
            .complete(&request)
            .await
            .map_err(|e| AppError::Llm(e.to_string()))?;

        Ok(parse_questions(&response.content, max))
    }
}
