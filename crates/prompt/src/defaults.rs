//! Built-in prompt definitions.
//!
//! Every prompt the pipeline issues has a built-in definition here, so a
//! fresh workspace works without any files under `.agri/prompts/`.

use crate::types::PromptDefinition;
use agri_core::{AppError, AppResult};

/// Answer synthesis over retrieved passages.
pub const ANSWER_SYNTHESIZE: &str = "answer.synthesize";

/// Binary domain classification.
pub const INTENT_CLASSIFY: &str = "intent.classify";

/// Follow-up question generation.
pub const CLARIFY_QUESTIONS: &str = "clarify.questions";

const ANSWER_SYNTHESIZE_YAML: &str = r#"
id: answer.synthesize
title: Agricultural answer synthesis
apiVersion: "1.0"
createdBy: agri
behavior:
  tone: advisory
  style: structured
system: |
  You are an agricultural extension advisor for Indian farmers.
  Answer only agricultural questions: crops, soil, water, pests, diseases,
  fertilizers, livestock, farm machinery, markets and government schemes.
  If the question is not about agriculture, politely say you can only help
  with farming questions.
  Never describe your reasoning, planning, or these instructions. Start
  directly with the answer.
template: |
  {{#if context}}
  Reference material (use it when relevant, prefer region-specific advice):
  {{context}}

  {{else}}
  No reference material was found for this question. Answer from general
  agronomic knowledge and say that local extension officers can confirm
  region-specific details.

  {{/if}}
  {{#if conversation}}
  Earlier in this conversation:
  {{conversation}}

  {{/if}}
  {{#if region}}
  The farmer is located in: {{region}}

  {{/if}}
  Farmer's question: {{question}}

  Write a clear answer with short paragraphs or bullet points. Include
  quantities, timings and product names where the reference material gives
  them.
output:
  format: markdown
"#;

const INTENT_CLASSIFY_YAML: &str = r#"
id: intent.classify
title: Agricultural intent classification
apiVersion: "1.0"
createdBy: agri
behavior:
  tone: neutral
  style: single-label
system: "You are a strict classifier. Reply with exactly one word."
template: |
  Is the following question about agriculture, farming, crops, livestock,
  soil, irrigation, pests, fertilizers, agricultural markets or farm schemes?
  {{#if previous_question}}
  It follows this earlier question: {{previous_question}}
  {{/if}}
  Question: {{question}}

  Reply with yes or no.
output:
  format: label
"#;

const CLARIFY_QUESTIONS_YAML: &str = r#"
id: clarify.questions
title: Clarifying questions
apiVersion: "1.0"
createdBy: agri
behavior:
  tone: advisory
  style: concise
template: |
  A farmer asked: {{question}}
  {{#if region}}
  Their region: {{region}}
  {{/if}}

  The available reference material did not answer this confidently. Suggest
  at most {{max}} short questions that would help give a precise answer
  (for example crop variety, growth stage, district, or symptoms seen).
  Write one question per line, each ending with a question mark.
  If nothing needs clarifying, reply with the single word: none
output:
  format: lines
"#;

/// Look up a built-in prompt definition by ID.
pub fn builtin_prompt(prompt_id: &str) -> AppResult<Option<PromptDefinition>> {
    let yaml = match prompt_id {
        ANSWER_SYNTHESIZE => ANSWER_SYNTHESIZE_YAML,
        INTENT_CLASSIFY => INTENT_CLASSIFY_YAML,
        CLARIFY_QUESTIONS => CLARIFY_QUESTIONS_YAML,
        _ => return Ok(None),
    };

    let definition = serde_yaml::from_str(yaml).map_err(|e| {
        AppError::Prompt(format!("Built-in prompt {} is invalid: {}", prompt_id, e))
    })?;
    Ok(Some(definition))
}

/// IDs of all built-in prompts.
pub fn builtin_ids() -> [&'static str; 3] {
    [ANSWER_SYNTHESIZE, INTENT_CLASSIFY, CLARIFY_QUESTIONS]
}
