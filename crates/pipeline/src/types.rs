//! Request, result, and diagnostic types shared across the pipeline.

use agri_core::ConfigOverrides;
use agri_knowledge::DocumentMetadata;
use serde::{Deserialize, Serialize};

/// Where an answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceLabel {
    /// Curated question/answer collection
    Golden,
    /// Package-of-practices collection
    #[serde(rename = "PoPs")]
    Pops,
    /// Generated without an accepted passage
    #[serde(rename = "LLM")]
    Llm,
    /// Out-of-domain refusal
    Refusal,
    /// Completion service unavailable
    Fallback,
}

impl SourceLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Golden => "Golden",
            Self::Pops => "PoPs",
            Self::Llm => "LLM",
            Self::Refusal => "Refusal",
            Self::Fallback => "Fallback",
        }
    }
}

impl std::fmt::Display for SourceLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One question/answer turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub question: String,
    pub answer: String,
}

impl Exchange {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// A question submitted to the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineRequest {
    pub question: String,

    /// Earlier turns, oldest first
    pub history: Vec<Exchange>,

    /// Region the user declared (state or district)
    pub user_region: Option<String>,

    /// Request-scoped configuration adjustments
    pub overrides: ConfigOverrides,
}

impl PipelineRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Default::default()
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.user_region = Some(region.into());
        self
    }

    pub fn with_history(mut self, history: Vec<Exchange>) -> Self {
        self.history = history;
        self
    }

    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        self.overrides = overrides;
        self
    }
}

/// A retrieved passage with independently recomputed similarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrieverHit {
    pub source: SourceLabel,

    /// Passage text (never empty)
    pub content: String,

    pub metadata: DocumentMetadata,

    /// The index's native distance
    pub distance: f32,

    /// Cosine similarity between the query and passage embeddings
    pub cosine: f32,

    /// Region filter the hit was found under
    pub region_used: String,
}

/// Why a source did or did not supply the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceOutcome {
    #[default]
    NotConsulted,
    Disabled,
    /// A higher-priority source already answered
    Skipped,
    NoResults,
    BelowThreshold,
    FilteredByKeywords,
    Accepted,
}

/// Per-source retrieval diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceDiagnostics {
    pub attempted: bool,
    pub regions_tried: Vec<String>,
    pub region_used: Option<String>,
    pub candidates: usize,
    pub best_cosine: Option<f32>,
    pub best_distance: Option<f32>,
    /// Hits that passed thresholds but failed the keyword gate
    pub filtered_for_context: usize,
    pub outcome: SourceOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub golden: SourceDiagnostics,
    pub pops: SourceDiagnostics,
}

/// Result of the intent check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentDecision {
    /// Keyword table matched
    pub heuristic: bool,

    /// Classifier label; `None` when not asked or unparsable
    pub llm: Option<bool>,

    /// Question was treated as a follow-up to the previous turn
    pub follow_up: bool,
}

impl IntentDecision {
    pub fn is_agricultural(&self) -> bool {
        self.heuristic || self.llm == Some(true)
    }
}

/// Non-answer details attached to a result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<IntentDecision>,

    /// Region filters in the order they were tried
    pub regions: Vec<String>,

    /// Sources that returned candidates
    pub retrieved_sources: Vec<SourceLabel>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Diagnostics>,

    /// Synthesis ran without any accepted passage
    pub context_note: bool,

    /// Conversation memory was attached to the prompt
    pub conversation_attached: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_error: Option<String>,
}

/// The pipeline's answer to one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub answer: String,
    pub source: SourceLabel,

    /// Cosine of the passage the answer rests on (0.0 when none)
    pub similarity: f32,

    /// Distance of that passage
    pub distance: Option<f32>,

    pub metadata: ResultMetadata,

    /// Ordered reasoning trace
    pub trace: Vec<String>,

    pub clarifying_questions: Vec<String>,
}

impl PipelineResult {
    pub fn new(answer: impl Into<String>, source: SourceLabel) -> Self {
        Self {
            answer: answer.into(),
            source,
            similarity: 0.0,
            distance: None,
            metadata: ResultMetadata::default(),
            trace: Vec::new(),
            clarifying_questions: Vec::new(),
        }
    }

    pub(crate) fn with_hit(mut self, hit: &RetrieverHit) -> Self {
        self.similarity = hit.cosine;
        self.distance = Some(hit.distance);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_label_serialization() {
        assert_eq!(serde_json::to_value(SourceLabel::Pops).unwrap(), "PoPs");
        assert_eq!(serde_json::to_value(SourceLabel::Llm).unwrap(), "LLM");
        assert_eq!(serde_json::to_value(SourceLabel::Golden).unwrap(), "Golden");

        let back: SourceLabel = serde_json::from_str("\"PoPs\"").unwrap();
        assert_eq!(back, SourceLabel::Pops);
        assert_eq!(SourceLabel::Refusal.to_string(), "Refusal");
    }

    #[test]
    fn test_intent_decision_is_or() {
        let decision = IntentDecision {
            heuristic: false,
            llm: Some(true),
            follow_up: false,
        };
        assert!(decision.is_agricultural());

        let decision = IntentDecision {
            heuristic: false,
            llm: None,
            follow_up: false,
        };
        assert!(!decision.is_agricultural());
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let request: PipelineRequest =
            serde_json::from_str(r#"{"question": "When to sow wheat?"}"#).unwrap();
        assert!(request.history.is_empty());
        assert!(request.overrides.is_empty());
        assert!(request.user_region.is_none());
    }
}
