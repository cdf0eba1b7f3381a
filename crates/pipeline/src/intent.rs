//! Domain intent classification.
//!
//! The whole pipeline is gated on the question being agricultural. A
//! keyword/pattern table decides most questions for free; only when it
//! misses is the completion service asked for a one-word label. Any failure
//! of that call leaves the heuristic result standing.

use crate::entities::{extract_entities, EntityCategory};
use crate::synthesizer::request_from_prompt;
use crate::types::IntentDecision;
use agri_core::{AppError, AppResult, PipelineConfig};
use agri_llm::LlmClient;
use agri_prompt::{build_prompt, PromptDefinition};
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

/// Domain vocabulary beyond the entity table.
static DOMAIN_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)\b(
            agri\w* | agro\w* | farm\w* | cultivat\w* | soils? | irrigat\w*
            | sow | sowing | sown | seedlings? | fertili[sz]\w* | pesticides? | insecticides?
            | fungicides? | herbicides? | weedicides? | pests? | plant\s+diseases?
            | livestock | cattle | cows? | buffalo\w* | goats? | poultry | dairy
            | fodder | veterinar\w* | fisher\w* | aquaculture | tractors? | mandi | msp
            | kisan | horticultur\w* | orchards? | greenhouses? | plough\w*
            | tillage | agronom\w* | compost\w* | manure | kvk | germinat\w*
        )\b",
    )
    .inspect_err(|e| tracing::error!("Invalid domain pattern: {}", e))
    .ok()
});

/// Words that are agricultural in context but common elsewhere ("organic
/// chemistry", "random seed", "image crop").
static AMBIGUOUS_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)\b(
            crops? | seeds? | yields? | harvest\w* | weeds? | sheep | organic | nursery
        )\b",
    )
    .inspect_err(|e| tracing::error!("Invalid ambiguous domain pattern: {}", e))
    .ok()
});

/// Entity terms that alone do not make a question agricultural.
const AMBIGUOUS_ENTITIES: &[&str] = &[
    "rust", "blast", "rat", "mite", "mosaic", "canker", "smut", "wilt", "caterpillar", "tea",
    "coffee", "gram", "ginger", "garlic", "corn", "nitrogen", "phosphorus", "potassium",
    "sulphur", "boron", "mop", "pruning", "grafting", "harvesting", "spraying",
];

/// Entity categories that on their own signal an agricultural question.
/// Regions and seasons are too generic ("weather in Delhi in winter").
const DOMAIN_CATEGORIES: &[EntityCategory] = &[
    EntityCategory::Crops,
    EntityCategory::Diseases,
    EntityCategory::Pests,
    EntityCategory::Fertilizers,
    EntityCategory::Techniques,
];

/// Strength of the keyword evidence that a text is agricultural.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DomainSignal {
    None,
    /// Only ambiguous terms matched
    Weak,
    Strong,
}

/// Grade a text against the domain keyword tables.
pub fn domain_signal(text: &str) -> DomainSignal {
    if DOMAIN_PATTERN.as_ref().is_some_and(|re| re.is_match(text)) {
        return DomainSignal::Strong;
    }

    let entities = extract_entities(text);
    let mut terms = entities
        .iter()
        .filter(|(category, _)| DOMAIN_CATEGORIES.contains(category))
        .flat_map(|(_, terms)| terms.iter())
        .peekable();

    let mut signal = DomainSignal::None;
    if terms.peek().is_some() {
        if terms.any(|term| !AMBIGUOUS_ENTITIES.contains(&term.as_str())) {
            return DomainSignal::Strong;
        }
        signal = DomainSignal::Weak;
    }

    if AMBIGUOUS_PATTERN.as_ref().is_some_and(|re| re.is_match(text)) {
        signal = DomainSignal::Weak;
    }
    signal
}

/// Whether a text matches the domain keyword table unambiguously.
pub fn heuristic_match(text: &str) -> bool {
    domain_signal(text) == DomainSignal::Strong
}

/// Parse a classifier reply into a label.
///
/// Only the first word counts: yes/true/agri(-culture, -cultural) mean
/// agricultural; no/false/non-agri/other mean not. Anything else is unknown.
pub fn parse_label(response: &str) -> Option<bool> {
    let first = response.split_whitespace().next()?;
    let token = first
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();

    match token.as_str() {
        "yes" | "true" | "agri" | "agriculture" | "agricultural" => Some(true),
        "no" | "false" | "non-agri" | "nonagri" | "non-agricultural" | "other" => Some(false),
        _ => None,
    }
}

/// Heuristic plus completion-service intent classifier.
pub struct IntentClassifier {
    llm: Arc<dyn LlmClient>,
    model: String,
    prompt: PromptDefinition,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LlmClient>, model: impl Into<String>, prompt: PromptDefinition) -> Self {
        Self {
            llm,
            model: model.into(),
            prompt,
        }
    }

    /// Classify a question.
    ///
    /// An unambiguous keyword match decides on its own. Anything else goes
    /// to the classifier, with the previous question as context for a
    /// follow-up. With the classifier disabled, ambiguous terms and the
    /// domain of an earlier agricultural question are accepted instead. A
    /// failed or unparsable classifier call leaves only the unambiguous
    /// match standing.
    pub async fn classify(
        &self,
        question: &str,
        previous: Option<&str>,
        follow_up: bool,
        config: &PipelineConfig,
    ) -> IntentDecision {
        let previous = previous.filter(|_| follow_up);
        let signal = domain_signal(question);

        let mut decision = IntentDecision {
            heuristic: signal == DomainSignal::Strong,
            llm: None,
            follow_up,
        };
        if decision.heuristic {
            return decision;
        }

        if !config.llm_intent_enabled {
            let carried = previous.is_some_and(|p| domain_signal(p) != DomainSignal::None);
            if signal == DomainSignal::Weak || carried {
                tracing::debug!("Classifier disabled, accepting {:?} signal (carried: {})", signal, carried);
                decision.heuristic = true;
            }
            return decision;
        }

        decision.llm = match self
            .ask(question, previous, config.generation.intent_max_tokens)
            .await
        {
            Ok(label) => label,
            Err(e) => {
                tracing::warn!("{}; using heuristic result", e);
                None
            }
        };

        tracing::debug!("Intent decision: {:?} (signal {:?})", decision, signal);
        decision
    }

    async fn ask(
        &self,
        question: &str,
        previous: Option<&str>,
        max_tokens: u32,
    ) -> AppResult<Option<bool>> {
        let mut variables = HashMap::new();
        variables.insert("question".to_string(), question.to_string());
        if let Some(previous) = previous {
            variables.insert("previous_question".to_string(), previous.to_string());
        }

        let built = build_prompt(&self.prompt, variables)
            .map_err(|e| AppError::IntentClassification(e.to_string()))?;
        let request = request_from_prompt(built, &self.model)
            .with_temperature(0.0)
            .with_max_tokens(max_tokens);

        let response = self
            .llm
            .complete(&request)
            .await
            .map_err(|e| AppError::IntentClassification(e.to_string()))?;

        let label = parse_label(&response.content);
        if label.is_none() {
            tracing::debug!("Unparsable intent label: {:?}", response.content);
        }
        Ok(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heuristic_matches_domain_questions() {
        assert!(heuristic_match("What is the seed rate for wheat in Punjab?"));
        assert!(heuristic_match("How to control whitefly?"));
        assert!(heuristic_match("Dairy cattle feeding schedule"));
        assert!(heuristic_match("DAP or urea first?"));
    }

    #[test]
    fn test_heuristic_rejects_other_questions() {
        assert!(!heuristic_match("What's the capital of France?"));
        assert!(!heuristic_match("Weather in Delhi this winter"));
        assert!(!heuristic_match("Write a poem about the sea"));
    }

    #[test]
    fn test_ambiguous_terms_are_weak() {
        assert_eq!(domain_signal("How do I learn the Rust programming language?"), DomainSignal::Weak);
        assert_eq!(domain_signal("Best coffee shop in Paris?"), DomainSignal::Weak);
        assert_eq!(domain_signal("Tips for my organic chemistry exam"), DomainSignal::Weak);
        assert_eq!(domain_signal("Set a random seed for the test"), DomainSignal::Weak);
        assert_eq!(domain_signal("Is there a rat in the attic?"), DomainSignal::Weak);
        assert!(!heuristic_match("How do I learn the Rust programming language?"));
    }

    #[test]
    fn test_ambiguous_terms_in_context_are_strong() {
        assert_eq!(domain_signal("Yellow rust on wheat leaves"), DomainSignal::Strong);
        assert_eq!(domain_signal("Blast in paddy after heavy rain"), DomainSignal::Strong);
        assert_eq!(domain_signal("Organic farming subsidy"), DomainSignal::Strong);
        assert_eq!(domain_signal("Tea garden soil pH"), DomainSignal::Strong);
        assert_eq!(domain_signal("What's the capital of France?"), DomainSignal::None);
    }

    #[test]
    fn test_parse_label() {
        assert_eq!(parse_label("Yes"), Some(true));
        assert_eq!(parse_label(" yes."), Some(true));
        assert_eq!(parse_label("TRUE"), Some(true));
        assert_eq!(parse_label("agricultural"), Some(true));
        assert_eq!(parse_label("No, it is about geography"), Some(false));
        assert_eq!(parse_label("non-agri"), Some(false));
        assert_eq!(parse_label("Other"), Some(false));
        assert_eq!(parse_label("Maybe"), None);
        assert_eq!(parse_label(""), None);
    }
}
