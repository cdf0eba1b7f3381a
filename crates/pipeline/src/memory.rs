//! Conversation memory.
//!
//! A [`ConversationContext`] lives for one session and is mutated once per
//! turn by the caller (it takes `&mut self`, so one writer at a time is
//! enforced by the borrow checker). It keeps a bounded window of recent
//! question/answer pairs, a per-turn digest of every turn, and the set of
//! entities the session has touched. Entity sets only ever grow.
//!
//! How much of that reaches the prompt depends on the [`MemoryStrategy`]:
//! - `Buffer`: recent pairs verbatim, newer pairs quoted at more length
//! - `Summary`: an entity/topic digest of all turns, no verbatim text
//! - `Hybrid`: digest of all but the last `hybrid_buffer` turns, plus those
//!   turns verbatim
//! - `Auto`: `Buffer` below `summary_threshold` turns, `Hybrid` from then on

use crate::entities::{extract_entities, merge_entities, EntityCategory, EntityMap};
use crate::keywords::extract_keywords;
use crate::types::Exchange;
use agri_core::{MemorySettings, MemoryStrategy};
use std::collections::VecDeque;
use std::ops::RangeInclusive;

/// Characters per token assumed by [`estimate_tokens`].
pub const CHARS_PER_TOKEN: usize = 4;

/// Answer quote lengths by recency: newest pair, second newest, older.
const RECENCY_QUOTES: [usize; 3] = [600, 300, 150];

/// Quotes are never shortened below this.
const MIN_QUOTE_CHARS: usize = 80;

const QUESTION_CHARS: usize = 200;
const TOPIC_CHARS: usize = 60;
const SUMMARY_TOPICS: usize = 6;

const SHORT_QUERY_WORDS: usize = 4;
const OVERLAP_RATIO: f32 = 0.3;

const TRANSITION_CUES: &[&str] = &[
    "what about",
    "how about",
    "and ",
    "also",
    "then",
    "what else",
    "same for",
    "in that case",
    "instead",
];

const PRONOUN_CUES: &[&str] = &["it", "its", "they", "them", "their", "this", "these", "those"];

/// Approximate token count of a text: characters divided by four, rounded
/// up.
///
/// This is a budgeting heuristic, not a tokenizer. It has no relation to
/// the completion service's real context limit.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars <= 3 {
        return text.chars().take(max_chars).collect();
    }
    let cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", cut.trim_end())
}

/// Whether `question` continues the conversation started by `previous`.
///
/// True on pronoun or transition cues ("what about", "its"), on very short
/// queries, or when the two questions share at least two content words or
/// more than 30% of the new question's content words.
pub fn is_follow_up(question: &str, previous: Option<&str>) -> bool {
    let Some(previous) = previous else {
        return false;
    };

    let lower = question.trim().to_lowercase();
    if lower.is_empty() {
        return false;
    }

    if TRANSITION_CUES.iter().any(|cue| lower.starts_with(cue)) {
        return true;
    }

    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    if words.iter().any(|w| PRONOUN_CUES.contains(w)) {
        return true;
    }
    if words.len() <= SHORT_QUERY_WORDS {
        return true;
    }

    let current = extract_keywords(question);
    let earlier = extract_keywords(previous);
    let shared = current.intersection(&earlier).count();

    shared >= 2 || (!current.is_empty() && shared as f32 / current.len() as f32 > OVERLAP_RATIO)
}

#[derive(Debug, Clone)]
struct TurnDigest {
    topic: String,
    entities: EntityMap,
}

/// Which turns a formatted context covers, and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextPlan {
    /// Strategy in effect (never `Auto`)
    pub strategy: MemoryStrategy,

    /// Turns (1-based) folded into the summary line
    pub summarized: Option<RangeInclusive<usize>>,

    /// Turns (1-based) quoted verbatim, oldest first
    pub buffered: Vec<usize>,
}

/// Per-session conversation memory.
#[derive(Debug, Clone)]
pub struct ConversationContext {
    settings: MemorySettings,
    /// Recent pairs with their 1-based turn numbers
    window: VecDeque<(usize, Exchange)>,
    digests: Vec<TurnDigest>,
    entities: EntityMap,
    summary: String,
}

impl ConversationContext {
    pub fn new(settings: MemorySettings) -> Self {
        Self {
            settings,
            window: VecDeque::new(),
            digests: Vec::new(),
            entities: EntityMap::new(),
            summary: String::new(),
        }
    }

    /// Rebuild a context from caller-held history, oldest turn first.
    pub fn from_history(history: &[Exchange], settings: MemorySettings) -> Self {
        let mut context = Self::new(settings);
        for exchange in history {
            context.add_exchange(&exchange.question, &exchange.answer);
        }
        context
    }

    /// Record a completed turn.
    pub fn add_exchange(&mut self, question: &str, answer: &str) {
        let turn = self.digests.len() + 1;

        let mut turn_entities = extract_entities(question);
        merge_entities(&mut turn_entities, extract_entities(answer));
        merge_entities(&mut self.entities, turn_entities.clone());

        let topic = truncate_chars(question.lines().next().unwrap_or_default(), TOPIC_CHARS);
        self.digests.push(TurnDigest {
            topic,
            entities: turn_entities,
        });

        self.window.push_back((turn, Exchange::new(question, answer)));
        while self.window.len() > self.settings.max_pairs.max(1) {
            self.window.pop_front();
        }

        self.summary = self.summarize(1..=turn);
        tracing::debug!(
            "Conversation turn {} recorded, {} entity categories tracked",
            turn,
            self.entities.len()
        );
    }

    /// Total turns recorded, including those that left the window.
    pub fn turns(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    /// Pairs currently in the window, oldest first.
    pub fn exchanges(&self) -> impl Iterator<Item = &Exchange> {
        self.window.iter().map(|(_, exchange)| exchange)
    }

    pub fn last_question(&self) -> Option<&str> {
        self.window.back().map(|(_, e)| e.question.as_str())
    }

    /// Entities seen anywhere in the session.
    pub fn entities(&self) -> &EntityMap {
        &self.entities
    }

    /// Digest of every turn so far.
    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn settings(&self) -> &MemorySettings {
        &self.settings
    }

    pub fn set_strategy(&mut self, strategy: MemoryStrategy) {
        self.settings.strategy = strategy;
    }

    /// Strategy in effect for the current turn count.
    pub fn active_strategy(&self) -> MemoryStrategy {
        match self.settings.strategy {
            MemoryStrategy::Auto if self.turns() < self.settings.summary_threshold => {
                MemoryStrategy::Buffer
            }
            MemoryStrategy::Auto => MemoryStrategy::Hybrid,
            other => other,
        }
    }

    /// Whether `question` follows up on the last recorded turn.
    pub fn is_follow_up(&self, question: &str) -> bool {
        is_follow_up(question, self.last_question())
    }

    pub fn plan(&self) -> ContextPlan {
        let strategy = self.active_strategy();
        let total = self.turns();
        let windowed: Vec<usize> = self.window.iter().map(|(turn, _)| *turn).collect();

        let (summarized, buffered) = match strategy {
            MemoryStrategy::Summary => ((total > 0).then(|| 1..=total), Vec::new()),
            MemoryStrategy::Hybrid => {
                let keep = self.settings.hybrid_buffer.min(windowed.len());
                let buffered = windowed[windowed.len() - keep..].to_vec();
                let first_buffered = buffered.first().copied().unwrap_or(total + 1);
                let summarized = (first_buffered > 1).then(|| 1..=first_buffered - 1);
                (summarized, buffered)
            }
            _ => (None, windowed),
        };

        ContextPlan {
            strategy,
            summarized,
            buffered,
        }
    }

    fn summarize(&self, turns: RangeInclusive<usize>) -> String {
        let start = *turns.start();
        let end = (*turns.end()).min(self.digests.len());
        if start == 0 || start > end {
            return String::new();
        }
        let digests = &self.digests[start - 1..end];

        let mut entities = EntityMap::new();
        for digest in digests {
            merge_entities(&mut entities, digest.entities.clone());
        }

        let skipped = digests.len().saturating_sub(SUMMARY_TOPICS);
        let topics: Vec<String> = digests[skipped..]
            .iter()
            .map(|d| format!("\"{}\"", d.topic))
            .collect();

        let mut summary = if start == end {
            format!("Earlier conversation (turn {}): ", start)
        } else {
            format!("Earlier conversation (turns {}-{}): ", start, end)
        };
        summary.push_str("asked about ");
        if skipped > 0 {
            summary.push_str("... ");
        }
        summary.push_str(&topics.join("; "));
        summary.push('.');

        for category in EntityCategory::ALL {
            if let Some(values) = entities.get(&category) {
                let values: Vec<&str> = values.iter().map(String::as_str).collect();
                summary.push_str(&format!(" {}: {}.", category.as_str(), values.join(", ")));
            }
        }

        summary
    }

    fn quote_len(recency: usize, halvings: u32) -> usize {
        let base = RECENCY_QUOTES[recency.min(RECENCY_QUOTES.len() - 1)];
        (base >> halvings).max(MIN_QUOTE_CHARS)
    }

    fn render(&self, summary: &str, pairs: &[&Exchange], halvings: u32) -> String {
        let mut out = String::new();
        if !summary.is_empty() {
            out.push_str(summary);
        }
        if !pairs.is_empty() {
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str("Recent exchanges:");
            for (i, exchange) in pairs.iter().enumerate() {
                let recency = pairs.len() - 1 - i;
                out.push_str(&format!(
                    "\nQ: {}\nA: {}",
                    truncate_chars(&exchange.question, QUESTION_CHARS),
                    truncate_chars(&exchange.answer, Self::quote_len(recency, halvings))
                ));
            }
        }
        out
    }

    /// Render memory for a prompt within the estimated token budget.
    ///
    /// Over budget, the oldest buffered pairs are dropped first, then answer
    /// quotes are halved down to one pair at 80 characters, and finally the
    /// summary line is shortened. Never fails; an empty session renders as
    /// an empty string.
    pub fn get_formatted_context(&self) -> String {
        if self.is_empty() {
            return String::new();
        }

        let plan = self.plan();
        let summary = plan
            .summarized
            .clone()
            .map(|turns| self.summarize(turns))
            .unwrap_or_default();
        let buffered: Vec<&Exchange> = self
            .window
            .iter()
            .filter(|(turn, _)| plan.buffered.contains(turn))
            .map(|(_, exchange)| exchange)
            .collect();

        let budget = self.settings.max_tokens;
        let mut pairs = buffered.len();
        let mut halvings = 0u32;
        let mut summary_chars = summary.chars().count();

        loop {
            let summary_line = truncate_chars(&summary, summary_chars);
            let text = self.render(&summary_line, &buffered[buffered.len() - pairs..], halvings);
            if estimate_tokens(&text) <= budget {
                return text;
            }

            if pairs > 1 {
                pairs -= 1;
            } else if pairs == 1 && Self::quote_len(0, halvings) > MIN_QUOTE_CHARS {
                halvings += 1;
            } else if summary_chars > 0 {
                summary_chars /= 2;
            } else {
                tracing::debug!("Conversation context exceeds budget at its floor, truncating");
                return truncate_chars(&text, budget * CHARS_PER_TOKEN);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(strategy: MemoryStrategy) -> MemorySettings {
        MemorySettings {
            strategy,
            ..Default::default()
        }
    }

    fn ten_turns(strategy: MemoryStrategy) -> ConversationContext {
        let crops = ["wheat", "rice", "cotton", "mustard", "maize"];
        let mut context = ConversationContext::new(settings(strategy));
        for turn in 1..=10 {
            let crop = crops[(turn - 1) % crops.len()];
            context.add_exchange(
                &format!("Turn {} question about {} sowing", turn, crop),
                &format!("Turn {} answer: sow {} in the right season.", turn, crop),
            );
        }
        context
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_auto_switches_to_hybrid_at_threshold() {
        let context = ten_turns(MemoryStrategy::Auto);
        let plan = context.plan();

        assert_eq!(plan.strategy, MemoryStrategy::Hybrid);
        assert_eq!(plan.summarized, Some(1..=7));
        assert_eq!(plan.buffered, vec![8, 9, 10]);

        let formatted = context.get_formatted_context();
        assert!(formatted.starts_with("Earlier conversation (turns 1-7)"));
        assert!(formatted.contains("Q: Turn 8 question"));
        assert!(formatted.contains("Q: Turn 10 question"));
        assert!(!formatted.contains("Q: Turn 7 question"));
        assert!(!formatted.contains("A: Turn 7 answer"));
    }

    #[test]
    fn test_auto_uses_buffer_for_short_sessions() {
        let mut context = ConversationContext::new(settings(MemoryStrategy::Auto));
        context.add_exchange("wheat seed rate?", "40 kg per acre.");
        context.add_exchange("and for rice?", "20 kg per acre for transplanted rice.");

        let plan = context.plan();
        assert_eq!(plan.strategy, MemoryStrategy::Buffer);
        assert_eq!(plan.summarized, None);
        assert_eq!(plan.buffered, vec![1, 2]);

        let formatted = context.get_formatted_context();
        assert!(formatted.starts_with("Recent exchanges:"));
        assert!(formatted.contains("A: 40 kg per acre."));
    }

    #[test]
    fn test_summary_strategy_has_no_verbatim_pairs() {
        let context = ten_turns(MemoryStrategy::Summary);
        let formatted = context.get_formatted_context();

        assert!(formatted.starts_with("Earlier conversation (turns 1-10)"));
        assert!(!formatted.contains("Q: "));
        assert!(formatted.contains("crops: cotton, maize, mustard, rice, wheat."));
    }

    #[test]
    fn test_entities_only_grow_for_every_strategy() {
        let turns = [
            ("How to control yellow rust in wheat?", "Spray propiconazole."),
            ("What about aphids?", "Use imidacloprid if above threshold."),
            ("ok", "Anything else?"),
            ("Urea dose for paddy in Punjab during kharif?", "Apply 90 kg N per acre."),
        ];

        for strategy in [
            MemoryStrategy::Buffer,
            MemoryStrategy::Summary,
            MemoryStrategy::Hybrid,
            MemoryStrategy::Auto,
        ] {
            let mut context = ConversationContext::new(MemorySettings {
                strategy,
                max_pairs: 1,
                ..Default::default()
            });
            let mut previous = EntityMap::new();

            for (question, answer) in turns {
                context.add_exchange(question, answer);
                for (category, values) in &previous {
                    assert!(context.entities()[category].is_superset(values));
                }
                previous = context.entities().clone();
            }

            assert!(previous[&EntityCategory::Diseases].contains("yellow rust"));
            assert!(previous[&EntityCategory::Pests].contains("aphid"));
        }
    }

    #[test]
    fn test_window_is_bounded_but_summary_remembers() {
        let mut context = ConversationContext::new(MemorySettings {
            strategy: MemoryStrategy::Buffer,
            max_pairs: 2,
            ..Default::default()
        });
        context.add_exchange("Best time to sow mustard?", "October.");
        context.add_exchange("Irrigation schedule for wheat?", "At CRI stage.");
        context.add_exchange("Cotton bollworm control?", "Use pheromone traps.");

        assert_eq!(context.turns(), 3);
        assert_eq!(context.exchanges().count(), 2);
        assert_eq!(context.last_question(), Some("Cotton bollworm control?"));
        assert!(context.summary().contains("Best time to sow mustard?"));
        assert!(context.entities()[&EntityCategory::Crops].contains("mustard"));
    }

    #[test]
    fn test_formatted_context_fits_budget() {
        let mut context = ConversationContext::new(MemorySettings {
            strategy: MemoryStrategy::Hybrid,
            max_tokens: 60,
            hybrid_buffer: 3,
            ..Default::default()
        });
        let long_answer = "Apply nitrogen in three splits. ".repeat(40);
        for turn in 1..=6 {
            context.add_exchange(&format!("Question {} on wheat nutrition", turn), &long_answer);
        }

        let formatted = context.get_formatted_context();
        assert!(estimate_tokens(&formatted) <= 60);
        assert!(formatted.contains("Question 6"));
    }

    #[test]
    fn test_tiny_budget_degrades_without_failing() {
        let mut context = ConversationContext::new(MemorySettings {
            max_tokens: 5,
            ..Default::default()
        });
        context.add_exchange("Soil testing interval?", "Every three years.");

        let formatted = context.get_formatted_context();
        assert!(estimate_tokens(&formatted) <= 5);
    }

    #[test]
    fn test_from_history_matches_incremental() {
        let history = vec![
            Exchange::new("Wheat varieties for Punjab?", "PBW 826 and HD 3086."),
            Exchange::new("Their sowing time?", "First fortnight of November."),
        ];
        let rebuilt = ConversationContext::from_history(&history, MemorySettings::default());

        assert_eq!(rebuilt.turns(), 2);
        assert_eq!(rebuilt.last_question(), Some("Their sowing time?"));
        assert!(rebuilt.entities()[&EntityCategory::Regions].contains("punjab"));
    }

    #[test]
    fn test_follow_up_predicate() {
        let previous = Some("What is the seed rate for wheat in Punjab?");

        assert!(!is_follow_up("What is the seed rate for wheat?", None));
        assert!(is_follow_up("What about its irrigation schedule?", previous));
        assert!(is_follow_up("And for late sowing?", previous));
        assert!(is_follow_up("price?", previous));
        assert!(is_follow_up("Recommended wheat seed rate under late sown conditions", previous));
        assert!(!is_follow_up(
            "How do I control pink bollworm in cotton fields organically?",
            previous
        ));
    }
}
