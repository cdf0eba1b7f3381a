//! Lexical checks layered on top of semantic similarity.
//!
//! Embeddings happily rank "seed rate for wheat" close to "seed rate for
//! mustard". Two cheap lexical checks catch that:
//! - the keyword-overlap gate, which requires a share of the question's
//!   content words to appear in the passage
//! - the topic guard, which requires the question to mention a passage's
//!   crop/topic label when it has one

use std::collections::BTreeSet;

/// Tokens shorter than this are never keywords.
const MIN_KEYWORD_LEN: usize = 4;

/// Stems shorter than this are left unstemmed.
const MIN_STEM_LEN: usize = 4;

/// Topic label parts shorter than this are ignored for sub-word matching.
const MIN_TOPIC_PART_LEN: usize = 3;

const STOPWORDS: &[&str] = &[
    "about", "above", "after", "again", "also", "among", "being", "below", "best", "between",
    "both", "can", "could", "does", "doing", "done", "during", "each", "ever", "from", "give",
    "good", "have", "having", "help", "here", "into", "just", "know", "like", "make", "many",
    "more", "most", "much", "must", "need", "needed", "only", "other", "over", "please", "same",
    "should", "some", "such", "tell", "than", "that", "their", "them", "then", "there", "these",
    "they", "this", "those", "through", "under", "until", "upon", "used", "using", "very",
    "want", "what", "when", "where", "which", "while", "will", "with", "would", "your", "kindly",
    "suggest", "recommended", "recommend", "advice", "regarding",
];

fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

/// Collapse common English inflections so "varieties" matches "variety"
/// and "seeds" matches "seed".
pub fn stem(word: &str) -> String {
    let word = word.to_lowercase();
    let keeps_stem = |stem: &str| stem.chars().count() >= MIN_STEM_LEN;

    if let Some(base) = word.strip_suffix("ies") {
        if base.chars().count() + 1 >= MIN_STEM_LEN {
            return format!("{}y", base);
        }
    }
    for suffix in ["sses", "ches", "shes", "xes", "zes", "oes"] {
        if let Some(base) = word.strip_suffix(suffix) {
            let base = format!("{}{}", base, &suffix[..suffix.len() - 2]);
            if keeps_stem(&base) {
                return base;
            }
        }
    }
    for suffix in ["ing", "ed"] {
        if let Some(base) = word.strip_suffix(suffix) {
            if keeps_stem(base) {
                return base.to_string();
            }
        }
    }
    if let Some(base) = word.strip_suffix('s') {
        if !base.ends_with('s') && keeps_stem(base) {
            return base.to_string();
        }
    }
    word
}

fn tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
}

/// Content keywords of a text: lowercased, stopword-filtered, at least four
/// characters, stemmed.
pub fn extract_keywords(text: &str) -> BTreeSet<String> {
    tokens(text)
        .filter(|t| t.chars().count() >= MIN_KEYWORD_LEN)
        .map(str::to_lowercase)
        .filter(|t| !is_stopword(t))
        .map(|t| stem(&t))
        .collect()
}

/// How many question keywords a passage must contain.
///
/// One keyword needs one match, two to five need two, more need three.
pub fn required_overlap(keyword_count: usize) -> usize {
    let required = match keyword_count {
        0 => 0,
        1 => 1,
        2..=5 => 2,
        _ => 3,
    };
    required.min(keyword_count)
}

/// Number of `keywords` present in `content`.
pub fn keyword_overlap(keywords: &BTreeSet<String>, content: &str) -> usize {
    let content_keywords = extract_keywords(content);
    keywords.intersection(&content_keywords).count()
}

/// Whether `content` shares enough keywords with the question.
///
/// A question with no keywords at all (e.g. "why?") has nothing to check
/// and passes.
pub fn passes_keyword_gate(question_keywords: &BTreeSet<String>, content: &str) -> bool {
    keyword_overlap(question_keywords, content) >= required_overlap(question_keywords.len())
}

/// Whether `question` references a passage's topic label.
///
/// Matches the whole label as a substring, or any part of it (split on
/// whitespace, `-`, `_`, `/`) of at least three characters, so "Paddy/Rice"
/// is referenced by a question about rice.
pub fn mentions_topic(question: &str, topic: &str) -> bool {
    let question = question.to_lowercase();
    let topic = topic.trim().to_lowercase();
    if topic.is_empty() || question.contains(&topic) {
        return true;
    }

    topic
        .split(|c: char| c.is_whitespace() || matches!(c, '-' | '_' | '/'))
        .filter(|part| part.chars().count() >= MIN_TOPIC_PART_LEN)
        .any(|part| {
            question.contains(part)
                || tokens(&question).any(|token| stem(token) == stem(part))
        })
}
