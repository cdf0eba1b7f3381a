//! Answer text cleanup.
//!
//! Two kinds of cleanup:
//! - record markers (`Question:`/`Answer:` labels, `[GOLDEN]` tags, heading
//!   hashes, `---` rules) stripped from passages returned verbatim
//! - planning phrases ("Let me think", "The user is asking", `<think>`
//!   blocks) stripped from generated answers
//!
//! [`sanitize`] is idempotent: running it on its own output changes nothing.
//! [`StreamSanitizer`] applies it to a token stream and forwards only the
//! newly sanitized suffix.

use regex::Regex;
use std::sync::LazyLock;

/// Sentence openers that narrate the model's reasoning instead of answering.
const PLANNING_PHRASES: &[&str] = &[
    "let me think",
    "let me analyze",
    "let me check",
    "okay, so",
    "ok, so",
    "alright, so",
    "first, i need to",
    "i need to",
    "i should",
    "the user is asking",
    "the user wants",
    "the user asked",
    "based on the context provided",
    "based on the provided context",
    "according to the context",
    "looking at the context",
];

static THINK_BLOCK: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"(?is)<think>.*?</think>"));

/// An unclosed block hides everything after it.
static OPEN_THINK_BLOCK: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"(?is)<think>.*\z"));

static RECORD_LABEL: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"(?i)^\s*(?:question|answer|q|a)\s*:\s*"));

static BRACKET_TAG: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"\[[A-Z][A-Z0-9 _-]*\]\s*"));

fn compile(pattern: &str) -> Option<Regex> {
    Regex::new(pattern)
        .inspect_err(|e| tracing::error!("Invalid sanitizer pattern: {}", e))
        .ok()
}

fn replace_all(pattern: &Option<Regex>, text: &str, with: &str) -> String {
    match pattern {
        Some(re) => re.replace_all(text, with).into_owned(),
        None => text.to_string(),
    }
}

/// Length of the first sentence of `text`, including its terminator.
fn first_sentence_len(text: &str) -> usize {
    text.char_indices()
        .find(|(_, c)| matches!(c, '.' | '!' | '?' | ':'))
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(text.len())
}

fn starts_with_planning(text: &str) -> bool {
    let lower = text.to_lowercase();
    PLANNING_PHRASES.iter().any(|p| lower.starts_with(p))
}

/// Remove leading planning sentences from one line.
fn strip_planning(line: &str) -> String {
    let mut rest = line.trim_start();
    if !starts_with_planning(rest) {
        return line.to_string();
    }
    while !rest.is_empty() && starts_with_planning(rest) {
        let cut = first_sentence_len(rest);
        rest = rest[cut..].trim_start();
    }
    rest.to_string()
}

/// Remove internal planning from generated text.
pub fn sanitize(text: &str) -> String {
    let text = replace_all(&THINK_BLOCK, text, "");
    let text = replace_all(&OPEN_THINK_BLOCK, &text, "");

    let mut lines = Vec::new();
    for line in text.split('\n') {
        if line.trim().is_empty() {
            lines.push(line.to_string());
            continue;
        }
        let cleaned = strip_planning(line);
        if !cleaned.is_empty() {
            lines.push(cleaned);
        }
    }

    lines.join("\n").trim_start().to_string()
}

/// Strip structural record markers from a stored passage.
///
/// For question/answer records only the answer part is kept.
pub fn strip_record_markers(content: &str) -> String {
    let lines: Vec<&str> = content.lines().collect();

    let answer_start = lines.iter().position(|line| {
        let lower = line.trim_start().to_lowercase();
        lower.starts_with("answer:") || lower.starts_with("a:")
    });
    let body = match answer_start {
        Some(start) => &lines[start..],
        None => &lines[..],
    };

    let cleaned: Vec<String> = body
        .iter()
        .filter(|line| {
            let t = line.trim();
            !(t.len() >= 3 && t.chars().all(|c| c == '-' || c == '='))
        })
        .map(|line| {
            let line = replace_all(&RECORD_LABEL, line, "");
            let line = replace_all(&BRACKET_TAG, &line, "");
            line.trim_start_matches('#').trim().to_string()
        })
        .collect();

    cleaned.join("\n").trim().to_string()
}

/// Incremental sanitizer for streamed tokens.
///
/// Tokens are buffered; only complete lines are sanitized and released, so
/// a planning phrase split across tokens is still caught. Each call returns
/// the part of the sanitized text not yet released.
#[derive(Debug, Default)]
pub struct StreamSanitizer {
    raw: String,
    emitted: String,
}

impl StreamSanitizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a token; returns newly releasable text, if any.
    pub fn push(&mut self, token: &str) -> Option<String> {
        self.raw.push_str(token);
        let stable = match self.raw.rfind('\n') {
            Some(end) => &self.raw[..=end],
            None => return None,
        };
        let sanitized = sanitize(stable);
        self.release(sanitized)
    }

    /// Flush the trailing partial line at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        let sanitized = sanitize(&self.raw);
        self.release(sanitized)
    }

    /// Everything received so far, sanitized.
    pub fn text(&self) -> String {
        sanitize(&self.raw)
    }

    fn release(&mut self, sanitized: String) -> Option<String> {
        let delta = match sanitized.strip_prefix(self.emitted.as_str()) {
            Some(delta) => delta.to_string(),
            None => {
                // Earlier output was revised (rare); hold until it lines up again
                tracing::debug!("Sanitized stream diverged from released prefix");
                return None;
            }
        };
        if delta.is_empty() {
            return None;
        }
        self.emitted = sanitized;
        Some(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_planning_sentences() {
        let raw = "Okay, so the user is asking about wheat. Let me think about this.\nSow wheat in the first fortnight of November.\nUse 40 kg seed per acre.";
        assert_eq!(
            sanitize(raw),
            "Sow wheat in the first fortnight of November.\nUse 40 kg seed per acre."
        );
    }

    #[test]
    fn test_sanitize_strips_think_blocks() {
        let raw = "<think>The user wants seed rates.\nI should check.</think>\nApply 40 kg/acre.";
        assert_eq!(sanitize(raw), "Apply 40 kg/acre.");

        assert_eq!(sanitize("Irrigate now.\n<think>unfinished"), "Irrigate now.\n");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let samples = [
            "Based on the context provided, here is the answer:\n\n- Sow in November.\n- Irrigate at CRI.",
            "I need to answer this. The user is asking: dose?\nUrea 50 kg.",
            "Plain answer with no planning.",
            "<think>x</think>\n\nLet me check.\n\nDone.",
            "",
        ];
        for sample in samples {
            let once = sanitize(sample);
            assert_eq!(sanitize(&once), once, "not idempotent for {:?}", sample);
        }
    }

    #[test]
    fn test_sanitize_keeps_legitimate_text() {
        let text = "You need to irrigate within 21 days.\nFarmers should apply zinc.";
        assert_eq!(sanitize(text), text);
    }

    #[test]
    fn test_strip_record_markers() {
        let content = "Question: What is the seed rate for wheat?\nAnswer: [GOLDEN] Use 40 kg per acre.\n---\n### Note\nTreat seed before sowing.";
        assert_eq!(
            strip_record_markers(content),
            "Use 40 kg per acre.\nNote\nTreat seed before sowing."
        );

        assert_eq!(
            strip_record_markers("Sow mustard in October."),
            "Sow mustard in October."
        );
    }

    #[test]
    fn test_stream_sanitizer_holds_partial_lines() {
        let mut sanitizer = StreamSanitizer::new();
        let mut out = String::new();

        for token in ["Let me ", "think.", "\nSow ", "in ", "November.", "\nIrrigate", " weekly."] {
            if let Some(delta) = sanitizer.push(token) {
                out.push_str(&delta);
            }
        }
        if let Some(delta) = sanitizer.finish() {
            out.push_str(&delta);
        }

        assert_eq!(out, "Sow in November.\nIrrigate weekly.");
        assert_eq!(out, sanitizer.text());
    }

    #[test]
    fn test_stream_sanitizer_output_is_already_clean() {
        let mut sanitizer = StreamSanitizer::new();
        let mut out = String::new();
        for token in "Okay, so here it is.\nApply DAP at sowing.\n".split_inclusive(' ') {
            if let Some(delta) = sanitizer.push(token) {
                out.push_str(&delta);
            }
        }
        if let Some(delta) = sanitizer.finish() {
            out.push_str(&delta);
        }

        assert_eq!(sanitize(&out), out);
        assert!(!out.to_lowercase().contains("okay, so"));
    }
}
