//! Region prioritization.
//!
//! Turns a question and the user's declared region into the ordered list of
//! region filters the retrievers try: the region named in the question, the
//! declared region, the nationwide token, and finally the wildcard.

use agri_knowledge::{is_general_region, GENERAL_REGION, WILDCARD_REGION};
use regex::Regex;
use std::sync::LazyLock;

/// Alias → canonical region name. Lookup keys are lowercase.
const REGION_ALIASES: &[(&str, &str)] = &[
    ("andhra pradesh", "Andhra Pradesh"),
    ("ap", "Andhra Pradesh"),
    ("arunachal pradesh", "Arunachal Pradesh"),
    ("assam", "Assam"),
    ("bihar", "Bihar"),
    ("chhattisgarh", "Chhattisgarh"),
    ("cg", "Chhattisgarh"),
    ("goa", "Goa"),
    ("gujarat", "Gujarat"),
    ("gj", "Gujarat"),
    ("haryana", "Haryana"),
    ("hr", "Haryana"),
    ("himachal pradesh", "Himachal Pradesh"),
    ("himachal", "Himachal Pradesh"),
    ("hp", "Himachal Pradesh"),
    ("jammu and kashmir", "Jammu and Kashmir"),
    ("jammu & kashmir", "Jammu and Kashmir"),
    ("j&k", "Jammu and Kashmir"),
    ("jharkhand", "Jharkhand"),
    ("karnataka", "Karnataka"),
    ("kerala", "Kerala"),
    ("ladakh", "Ladakh"),
    ("madhya pradesh", "Madhya Pradesh"),
    ("mp", "Madhya Pradesh"),
    ("maharashtra", "Maharashtra"),
    ("mh", "Maharashtra"),
    ("manipur", "Manipur"),
    ("meghalaya", "Meghalaya"),
    ("mizoram", "Mizoram"),
    ("nagaland", "Nagaland"),
    ("odisha", "Odisha"),
    ("orissa", "Odisha"),
    ("punjab", "Punjab"),
    ("pb", "Punjab"),
    ("rajasthan", "Rajasthan"),
    ("rj", "Rajasthan"),
    ("sikkim", "Sikkim"),
    ("tamil nadu", "Tamil Nadu"),
    ("tamilnadu", "Tamil Nadu"),
    ("tn", "Tamil Nadu"),
    ("telangana", "Telangana"),
    ("ts", "Telangana"),
    ("tripura", "Tripura"),
    ("uttar pradesh", "Uttar Pradesh"),
    ("up", "Uttar Pradesh"),
    ("uttarakhand", "Uttarakhand"),
    ("uttaranchal", "Uttarakhand"),
    ("uk", "Uttarakhand"),
    ("west bengal", "West Bengal"),
    ("wb", "West Bengal"),
    ("bengal", "West Bengal"),
    ("delhi", "Delhi"),
    ("puducherry", "Puducherry"),
    ("pondicherry", "Puducherry"),
];

/// Full region names, matched case-insensitively in questions.
static REGION_NAME_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    let mut names: Vec<&str> = REGION_ALIASES
        .iter()
        .map(|(alias, _)| *alias)
        .filter(|alias| alias.len() > 2 && alias.chars().all(|c| c.is_alphabetic() || c == ' '))
        .collect();
    // Longest first so "west bengal" wins over "bengal"
    names.sort_by_key(|name| std::cmp::Reverse(name.len()));
    let alternation = names
        .iter()
        .map(|name| regex::escape(name))
        .collect::<Vec<_>>()
        .join("|");
    compile(&format!(r"(?i)\b({})\b", alternation))
});

/// Abbreviations only count in questions when written in capitals ("UP",
/// "J&K"), since several are ordinary English words in lowercase.
static REGION_ABBREVIATION_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"\b(AP|CG|GJ|HR|HP|MP|MH|PB|RJ|TN|TS|UP|UK|WB)\b|J&K"));

/// "Ludhiana district", "Karnal District".
static DISTRICT_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"\b([A-Z][a-z]+(?:\s[A-Z][a-z]+)?)\s+(?i:district)\b"));

fn compile(pattern: &str) -> Option<Regex> {
    Regex::new(pattern)
        .inspect_err(|e| tracing::error!("Invalid region pattern: {}", e))
        .ok()
}

fn title_case(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalize a region name through the alias table.
///
/// Strips " district"/" state" suffixes first. Unknown names come back
/// trimmed and title-cased; nationwide aliases become the general token.
/// Returns `None` for blank input.
pub fn normalize_region(raw: &str) -> Option<String> {
    let mut name = raw.trim().to_lowercase();
    for suffix in [" district", " state"] {
        if let Some(stripped) = name.strip_suffix(suffix) {
            name = stripped.trim().to_string();
        }
    }
    if name.is_empty() {
        return None;
    }
    if name == WILDCARD_REGION {
        return Some(WILDCARD_REGION.to_string());
    }
    if is_general_region(&name) {
        return Some(GENERAL_REGION.to_string());
    }

    let canonical = REGION_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or_else(|| title_case(&name));
    Some(canonical)
}

/// Find a region explicitly named in a question.
pub fn detect_region(question: &str) -> Option<String> {
    let find = |pattern: &Option<Regex>| pattern.as_ref().and_then(|re| re.find(question));

    if let Some(m) = find(&REGION_NAME_PATTERN) {
        return normalize_region(m.as_str());
    }
    if let Some(m) = find(&REGION_ABBREVIATION_PATTERN) {
        return normalize_region(m.as_str());
    }
    DISTRICT_PATTERN
        .as_ref()
        .and_then(|re| re.captures(question))
        .and_then(|caps| caps.get(1))
        .and_then(|m| normalize_region(m.as_str()))
}

/// Ordered region filters for a question.
///
/// The list is deduplicated case-insensitively, never empty, and always
/// ends with the wildcard.
pub fn prioritize_regions(question: &str, user_region: Option<&str>) -> Vec<String> {
    let candidates = [
        detect_region(question),
        user_region.and_then(normalize_region),
        Some(GENERAL_REGION.to_string()),
    ];

    let mut regions: Vec<String> = Vec::with_capacity(4);
    for region in candidates.into_iter().flatten() {
        if region == WILDCARD_REGION {
            continue;
        }
        if !regions.iter().any(|r| r.eq_ignore_ascii_case(&region)) {
            regions.push(region);
        }
    }
    regions.push(WILDCARD_REGION.to_string());

    tracing::debug!("Region priority: {:?}", regions);
    regions
}
