//! Agricultural entity extraction.
//!
//! A declarative `{category → terms}` table compiled once into one regex per
//! category. Conversation memory uses it to track what a session has been
//! about; the intent heuristic uses most of it as domain vocabulary.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

/// Kinds of entities tracked across a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityCategory {
    Crops,
    Diseases,
    Pests,
    Fertilizers,
    Regions,
    Seasons,
    Techniques,
}

impl EntityCategory {
    pub const ALL: [EntityCategory; 7] = [
        Self::Crops,
        Self::Diseases,
        Self::Pests,
        Self::Fertilizers,
        Self::Regions,
        Self::Seasons,
        Self::Techniques,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Crops => "crops",
            Self::Diseases => "diseases",
            Self::Pests => "pests",
            Self::Fertilizers => "fertilizers",
            Self::Regions => "regions",
            Self::Seasons => "seasons",
            Self::Techniques => "techniques",
        }
    }
}

/// Entities found in a text, by category.
pub type EntityMap = BTreeMap<EntityCategory, BTreeSet<String>>;

const ENTITY_TERMS: &[(EntityCategory, &[&str])] = &[
    (
        EntityCategory::Crops,
        &[
            "wheat", "rice", "paddy", "maize", "corn", "bajra", "jowar", "sorghum", "millet",
            "ragi", "barley", "cotton", "sugarcane", "mustard", "groundnut", "soybean",
            "sunflower", "sesame", "chickpea", "gram", "lentil", "arhar", "tur", "moong",
            "urad", "potato", "tomato", "onion", "chilli", "brinjal", "okra", "cabbage",
            "cauliflower", "banana", "mango", "guava", "citrus", "grape", "pomegranate",
            "coconut", "tea", "coffee", "jute", "turmeric", "ginger", "garlic", "cumin",
        ],
    ),
    (
        EntityCategory::Diseases,
        &[
            "rust", "yellow rust", "brown rust", "blast", "blight", "sheath blight",
            "bacterial leaf blight", "late blight", "early blight", "wilt", "smut", "mildew",
            "powdery mildew", "downy mildew", "leaf spot", "root rot", "stem rot", "mosaic",
            "leaf curl", "canker", "anthracnose", "damping off",
        ],
    ),
    (
        EntityCategory::Pests,
        &[
            "aphid", "whitefly", "jassid", "thrips", "bollworm", "pink bollworm", "stem borer",
            "fall armyworm", "armyworm", "locust", "termite", "mite", "mealybug",
            "leaf folder", "planthopper", "brown planthopper", "fruit fly", "nematode",
            "cutworm", "caterpillar", "weevil", "rat", "rodent",
        ],
    ),
    (
        EntityCategory::Fertilizers,
        &[
            "urea", "dap", "npk", "mop", "ssp", "potash", "zinc sulphate", "gypsum",
            "compost", "vermicompost", "farmyard manure", "fym", "manure", "nitrogen",
            "phosphorus", "potassium", "sulphur", "boron", "micronutrient", "biofertilizer",
            "nano urea",
        ],
    ),
    (
        EntityCategory::Regions,
        &[
            "punjab", "haryana", "uttar pradesh", "madhya pradesh", "bihar", "rajasthan",
            "gujarat", "maharashtra", "karnataka", "kerala", "tamil nadu", "andhra pradesh",
            "telangana", "odisha", "west bengal", "assam", "himachal pradesh", "uttarakhand",
            "jharkhand", "chhattisgarh", "jammu and kashmir", "delhi",
        ],
    ),
    (
        EntityCategory::Seasons,
        &[
            "kharif", "rabi", "zaid", "monsoon", "pre-monsoon", "summer", "winter",
            "spring", "autumn",
        ],
    ),
    (
        EntityCategory::Techniques,
        &[
            "drip irrigation", "sprinkler irrigation", "irrigation", "mulching", "intercropping",
            "crop rotation", "zero tillage", "direct seeded rice", "dsr", "transplanting",
            "seed treatment", "integrated pest management", "ipm", "organic farming",
            "natural farming", "pruning", "grafting", "weeding", "harvesting", "sowing",
            "spraying", "soil testing",
        ],
    ),
];

struct EntityPattern {
    category: EntityCategory,
    regex: Regex,
}

/// "whitefly" -> "whiteflies"; `None` unless the term ends in consonant + y.
fn ies_plural(term: &str) -> Option<String> {
    let stem = term.strip_suffix('y')?;
    let before = stem.chars().last()?;
    (before.is_ascii_alphabetic() && !"aeiou".contains(before)).then(|| format!("{}ies", stem))
}

/// Fold a matched surface form back to its listed term.
fn fold_plural(matched: &str) -> String {
    let lower = matched.to_lowercase();
    match lower.strip_suffix("ies") {
        Some(stem) => format!("{}y", stem),
        None => lower,
    }
}

/// One compiled pattern per category, longest forms first so "yellow rust"
/// is recorded instead of just "rust". Plural forms are folded to the
/// listed term.
static ENTITY_PATTERNS: LazyLock<Vec<EntityPattern>> = LazyLock::new(|| {
    ENTITY_TERMS
        .iter()
        .filter_map(|(category, terms)| {
            let mut forms: Vec<String> = terms
                .iter()
                .flat_map(|t| std::iter::once(t.to_string()).chain(ies_plural(t)))
                .collect();
            forms.sort_by_key(|t| std::cmp::Reverse(t.len()));
            let alternation = forms
                .iter()
                .map(|t| regex::escape(t))
                .collect::<Vec<_>>()
                .join("|");

            Regex::new(&format!(r"(?i)\b({})(?:e?s)?\b", alternation))
                .inspect_err(|e| {
                    tracing::error!("Invalid entity pattern for {}: {}", category.as_str(), e)
                })
                .ok()
                .map(|regex| EntityPattern {
                    category: *category,
                    regex,
                })
        })
        .collect()
});

/// Extract entities from a text.
///
/// Categories with no match are absent from the map.
pub fn extract_entities(text: &str) -> EntityMap {
    let mut found = EntityMap::new();

    for pattern in ENTITY_PATTERNS.iter() {
        let matches: BTreeSet<String> = pattern
            .regex
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| fold_plural(m.as_str()))
            .collect();
        if !matches.is_empty() {
            found.insert(pattern.category, matches);
        }
    }

    found
}

/// Union `extra` into `into`. Existing entries are never removed.
pub fn merge_entities(into: &mut EntityMap, extra: EntityMap) {
    for (category, values) in extra {
        into.entry(category).or_default().extend(values);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_entities_by_category() {
        let entities = extract_entities(
            "Yellow rust on wheat in Punjab during rabi; spray after applying urea.",
        );

        assert_eq!(
            entities.get(&EntityCategory::Crops),
            Some(&BTreeSet::from(["wheat".to_string()]))
        );
        assert!(entities[&EntityCategory::Diseases].contains("yellow rust"));
        assert!(entities[&EntityCategory::Regions].contains("punjab"));
        assert!(entities[&EntityCategory::Seasons].contains("rabi"));
        assert!(entities[&EntityCategory::Fertilizers].contains("urea"));
        assert!(!entities.contains_key(&EntityCategory::Pests));
    }

    #[test]
    fn test_plurals_fold_to_term() {
        let entities = extract_entities("Aphids and whiteflies attack tomatoes");
        let pests = &entities[&EntityCategory::Pests];
        assert!(pests.contains("aphid"));
        assert!(pests.contains("whitefly"));
        assert!(!pests.contains("whiteflies"));
        assert!(entities[&EntityCategory::Crops].contains("tomato"));

        let entities = extract_entities("Whiteflies and mealybugs on cotton; leaf folders too");
        assert_eq!(
            entities[&EntityCategory::Pests],
            BTreeSet::from(["leaf folder".to_string(), "mealybug".to_string(), "whitefly".to_string()])
        );

        let entities = extract_entities("Fruit flies in guava orchards, and paddies flooded");
        assert!(entities[&EntityCategory::Pests].contains("fruit fly"));
        assert!(entities[&EntityCategory::Crops].contains("paddy"));
    }

    #[test]
    fn test_word_boundaries() {
        // "rat" must not match inside "rate"
        let entities = extract_entities("What is the seed rate?");
        assert!(!entities.contains_key(&EntityCategory::Pests));
        assert!(extract_entities("What is the capital of France?").is_empty());
    }

    #[test]
    fn test_merge_only_grows() {
        let mut tracked = extract_entities("wheat sowing");
        let before = tracked.clone();

        merge_entities(&mut tracked, extract_entities("paddy in kharif"));
        merge_entities(&mut tracked, EntityMap::new());

        for (category, values) in &before {
            assert!(tracked[category].is_superset(values));
        }
        assert!(tracked[&EntityCategory::Crops].contains("paddy"));
        assert!(tracked[&EntityCategory::Seasons].contains("kharif"));
    }
}
