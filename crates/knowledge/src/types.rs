//! Knowledge system type definitions.
//!
//! Stored documents carry loosely-typed metadata (whatever keys the source
//! records used). It is normalized into [`DocumentMetadata`] once, at the
//! store boundary, so retrieval code only ever sees a typed region and topic.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Region token for nationwide advice.
pub const GENERAL_REGION: &str = "All India";

/// Region filter meaning "no filter".
pub const WILDCARD_REGION: &str = "*";

/// Curated question/answer collection.
pub const GOLDEN_COLLECTION: &str = "golden";

/// Package-of-practices guideline collection.
pub const POPS_COLLECTION: &str = "pops";

/// Stored region labels that mean "applies everywhere".
const GENERAL_ALIASES: &[&str] = &[
    "all india",
    "all-india",
    "india",
    "general",
    "national",
    "nationwide",
    "all",
];

const REGION_KEYS: &[&str] = &["region", "Region", "state", "State"];
const TOPIC_KEYS: &[&str] = &["topic", "Topic", "crop", "Crop"];

/// Whether a region name denotes nationwide applicability.
pub fn is_general_region(name: &str) -> bool {
    let name = name.trim().to_lowercase();
    GENERAL_ALIASES.contains(&name.as_str())
}

/// Normalized region of a stored document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RegionTag {
    /// Nationwide advice
    General,
    /// A specific state or district
    Named(String),
    /// No region recorded
    Untagged,
}

impl RegionTag {
    /// Parse a raw stored region label.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Self::Untagged
        } else if is_general_region(trimmed) {
            Self::General
        } else {
            Self::Named(trimmed.to_string())
        }
    }

    /// Canonical label written to storage.
    pub fn as_str(&self) -> &str {
        match self {
            Self::General => GENERAL_REGION,
            Self::Named(name) => name,
            Self::Untagged => "",
        }
    }

    /// Lowercased label used for exact filter matching in storage.
    pub fn key(&self) -> String {
        self.as_str().to_lowercase()
    }

    pub fn is_general(&self) -> bool {
        matches!(self, Self::General)
    }

    /// Whether a document with this region is admitted under `filter`.
    ///
    /// The wildcard admits only nationwide documents; any other filter must
    /// equal the stored region (case-insensitive).
    pub fn admits(&self, filter: &str) -> bool {
        let filter = filter.trim();
        if filter == WILDCARD_REGION {
            return self.is_general();
        }
        match self {
            Self::General => is_general_region(filter),
            Self::Named(name) => name.eq_ignore_ascii_case(filter),
            Self::Untagged => false,
        }
    }
}

impl From<String> for RegionTag {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<RegionTag> for String {
    fn from(tag: RegionTag) -> Self {
        tag.as_str().to_string()
    }
}

impl std::fmt::Display for RegionTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Untagged => write!(f, "untagged"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

/// Typed document metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub region: RegionTag,

    /// Crop or topic label; when present the question must mention it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,

    /// Every other key from the source record
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl DocumentMetadata {
    pub fn new(region: RegionTag, topic: Option<String>) -> Self {
        Self {
            region,
            topic: topic.filter(|t| !t.trim().is_empty()),
            extra: BTreeMap::new(),
        }
    }

    /// Normalize a loosely-typed metadata object.
    ///
    /// Region comes from the first of `region`/`Region`/`state`/`State`,
    /// topic from `topic`/`Topic`/`crop`/`Crop`. Array values contribute
    /// their first string. Unrecognized keys are kept in `extra`.
    pub fn from_value(value: &serde_json::Value) -> Self {
        let Some(map) = value.as_object() else {
            return Self::new(RegionTag::Untagged, None);
        };

        let region = first_string(map, REGION_KEYS)
            .map(|r| RegionTag::parse(&r))
            .unwrap_or(RegionTag::Untagged);
        let topic = first_string(map, TOPIC_KEYS);

        let extra = map
            .iter()
            .filter(|(k, _)| !REGION_KEYS.contains(&k.as_str()) && !TOPIC_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Self {
            extra,
            ..Self::new(region, topic)
        }
    }
}

fn first_string(
    map: &serde_json::Map<String, serde_json::Value>,
    keys: &[&str],
) -> Option<String> {
    keys.iter().find_map(|key| match map.get(*key)? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Array(items) => items
            .iter()
            .find_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        _ => None,
    })
}

/// A document stored in a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// SHA-256 of the content
    pub id: String,

    pub content: String,

    pub metadata: DocumentMetadata,

    /// Stored embedding, when the backend returns it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Document {
    /// Create a document; the id is derived from the content.
    pub fn new(content: impl Into<String>, metadata: DocumentMetadata) -> Self {
        let content = content.into();
        Self {
            id: content_id(&content),
            content,
            metadata,
            embedding: None,
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

/// Hex SHA-256 of a document's content.
pub fn content_id(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Options for an ingestion run.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Files or directories to ingest
    pub paths: Vec<PathBuf>,

    /// Region for records that carry none (and for plain text files)
    pub region: Option<String>,

    /// Topic for plain text files
    pub topic: Option<String>,

    /// Target chunk size in characters for plain text files
    pub chunk_size: usize,

    /// Documents embedded and written per batch
    pub batch_size: usize,

    /// Clear the collection first
    pub reset: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            region: None,
            topic: None,
            chunk_size: 1000,
            batch_size: 64,
            reset: false,
        }
    }
}

/// Statistics from an ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestStats {
    pub files: u32,
    pub documents: u32,
    /// Records skipped (empty content, unparsable lines, duplicates)
    pub skipped: u32,
    pub bytes: u64,
    pub duration_secs: f64,
}

/// Row count of one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStats {
    pub name: String,
    pub documents: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_region_tag_parse() {
        assert_eq!(RegionTag::parse("Punjab"), RegionTag::Named("Punjab".to_string()));
        assert_eq!(RegionTag::parse(" all india "), RegionTag::General);
        assert_eq!(RegionTag::parse("National"), RegionTag::General);
        assert_eq!(RegionTag::parse(""), RegionTag::Untagged);
        assert_eq!(RegionTag::General.as_str(), GENERAL_REGION);
    }

    #[test]
    fn test_region_tag_admission() {
        let punjab = RegionTag::Named("Punjab".to_string());
        assert!(punjab.admits("punjab"));
        assert!(!punjab.admits("Haryana"));
        assert!(!punjab.admits(WILDCARD_REGION));

        assert!(RegionTag::General.admits(GENERAL_REGION));
        assert!(RegionTag::General.admits(WILDCARD_REGION));
        assert!(!RegionTag::General.admits("Punjab"));

        assert!(!RegionTag::Untagged.admits(WILDCARD_REGION));
    }

    #[test]
    fn test_metadata_normalization() {
        let meta = DocumentMetadata::from_value(&json!({
            "State": "Punjab",
            "Crop": "Wheat",
            "source": "PAU package of practices",
        }));
        assert_eq!(meta.region, RegionTag::Named("Punjab".to_string()));
        assert_eq!(meta.topic.as_deref(), Some("Wheat"));
        assert_eq!(meta.extra.len(), 1);
        assert!(meta.extra.contains_key("source"));

        let meta = DocumentMetadata::from_value(&json!({"region": ["All India"], "crop": ""}));
        assert!(meta.region.is_general());
        assert!(meta.topic.is_none());

        let meta = DocumentMetadata::from_value(&json!("not an object"));
        assert_eq!(meta.region, RegionTag::Untagged);
    }

    #[test]
    fn test_region_tag_serde_as_string() {
        let meta = DocumentMetadata::new(RegionTag::General, Some("rice".to_string()));
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["region"], "All India");

        let back: DocumentMetadata = serde_json::from_value(value).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn test_document_id_is_content_hash() {
        let a = Document::new("Sow wheat in November.", DocumentMetadata::new(RegionTag::General, None));
        let b = Document::new(
            "Sow wheat in November.",
            DocumentMetadata::new(RegionTag::Named("Punjab".to_string()), None),
        );
        assert_eq!(a.id, b.id);
        assert_eq!(a.id.len(), 64);
    }
}
