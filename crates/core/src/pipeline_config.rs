//! Pipeline configuration: per-source gating thresholds, memory limits, and
//! completion budgets.
//!
//! A single `PipelineConfig` is loaded once per process and shared read-only
//! (usually behind an `Arc`). Per-request adjustments go through
//! [`PipelineConfig::with_overrides`], which always returns a fresh copy so the
//! shared default is never mutated.
//!
//! The numeric defaults were tuned against one embedding model; re-calibrate
//! `min_cosine`, `max_distance`, and `distance_multiplier` before pointing the
//! pipeline at a different model.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

/// Admission thresholds for one document source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceThresholds {
    /// Upper bound on the index's native distance (`None` disables the check)
    #[serde(default)]
    pub max_distance: Option<f32>,

    /// Lower bound on the recomputed cosine similarity
    pub min_cosine: f32,
}

impl SourceThresholds {
    /// Whether a candidate clears both bounds.
    ///
    /// `multiplier` scales `max_distance` to compensate for the differently
    /// calibrated distance scales of the two collections.
    pub fn passes(&self, distance: f32, cosine: f32, multiplier: f32) -> bool {
        if cosine < self.min_cosine {
            return false;
        }

        match self.max_distance {
            Some(max) => distance <= max * multiplier,
            None => true,
        }
    }
}

/// Settings for one retrieval source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSettings {
    /// Whether the source is consulted at all
    pub enabled: bool,

    /// Number of candidates requested from the index per region
    pub k: usize,

    /// Admission thresholds
    pub thresholds: SourceThresholds,

    /// Scale applied to `max_distance` (clamped to 1.0 under strict validation)
    pub distance_multiplier: f32,
}

impl SourceSettings {
    /// Defaults for the curated collection.
    pub fn golden() -> Self {
        Self {
            enabled: true,
            k: 3,
            thresholds: SourceThresholds {
                max_distance: Some(0.45),
                min_cosine: 0.5,
            },
            distance_multiplier: 1.0,
        }
    }

    /// Defaults for the package-of-practices collection.
    pub fn pops() -> Self {
        Self {
            enabled: true,
            k: 5,
            thresholds: SourceThresholds {
                max_distance: None,
                min_cosine: 0.5,
            },
            distance_multiplier: 1.5,
        }
    }
}

/// Partially specified source settings from a config file, merged onto the
/// source's own defaults so a `pops:` section never inherits golden values.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SourcePatch {
    enabled: Option<bool>,
    k: Option<usize>,
    thresholds: Option<ThresholdsPatch>,
    distance_multiplier: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ThresholdsPatch {
    max_distance: Option<f32>,
    min_cosine: Option<f32>,
}

impl SourcePatch {
    fn apply(self, mut base: SourceSettings) -> SourceSettings {
        if let Some(enabled) = self.enabled {
            base.enabled = enabled;
        }
        if let Some(k) = self.k {
            base.k = k;
        }
        if let Some(thresholds) = self.thresholds {
            if thresholds.max_distance.is_some() {
                base.thresholds.max_distance = thresholds.max_distance;
            }
            if let Some(min) = thresholds.min_cosine {
                base.thresholds.min_cosine = min;
            }
        }
        if let Some(multiplier) = self.distance_multiplier {
            base.distance_multiplier = multiplier;
        }
        base
    }
}

fn golden_settings<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SourceSettings, D::Error> {
    SourcePatch::deserialize(deserializer).map(|patch| patch.apply(SourceSettings::golden()))
}

fn pops_settings<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SourceSettings, D::Error> {
    SourcePatch::deserialize(deserializer).map(|patch| patch.apply(SourceSettings::pops()))
}

/// Conversation memory compression strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryStrategy {
    /// Recent pairs verbatim
    Buffer,
    /// Entity/topic digest only
    Summary,
    /// Digest of older turns plus recent pairs verbatim
    Hybrid,
    /// Buffer for short sessions, hybrid once the session grows
    #[default]
    Auto,
}

impl MemoryStrategy {
    /// Parse a strategy name (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "buffer" => Some(Self::Buffer),
            "summary" => Some(Self::Summary),
            "hybrid" => Some(Self::Hybrid),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }
}

/// Conversation memory limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    pub strategy: MemoryStrategy,

    /// Maximum question/answer pairs kept in the window
    pub max_pairs: usize,

    /// Estimated token budget for the formatted context
    pub max_tokens: usize,

    /// Turn count at which AUTO switches from buffer to hybrid
    pub summary_threshold: usize,

    /// Recent turns kept verbatim in hybrid mode
    pub hybrid_buffer: usize,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            strategy: MemoryStrategy::Auto,
            max_pairs: 10,
            max_tokens: 1500,
            summary_threshold: 8,
            hybrid_buffer: 3,
        }
    }
}

/// Completion service budgets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Sampling temperature for answer synthesis
    pub temperature: f32,

    /// Token budget for answer synthesis
    pub max_tokens: u32,

    /// Token budget for the binary intent classification call
    pub intent_max_tokens: u32,

    /// Token budget for clarification question generation
    pub clarification_max_tokens: u32,

    /// Character budget per retrieved passage in the synthesis context
    pub passage_char_budget: usize,

    /// Maximum PoPs passages included in the synthesis context
    pub max_pops_passages: usize,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 1024,
            intent_max_tokens: 4,
            clarification_max_tokens: 150,
            passage_char_budget: 1200,
            max_pops_passages: 3,
        }
    }
}

/// Full pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Curated high-confidence collection
    #[serde(deserialize_with = "golden_settings")]
    pub golden: SourceSettings,

    /// Package-of-practices collection (secondary fallback)
    #[serde(deserialize_with = "pops_settings")]
    pub pops: SourceSettings,

    /// Clamp distance multipliers to 1.0
    pub strict_validation: bool,

    /// Ask the completion service when the keyword heuristic misses
    pub llm_intent_enabled: bool,

    /// Generate follow-up questions when no source is confident
    pub clarification_enabled: bool,

    /// Maximum clarification questions returned
    pub max_clarifications: usize,

    pub memory: MemorySettings,

    pub generation: GenerationSettings,

    /// Attach per-source diagnostics to results
    pub diagnostics_enabled: bool,

    /// Append terminal answers to the audit log
    pub audit_enabled: bool,

    /// Audit log location (defaults to `.agri/audit.jsonl` in the workspace)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            golden: SourceSettings::golden(),
            pops: SourceSettings::pops(),
            strict_validation: false,
            llm_intent_enabled: true,
            clarification_enabled: true,
            max_clarifications: 3,
            memory: MemorySettings::default(),
            generation: GenerationSettings::default(),
            diagnostics_enabled: true,
            audit_enabled: true,
            audit_path: None,
        }
    }
}

/// Per-request configuration overrides. Unset fields keep the base value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    pub golden_enabled: Option<bool>,
    pub pops_enabled: Option<bool>,
    pub golden_min_cosine: Option<f32>,
    pub pops_min_cosine: Option<f32>,
    pub golden_max_distance: Option<f32>,
    pub pops_max_distance: Option<f32>,
    pub strict_validation: Option<bool>,
    pub clarification_enabled: Option<bool>,
    pub temperature: Option<f32>,
}

impl ConfigOverrides {
    /// Whether no field is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl PipelineConfig {
    /// Produce a request-scoped copy with `overrides` applied.
    ///
    /// Out-of-range values are clamped or ignored with a warning; an invalid
    /// override never fails the request.
    pub fn with_overrides(&self, overrides: &ConfigOverrides) -> Self {
        let mut config = self.clone();

        if let Some(enabled) = overrides.golden_enabled {
            config.golden.enabled = enabled;
        }
        if let Some(enabled) = overrides.pops_enabled {
            config.pops.enabled = enabled;
        }
        if let Some(min) = overrides.golden_min_cosine.and_then(|v| clamp_cosine("golden_min_cosine", v)) {
            config.golden.thresholds.min_cosine = min;
        }
        if let Some(min) = overrides.pops_min_cosine.and_then(|v| clamp_cosine("pops_min_cosine", v)) {
            config.pops.thresholds.min_cosine = min;
        }
        if let Some(max) = overrides.golden_max_distance {
            if let Some(max) = checked_distance("golden_max_distance", max) {
                config.golden.thresholds.max_distance = Some(max);
            }
        }
        if let Some(max) = overrides.pops_max_distance {
            if let Some(max) = checked_distance("pops_max_distance", max) {
                config.pops.thresholds.max_distance = Some(max);
            }
        }
        if let Some(strict) = overrides.strict_validation {
            config.strict_validation = strict;
        }
        if let Some(enabled) = overrides.clarification_enabled {
            config.clarification_enabled = enabled;
        }
        if let Some(temperature) = overrides.temperature {
            let clamped = temperature.clamp(0.0, 2.0);
            if clamped != temperature || temperature.is_nan() {
                tracing::warn!(
                    "Override temperature={} out of range, using {}",
                    temperature,
                    clamped
                );
            }
            config.generation.temperature = if temperature.is_nan() {
                self.generation.temperature
            } else {
                clamped
            };
        }

        config
    }

    /// Distance multiplier in effect for a source.
    pub fn effective_multiplier(&self, source: &SourceSettings) -> f32 {
        if self.strict_validation {
            source.distance_multiplier.min(1.0)
        } else {
            source.distance_multiplier
        }
    }
}

fn clamp_cosine(name: &str, value: f32) -> Option<f32> {
    if value.is_nan() {
        tracing::warn!("Override {} is NaN, ignoring", name);
        return None;
    }
    let clamped = value.clamp(0.0, 1.0);
    if clamped != value {
        tracing::warn!("Override {}={} out of range, clamped to {}", name, value, clamped);
    }
    Some(clamped)
}

fn checked_distance(name: &str, value: f32) -> Option<f32> {
    if value.is_nan() || value < 0.0 {
        tracing::warn!("Override {}={} is invalid, ignoring", name, value);
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds_pass_and_fail() {
        let t = SourceThresholds {
            max_distance: Some(0.45),
            min_cosine: 0.5,
        };
        assert!(t.passes(0.2, 0.82, 1.0));
        assert!(!t.passes(0.2, 0.49, 1.0));
        assert!(!t.passes(0.5, 0.9, 1.0));
        // Multiplier widens the distance bound
        assert!(t.passes(0.5, 0.9, 1.5));
    }

    #[test]
    fn test_thresholds_without_max_distance() {
        let t = SourceThresholds {
            max_distance: None,
            min_cosine: 0.5,
        };
        assert!(t.passes(100.0, 0.7, 1.0));
        assert!(!t.passes(0.0, 0.3, 1.0));
    }

    #[test]
    fn test_overrides_do_not_mutate_base() {
        let base = PipelineConfig::default();
        let overrides = ConfigOverrides {
            golden_enabled: Some(false),
            pops_min_cosine: Some(0.8),
            ..Default::default()
        };

        let scoped = base.with_overrides(&overrides);

        assert!(!scoped.golden.enabled);
        assert_eq!(scoped.pops.thresholds.min_cosine, 0.8);
        assert!(base.golden.enabled);
        assert_eq!(base.pops.thresholds.min_cosine, 0.5);
    }

    #[test]
    fn test_invalid_overrides_are_clamped_or_ignored() {
        let base = PipelineConfig::default();
        let overrides = ConfigOverrides {
            golden_min_cosine: Some(1.7),
            pops_min_cosine: Some(f32::NAN),
            golden_max_distance: Some(-1.0),
            temperature: Some(5.0),
            ..Default::default()
        };

        let scoped = base.with_overrides(&overrides);

        assert_eq!(scoped.golden.thresholds.min_cosine, 1.0);
        assert_eq!(scoped.pops.thresholds.min_cosine, 0.5);
        assert_eq!(scoped.golden.thresholds.max_distance, Some(0.45));
        assert_eq!(scoped.generation.temperature, 2.0);
    }

    #[test]
    fn test_strict_validation_clamps_multiplier() {
        let mut config = PipelineConfig::default();
        assert_eq!(config.effective_multiplier(&config.pops), 1.5);

        config.strict_validation = true;
        assert_eq!(config.effective_multiplier(&config.pops), 1.0);
        assert_eq!(config.effective_multiplier(&config.golden), 1.0);
    }

    #[test]
    fn test_deserialize_partial_yaml() {
        let yaml = r#"
golden:
  k: 5
pops:
  thresholds:
    min_cosine: 0.6
memory:
  strategy: hybrid
strict_validation: true
"#;
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.golden.k, 5);
        assert_eq!(config.memory.strategy, MemoryStrategy::Hybrid);
        assert_eq!(config.memory.max_pairs, 10);
        assert!(config.strict_validation);
        assert!(config.pops.enabled);
        assert_eq!(config.pops.thresholds.min_cosine, 0.6);
        assert_eq!(config.pops.thresholds.max_distance, None);
        assert_eq!(config.pops.distance_multiplier, 1.5);
    }

    #[test]
    fn test_memory_strategy_parse() {
        assert_eq!(MemoryStrategy::parse("BUFFER"), Some(MemoryStrategy::Buffer));
        assert_eq!(MemoryStrategy::parse("auto"), Some(MemoryStrategy::Auto));
        assert_eq!(MemoryStrategy::parse("lru"), None);
    }
}
