//! Region-aware retrieval with independent re-scoring.
//!
//! A [`Retriever`] wraps one collection. It walks the region priority list,
//! stops at the first region that yields an admitted candidate, and
//! recomputes every candidate's cosine similarity from embeddings rather
//! than trusting the index's own score.
//!
//! Threshold and keyword gating live in [`evaluate`], separate from
//! retrieval, so the same hits can be judged under different
//! request-scoped configurations.

use crate::keywords::{mentions_topic, passes_keyword_gate};
use crate::types::{RetrieverHit, SourceDiagnostics, SourceLabel, SourceOutcome};
use agri_core::{AppError, AppResult, SourceSettings};
use agri_knowledge::{cosine_similarity, Document, EmbeddingProvider, VectorStore, WILDCARD_REGION};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Hits from one retriever search.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    /// Admitted hits, best first
    pub hits: Vec<RetrieverHit>,

    /// Region filters queried, in order
    pub regions_tried: Vec<String>,

    /// Region that produced the hits
    pub region_used: Option<String>,

    /// Set when the query could not be embedded
    pub error: Option<String>,
}

/// Order hits by descending cosine, then ascending distance.
pub fn rank_hits(hits: &mut [RetrieverHit]) {
    hits.sort_by(|a, b| {
        b.cosine
            .total_cmp(&a.cosine)
            .then_with(|| a.distance.total_cmp(&b.distance))
    });
}

/// Retriever over one collection.
pub struct Retriever {
    label: SourceLabel,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl Retriever {
    pub fn new(
        label: SourceLabel,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            label,
            store,
            embedder,
        }
    }

    pub fn label(&self) -> SourceLabel {
        self.label
    }

    /// Search the collection region by region.
    ///
    /// Never fails: an embedding failure yields no hits with `error` set,
    /// and an index failure for one region moves on to the next.
    pub async fn search(&self, question: &str, regions: &[String], k: usize) -> SearchOutcome {
        let mut outcome = SearchOutcome::default();

        let query_embedding = match self.embedder.embed(question).await {
            Ok(embedding) => embedding,
            Err(e) => {
                let error = AppError::Retrieval(format!("query embedding failed: {}", e));
                tracing::warn!("{}: {}", self.label, error);
                outcome.error = Some(error.to_string());
                return outcome;
            }
        };

        for region in regions {
            outcome.regions_tried.push(region.clone());

            match self.search_region(question, &query_embedding, region, k).await {
                Ok(hits) if !hits.is_empty() => {
                    tracing::debug!(
                        "{}: {} admitted hits in region '{}'",
                        self.label,
                        hits.len(),
                        region
                    );
                    outcome.hits = hits;
                    outcome.region_used = Some(region.clone());
                    break;
                }
                Ok(_) => {
                    tracing::debug!("{}: nothing admitted in region '{}'", self.label, region);
                }
                Err(e) => {
                    tracing::warn!("{}: region '{}' failed: {}", self.label, region, e);
                }
            }
        }

        outcome
    }

    async fn search_region(
        &self,
        question: &str,
        query_embedding: &[f32],
        region: &str,
        k: usize,
    ) -> AppResult<Vec<RetrieverHit>> {
        let filter = (region != WILDCARD_REGION).then_some(region);

        let candidates = self
            .store
            .similarity_search_with_score(query_embedding, k, filter)
            .await
            .map_err(|e| AppError::Retrieval(e.to_string()))?;

        let admitted: Vec<(Document, f32)> = candidates
            .into_iter()
            .filter(|(doc, _)| !doc.content.trim().is_empty())
            .filter(|(doc, _)| doc.metadata.region.admits(region))
            .filter(|(doc, _)| match &doc.metadata.topic {
                Some(topic) if !mentions_topic(question, topic) => {
                    tracing::debug!(
                        "{}: rejecting '{}' candidate for a question that does not mention it",
                        self.label,
                        topic
                    );
                    false
                }
                _ => true,
            })
            .collect();

        if admitted.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = self.document_embeddings(&admitted, query_embedding.len()).await?;

        let mut hits: Vec<RetrieverHit> = admitted
            .into_iter()
            .zip(embeddings)
            .map(|((doc, distance), embedding)| RetrieverHit {
                source: self.label,
                cosine: cosine_similarity(query_embedding, &embedding),
                content: doc.content,
                metadata: doc.metadata,
                distance,
                region_used: region.to_string(),
            })
            .collect();

        rank_hits(&mut hits);
        Ok(hits)
    }

    /// Stored embeddings where usable, the rest embedded in one batch.
    async fn document_embeddings(
        &self,
        docs: &[(Document, f32)],
        dimensions: usize,
    ) -> AppResult<Vec<Vec<f32>>> {
        let stored = |doc: &Document| {
            doc.embedding
                .as_ref()
                .filter(|e| e.len() == dimensions)
                .cloned()
        };

        let missing: Vec<String> = docs
            .iter()
            .filter(|(doc, _)| stored(doc).is_none())
            .map(|(doc, _)| doc.content.clone())
            .collect();

        let computed = if missing.is_empty() {
            Vec::new()
        } else {
            self.embedder
                .embed_batch(&missing)
                .await
                .map_err(|e| AppError::Retrieval(format!("document embedding failed: {}", e)))?
        };
        let mut computed = computed.into_iter();

        docs.iter()
            .map(|(doc, _)| {
                stored(doc).or_else(|| computed.next()).ok_or_else(|| {
                    AppError::Retrieval("embedding service returned too few vectors".to_string())
                })
            })
            .collect()
    }
}

/// Verdict on one search outcome under a configuration.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    /// Hits passing thresholds and the keyword gate, best first
    pub passing: Vec<RetrieverHit>,

    /// Hits passing thresholds but failing the keyword gate
    pub filtered: Vec<RetrieverHit>,

    pub outcome: SourceOutcome,

    pub diagnostics: SourceDiagnostics,
}

impl Evaluation {
    /// The hit a source answers with, if any.
    pub fn accepted(&self) -> Option<&RetrieverHit> {
        self.passing.first()
    }

    /// Best candidate regardless of gating.
    pub fn best(&self) -> Option<&RetrieverHit> {
        self.passing.first().or_else(|| self.filtered.first())
    }
}

/// Apply threshold and keyword gating to a search outcome.
pub fn evaluate(
    search: &SearchOutcome,
    settings: &SourceSettings,
    multiplier: f32,
    question_keywords: &BTreeSet<String>,
) -> Evaluation {
    let mut passing = Vec::new();
    let mut filtered = Vec::new();

    for hit in &search.hits {
        if !settings.thresholds.passes(hit.distance, hit.cosine, multiplier) {
            tracing::debug!(
                "{} hit below threshold: cosine {:.3}, distance {:.3}",
                hit.source,
                hit.cosine,
                hit.distance
            );
            continue;
        }
        if passes_keyword_gate(question_keywords, &hit.content) {
            passing.push(hit.clone());
        } else {
            filtered.push(hit.clone());
        }
    }

    let outcome = if search.hits.is_empty() {
        SourceOutcome::NoResults
    } else if !passing.is_empty() {
        SourceOutcome::Accepted
    } else if !filtered.is_empty() {
        SourceOutcome::FilteredByKeywords
    } else {
        SourceOutcome::BelowThreshold
    };

    let top = search.hits.first();
    let diagnostics = SourceDiagnostics {
        attempted: true,
        regions_tried: search.regions_tried.clone(),
        region_used: search.region_used.clone(),
        candidates: search.hits.len(),
        best_cosine: top.map(|h| h.cosine),
        best_distance: top.map(|h| h.distance),
        filtered_for_context: filtered.len(),
        outcome,
    };

    Evaluation {
        passing,
        filtered,
        outcome,
        diagnostics,
    }
}
