//! Vector store abstraction over a region-filterable document collection.

use crate::types::Document;
use agri_core::AppResult;

/// A searchable document collection.
///
/// Implementations return candidates ordered by ascending distance. The
/// region filter is pushed down to the backend when given, but callers
/// still verify each candidate's region themselves.
#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    /// Collection name (e.g. "golden").
    fn name(&self) -> &str;

    /// Return up to `k` nearest documents with their backend distance.
    ///
    /// `region_filter` is a canonical region label; `None` means no filter.
    async fn similarity_search_with_score(
        &self,
        query_embedding: &[f32],
        k: usize,
        region_filter: Option<&str>,
    ) -> AppResult<Vec<(Document, f32)>>;
}

/// Cosine similarity between two vectors.
///
/// Returns 0.0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical_and_orthogonal() {
        assert!((cosine_similarity(&[1.0, 2.0], &[2.0, 4.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
