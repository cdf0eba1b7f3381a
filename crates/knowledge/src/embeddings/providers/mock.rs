//! Offline trigram embedding provider.

use crate::embeddings::provider::EmbeddingProvider;
use agri_core::AppResult;
use std::collections::HashMap;

const STOP_WORDS: &[&str] = &[
    "the", "is", "at", "which", "on", "a", "an", "as", "are", "was", "were", "for", "to", "of",
    "in", "and", "or", "but", "with", "by", "from", "this", "that", "be", "have", "has", "had",
    "it", "its", "what", "how", "when", "should", "can", "per",
];

/// Deterministic offline provider.
///
/// Hashes character trigrams and whole words of the stopword-filtered text
/// into a fixed-size unit vector. Texts sharing vocabulary land close
/// together, which is enough to exercise ingestion and retrieval without a
/// model server.
#[derive(Debug)]
pub struct MockProvider {
    dimensions: usize,
}

fn hash_bytes(bytes: &[u8], multiplier: u64) -> u64 {
    bytes
        .iter()
        .fold(0u64, |acc, b| acc.wrapping_mul(multiplier).wrapping_add(*b as u64))
}

impl MockProvider {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0; self.dimensions];
        let lower = text.to_lowercase();

        let mut word_freq: HashMap<&str, u32> = HashMap::new();
        for word in lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() > 2 && !STOP_WORDS.contains(w))
        {
            *word_freq.entry(word).or_insert(0) += 1;
        }

        for (word, freq) in &word_freq {
            let chars: Vec<char> = word.chars().collect();
            for window in chars.windows(3) {
                let trigram: String = window.iter().collect();
                let idx = (hash_bytes(trigram.as_bytes(), 37) as usize) % self.dimensions;
                embedding[idx] += (*freq as f32).sqrt();
            }

            let idx = (hash_bytes(word.as_bytes(), 31) as usize) % self.dimensions;
            embedding[idx] += *freq as f32;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut embedding {
                *v /= norm;
            }
        }

        embedding
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for MockProvider {
    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model_name(&self) -> &str {
        "trigram-v1"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::cosine_similarity;

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[tokio::test]
    async fn test_unit_vectors_of_requested_size() {
        let provider = MockProvider::new(128);
        let texts = vec![
            "sow wheat in november".to_string(),
            "paddy nursery management".to_string(),
            "गेहूं की बुवाई नवंबर में करें 🌾".to_string(),
        ];

        let embeddings = provider.embed_batch(&texts).await.unwrap();
        assert_eq!(embeddings.len(), 3);
        for embedding in &embeddings {
            assert_eq!(embedding.len(), 128);
            assert!((norm(embedding) - 1.0).abs() < 0.001);
        }
    }

    #[tokio::test]
    async fn test_deterministic() {
        let provider = MockProvider::new(64);
        let a = provider.embed("yellow rust on wheat leaves").await.unwrap();
        let b = provider.embed("yellow rust on wheat leaves").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_shared_vocabulary_is_closer() {
        let provider = MockProvider::new(256);
        let query = provider.embed("seed rate for wheat").await.unwrap();
        let related = provider.embed("wheat seed rate is 40 kg per acre").await.unwrap();
        let unrelated = provider.embed("cotton pink bollworm traps").await.unwrap();

        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[tokio::test]
    async fn test_empty_text_is_zero_vector() {
        let provider = MockProvider::new(32);
        let embedding = provider.embed("").await.unwrap();
        assert!(embedding.iter().all(|&x| x == 0.0));
    }
}
