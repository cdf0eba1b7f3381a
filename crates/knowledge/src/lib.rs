//! Document collections for the agricultural advisor.
//!
//! Provides embedding providers, the [`VectorStore`] abstraction the
//! retrievers search through, a LanceDB-backed implementation, and
//! ingestion of JSONL records and text files.

pub mod embeddings;
pub mod ingest;
pub mod lancedb_store;
pub mod store;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use embeddings::{create_provider, EmbeddingProvider};
pub use ingest::ingest;
pub use lancedb_store::LanceDbStore;
pub use store::{cosine_similarity, VectorStore};
pub use types::{
    content_id, is_general_region, CollectionStats, Document, DocumentMetadata, IngestOptions,
    IngestStats, RegionTag, GENERAL_REGION, GOLDEN_COLLECTION, POPS_COLLECTION, WILDCARD_REGION,
};
