//! LanceDB collection round trips through ingestion and search.

use crate::embeddings::providers::MockProvider;
use crate::embeddings::EmbeddingProvider;
use crate::ingest::ingest;
use crate::lancedb_store::LanceDbStore;
use crate::store::VectorStore;
use crate::types::{IngestOptions, RegionTag, GOLDEN_COLLECTION, POPS_COLLECTION};
use std::path::Path;
use tempfile::TempDir;

const DIM: usize = 64;

fn write_golden(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("golden.jsonl");
    std::fs::write(
        &path,
        concat!(
            "{\"question\": \"Seed rate for wheat?\", \"answer\": \"Use 40 kg per acre.\", \"region\": \"Punjab\", \"crop\": \"wheat\"}\n",
            "{\"question\": \"Seed rate for wheat?\", \"answer\": \"Use 45 kg per acre.\", \"region\": \"Bihar\", \"crop\": \"wheat\"}\n",
            "{\"question\": \"Mustard sowing time?\", \"answer\": \"Mid October.\", \"region\": \"All India\", \"crop\": \"mustard\"}\n",
        ),
    )
    .unwrap();
    path
}

#[tokio::test]
async fn test_ingest_and_filtered_search() {
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("collections");
    let data = write_golden(temp.path());

    let store = LanceDbStore::open(&db, GOLDEN_COLLECTION, DIM).await.unwrap();
    let embedder = MockProvider::new(DIM);

    let options = IngestOptions {
        paths: vec![data],
        ..Default::default()
    };
    let stats = ingest(&store, &embedder, &options).await.unwrap();
    assert_eq!(stats.files, 1);
    assert_eq!(stats.documents, 3);
    assert_eq!(store.count().await.unwrap(), 3);

    let query = embedder.embed("wheat seed rate").await.unwrap();

    let punjab = store
        .similarity_search_with_score(&query, 5, Some("punjab"))
        .await
        .unwrap();
    assert_eq!(punjab.len(), 1);
    assert_eq!(
        punjab[0].0.metadata.region,
        RegionTag::Named("Punjab".to_string())
    );
    assert!(punjab[0].0.embedding.as_ref().is_some_and(|e| e.len() == DIM));

    let general = store
        .similarity_search_with_score(&query, 5, Some("All India"))
        .await
        .unwrap();
    assert_eq!(general.len(), 1);
    assert!(general[0].0.metadata.region.is_general());

    let all = store.similarity_search_with_score(&query, 5, None).await.unwrap();
    assert_eq!(all.len(), 3);
    assert!(all.windows(2).all(|w| w[0].1 <= w[1].1));
}

#[tokio::test]
async fn test_reingest_replaces_and_reset_clears() {
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("collections");
    let data = write_golden(temp.path());

    let store = LanceDbStore::open(&db, POPS_COLLECTION, DIM).await.unwrap();
    let embedder = MockProvider::new(DIM);
    let options = IngestOptions {
        paths: vec![data],
        ..Default::default()
    };

    ingest(&store, &embedder, &options).await.unwrap();
    ingest(&store, &embedder, &options).await.unwrap();
    assert_eq!(store.count().await.unwrap(), 3);

    let reset = IngestOptions {
        paths: vec![],
        reset: true,
        ..Default::default()
    };
    ingest(&store, &embedder, &reset).await.unwrap();
    assert_eq!(store.count().await.unwrap(), 0);

    let listed = LanceDbStore::list_collections(&db).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, POPS_COLLECTION);
}

#[tokio::test]
async fn test_dimension_mismatch_rejected() {
    let temp = TempDir::new().unwrap();
    let store = LanceDbStore::open(&temp.path().join("db"), GOLDEN_COLLECTION, DIM)
        .await
        .unwrap();

    let err = store
        .similarity_search_with_score(&[0.1; 8], 3, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("dimension mismatch"));

    let embedder = MockProvider::new(16);
    let result = ingest(&store, &embedder, &IngestOptions::default()).await;
    assert!(result.is_err());
}
