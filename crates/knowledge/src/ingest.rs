//! Document ingestion into collections.
//!
//! Two input formats are understood:
//! - `.jsonl`: one record per line, `{"content": ..., "region": ..., "crop": ...}`,
//!   or question/answer records `{"question": ..., "answer": ...}`
//! - `.txt` / `.md`: plain text split into chunks, tagged with the region
//!   and topic given in [`IngestOptions`]
//!
//! Document ids are content hashes, so re-ingesting a file replaces rather
//! than duplicates its documents.

use crate::embeddings::EmbeddingProvider;
use crate::lancedb_store::LanceDbStore;
use crate::types::{Document, DocumentMetadata, IngestOptions, IngestStats, RegionTag};
use agri_core::{AppError, AppResult};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use text_splitter::TextSplitter;
use walkdir::WalkDir;

const CONTENT_KEYS: &[&str] = &["content", "text", "page_content"];

/// Parsed contents of one input file.
#[derive(Debug, Default)]
pub struct LoadedFile {
    pub documents: Vec<Document>,
    pub skipped: u32,
    pub bytes: u64,
}

/// Ingest files into a collection.
pub async fn ingest(
    store: &LanceDbStore,
    embedder: &dyn EmbeddingProvider,
    options: &IngestOptions,
) -> AppResult<IngestStats> {
    let start = Instant::now();

    if embedder.dimensions() != store.embedding_dim() {
        return Err(AppError::Knowledge(format!(
            "Embedding provider produces {} dimensions but the collection expects {}",
            embedder.dimensions(),
            store.embedding_dim()
        )));
    }

    if options.reset {
        store.reset().await?;
    }

    let files = collect_files(&options.paths);
    tracing::info!("Ingesting {} files", files.len());

    let mut stats = IngestStats::default();
    let mut seen = HashSet::new();
    let mut pending = Vec::new();

    for path in &files {
        let loaded = match load_file(path, options) {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::warn!("Skipping {:?}: {}", path, e);
                stats.skipped += 1;
                continue;
            }
        };

        stats.files += 1;
        stats.bytes += loaded.bytes;
        stats.skipped += loaded.skipped;

        let untagged = loaded
            .documents
            .iter()
            .filter(|d| d.metadata.region == RegionTag::Untagged)
            .count();
        if untagged > 0 {
            tracing::warn!(
                "{} documents in {:?} have no region and will only match unfiltered searches",
                untagged,
                path
            );
        }

        for doc in loaded.documents {
            if seen.insert(doc.id.clone()) {
                pending.push(doc);
            } else {
                stats.skipped += 1;
            }
        }
    }

    for batch in pending.chunks(options.batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|d| d.content.clone()).collect();
        let embeddings = embedder.embed_batch(&texts).await?;

        let documents: Vec<Document> = batch
            .iter()
            .cloned()
            .zip(embeddings)
            .map(|(doc, embedding)| doc.with_embedding(embedding))
            .collect();

        stats.documents += store.add_documents(&documents).await? as u32;
        tracing::debug!("Ingested {}/{} documents", stats.documents, pending.len());
    }

    stats.duration_secs = start.elapsed().as_secs_f64();

    tracing::info!(
        "Ingestion completed: {} files, {} documents, {} skipped in {:.2}s",
        stats.files,
        stats.documents,
        stats.skipped,
        stats.duration_secs
    );

    Ok(stats)
}

fn is_supported(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("jsonl") | Some("txt") | Some("md")
    )
}

/// Expand files and directories into the supported input files, sorted.
pub fn collect_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_file() {
            files.push(path.clone());
        } else if path.is_dir() {
            files.extend(
                WalkDir::new(path)
                    .follow_links(false)
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file() && is_supported(e.path()))
                    .map(|e| e.into_path()),
            );
        } else {
            tracing::warn!("Path does not exist: {:?}", path);
        }
    }

    files.sort();
    files.dedup();
    files
}

/// Parse one file into documents (without embeddings).
pub fn load_file(path: &Path, options: &IngestOptions) -> AppResult<LoadedFile> {
    let text = std::fs::read_to_string(path)?;
    let bytes = text.len() as u64;

    let mut loaded = match path.extension().and_then(|e| e.to_str()) {
        Some("jsonl") => parse_jsonl(&text, options),
        Some("txt") | Some("md") => LoadedFile {
            documents: split_text(&text, options),
            ..Default::default()
        },
        _ => {
            return Err(AppError::Knowledge(format!(
                "Unsupported file type: {:?}",
                path
            )))
        }
    };

    loaded.bytes = bytes;
    Ok(loaded)
}

fn parse_jsonl(text: &str, options: &IngestOptions) -> LoadedFile {
    let mut loaded = LoadedFile::default();

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let record: serde_json::Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Line {}: invalid JSON: {}", line_no + 1, e);
                loaded.skipped += 1;
                continue;
            }
        };

        match record_to_document(&record, options) {
            Some(doc) => loaded.documents.push(doc),
            None => {
                tracing::debug!("Line {}: record has no content", line_no + 1);
                loaded.skipped += 1;
            }
        }
    }

    loaded
}

/// Build a document from one JSON record, or `None` if it has no content.
fn record_to_document(record: &serde_json::Value, options: &IngestOptions) -> Option<Document> {
    let object = record.as_object()?;

    let field = |key: &str| {
        object
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    let content = match CONTENT_KEYS.iter().find_map(|k| field(k)) {
        Some(content) => content.to_string(),
        None => match (field("question"), field("answer")) {
            (Some(q), Some(a)) => format!("Question: {}\nAnswer: {}", q, a),
            (None, Some(a)) => a.to_string(),
            _ => return None,
        },
    };

    // Metadata may be nested or inline with the record
    let raw_metadata = match object.get("metadata") {
        Some(nested) if nested.is_object() => nested.clone(),
        _ => {
            let mut inline = object.clone();
            for key in CONTENT_KEYS.iter().chain(["question", "answer"].iter()) {
                inline.remove(*key);
            }
            serde_json::Value::Object(inline)
        }
    };

    Some(Document::new(content, with_defaults(DocumentMetadata::from_value(&raw_metadata), options)))
}

fn with_defaults(mut metadata: DocumentMetadata, options: &IngestOptions) -> DocumentMetadata {
    if metadata.region == RegionTag::Untagged {
        if let Some(region) = &options.region {
            metadata.region = RegionTag::parse(region);
        }
    }
    if metadata.topic.is_none() {
        metadata.topic = options.topic.clone().filter(|t| !t.trim().is_empty());
    }
    metadata
}

fn split_text(text: &str, options: &IngestOptions) -> Vec<Document> {
    let splitter = TextSplitter::new(options.chunk_size.max(1));
    let base = with_defaults(DocumentMetadata::new(RegionTag::Untagged, None), options);

    let documents: Vec<Document> = splitter
        .chunks(text)
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| Document::new(chunk, base.clone()))
        .collect();

    tracing::debug!(
        "Text splitter created {} chunks from {} bytes",
        documents.len(),
        text.len()
    );

    documents
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn options(region: Option<&str>) -> IngestOptions {
        IngestOptions {
            region: region.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_jsonl_records() {
        let text = r#"
{"content": "Use 40 kg seed per acre.", "State": "Punjab", "crop": "Wheat"}
{"question": "When to sow mustard?", "answer": "October.", "region": "All India"}
not json
{"region": "Haryana"}
"#;
        let loaded = parse_jsonl(text, &options(None));

        assert_eq!(loaded.documents.len(), 2);
        assert_eq!(loaded.skipped, 2);

        let wheat = &loaded.documents[0];
        assert_eq!(wheat.metadata.region, RegionTag::Named("Punjab".to_string()));
        assert_eq!(wheat.metadata.topic.as_deref(), Some("Wheat"));

        let mustard = &loaded.documents[1];
        assert!(mustard.content.starts_with("Question: When to sow mustard?"));
        assert!(mustard.metadata.region.is_general());
        assert!(mustard.metadata.extra.is_empty());
    }

    #[test]
    fn test_region_flag_fills_missing_region_only() {
        let text = "{\"content\": \"a\"}\n{\"content\": \"b\", \"region\": \"Bihar\"}\n";
        let loaded = parse_jsonl(text, &options(Some("Punjab")));

        assert_eq!(
            loaded.documents[0].metadata.region,
            RegionTag::Named("Punjab".to_string())
        );
        assert_eq!(
            loaded.documents[1].metadata.region,
            RegionTag::Named("Bihar".to_string())
        );
    }

    #[test]
    fn test_nested_metadata() {
        let text = r#"{"text": "Apply zinc sulphate.", "metadata": {"Region": "Tamil Nadu", "Crop": "Rice", "source": "TNAU"}}"#;
        let loaded = parse_jsonl(text, &options(None));

        let doc = &loaded.documents[0];
        assert_eq!(doc.metadata.region.as_str(), "Tamil Nadu");
        assert_eq!(doc.metadata.extra.get("source").and_then(|v| v.as_str()), Some("TNAU"));
    }

    #[test]
    fn test_split_text_applies_flags() {
        let text = "Paddy nursery should be raised in June. ".repeat(60);
        let opts = IngestOptions {
            region: Some("All India".to_string()),
            topic: Some("Rice".to_string()),
            chunk_size: 200,
            ..Default::default()
        };

        let docs = split_text(&text, &opts);
        assert!(docs.len() > 1);
        for doc in &docs {
            assert!(doc.content.len() <= 200);
            assert!(doc.metadata.region.is_general());
            assert_eq!(doc.metadata.topic.as_deref(), Some("Rice"));
        }
    }

    #[test]
    fn test_collect_files_filters_extensions() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("punjab");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(temp.path().join("golden.jsonl"), "{}").unwrap();
        std::fs::write(nested.join("wheat.md"), "# Wheat").unwrap();
        std::fs::write(nested.join("photo.jpg"), [0u8, 1, 2]).unwrap();

        let files = collect_files(&[temp.path().to_path_buf()]);
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| is_supported(f)));
    }

    #[test]
    fn test_load_file_counts_bytes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("notes.txt");
        std::fs::write(&path, "Irrigate at crown root initiation stage.").unwrap();

        let loaded = load_file(&path, &options(Some("Punjab"))).unwrap();
        assert_eq!(loaded.bytes, 40);
        assert_eq!(loaded.documents.len(), 1);

        let bad = temp.path().join("data.csv");
        std::fs::write(&bad, "a,b").unwrap();
        assert!(load_file(&bad, &options(None)).is_err());
    }
}
