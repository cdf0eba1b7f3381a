//! Ingest command handler.
//!
//! Loads JSONL records or plain text documents into the Golden or PoPs
//! collection.

use agri_core::{config::AppConfig, AppError, AppResult};
use agri_knowledge::{
    create_provider, ingest, IngestOptions, LanceDbStore, GOLDEN_COLLECTION, POPS_COLLECTION,
};
use clap::{Args, ValueEnum};
use std::path::PathBuf;

/// Target collection.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    /// Curated question/answer records
    Golden,
    /// Package-of-practices guidelines
    Pops,
}

impl Collection {
    fn table_name(self) -> &'static str {
        match self {
            Self::Golden => GOLDEN_COLLECTION,
            Self::Pops => POPS_COLLECTION,
        }
    }
}

/// Load documents into a collection
#[derive(Args, Debug)]
pub struct IngestCommand {
    /// Collection to load into
    #[arg(value_enum)]
    pub collection: Collection,

    /// Files or directories (.jsonl records, .txt/.md documents)
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Region for entries that carry none
    #[arg(short, long)]
    pub region: Option<String>,

    /// Topic for plain text documents
    #[arg(short, long)]
    pub topic: Option<String>,

    /// Target chunk size in characters for plain text documents
    #[arg(long, default_value_t = 1000)]
    pub chunk_size: usize,

    /// Clear the collection before loading
    #[arg(long)]
    pub reset: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl IngestCommand {
    /// Execute the ingest command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ingest command");
        tracing::debug!("Ingest command options: {:?}", self);

        if self.chunk_size == 0 {
            return Err(AppError::Config("--chunk-size must be positive".to_string()));
        }

        let embedder = create_provider(&config.embedding)?;
        let store = LanceDbStore::open(
            &config.collections_dir(),
            self.collection.table_name(),
            embedder.dimensions(),
        )
        .await?;

        let options = IngestOptions {
            paths: self.paths.clone(),
            region: self.region.clone(),
            topic: self.topic.clone(),
            chunk_size: self.chunk_size,
            reset: self.reset,
            ..Default::default()
        };

        let stats = ingest(&store, embedder.as_ref(), &options).await?;
        let total = store.count().await?;

        if self.json {
            let output = serde_json::json!({
                "collection": self.collection.table_name(),
                "files": stats.files,
                "documents": stats.documents,
                "skipped": stats.skipped,
                "bytes": stats.bytes,
                "durationSecs": stats.duration_secs,
                "total": total,
            });
            let json = serde_json::to_string_pretty(&output)
                .map_err(|e| AppError::Serialization(e.to_string()))?;
            println!("{}", json);
        } else {
            println!(
                "Loaded {} document(s) from {} file(s) into '{}' in {:.1}s",
                stats.documents,
                stats.files,
                self.collection.table_name(),
                stats.duration_secs
            );
            if stats.skipped > 0 {
                println!("Skipped {} record(s)", stats.skipped);
            }
            println!("Collection now holds {} document(s)", total);
        }

        Ok(())
    }
}
