//! Collections command handler.

use agri_core::{config::AppConfig, AppError, AppResult};
use agri_knowledge::LanceDbStore;
use clap::Args;

/// Show collection sizes
#[derive(Args, Debug)]
pub struct CollectionsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl CollectionsCommand {
    /// Execute the collections command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing collections command");

        let collections = LanceDbStore::list_collections(&config.collections_dir()).await?;

        if self.json {
            let json = serde_json::to_string_pretty(&collections)
                .map_err(|e| AppError::Serialization(e.to_string()))?;
            println!("{}", json);
            return Ok(());
        }

        if collections.is_empty() {
            println!("No collections yet. Load some with 'agri ingest golden <file.jsonl>'.");
            return Ok(());
        }

        for collection in &collections {
            println!("{:<12} {:>8} document(s)", collection.name, collection.documents);
        }
        Ok(())
    }
}
