//! Command handlers for the Agri Advisor CLI.
//!
//! This module organizes all CLI commands into separate submodules, plus
//! the wiring shared by the commands that answer questions.

pub mod ask;
pub mod chat;
pub mod collections;
pub mod ingest;

// Re-export command types for convenience
pub use ask::AskCommand;
pub use chat::ChatCommand;
pub use collections::CollectionsCommand;
pub use ingest::IngestCommand;

use agri_core::config::{AppConfig, ProviderConfig};
use agri_core::AppResult;
use agri_knowledge::{create_provider, LanceDbStore, GOLDEN_COLLECTION, POPS_COLLECTION};
use agri_llm::{create_client, LlmClient, OllamaClient};
use agri_pipeline::{AuditLog, Pipeline};
use agri_prompt::PromptLibrary;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

/// Assemble a pipeline from the workspace configuration.
pub(crate) async fn build_pipeline(config: &AppConfig) -> AppResult<Pipeline> {
    config.validate()?;

    let llm = completion_client(config)?;
    let embedder = create_provider(&config.embedding)?;
    tracing::debug!(
        "Embedding with {}/{} ({} dimensions)",
        embedder.provider_name(),
        embedder.model_name(),
        embedder.dimensions()
    );

    let db_path = config.collections_dir();
    let golden = LanceDbStore::open(&db_path, GOLDEN_COLLECTION, embedder.dimensions()).await?;
    let pops = LanceDbStore::open(&db_path, POPS_COLLECTION, embedder.dimensions()).await?;

    let prompts = PromptLibrary::load(&config.workspace)?;

    let pipeline = Pipeline::new(
        Arc::new(config.pipeline.clone()),
        llm,
        config.model.clone(),
        embedder,
        Arc::new(golden),
        Arc::new(pops),
        &prompts,
    )?;

    if !config.pipeline.audit_enabled {
        return Ok(pipeline);
    }

    match AuditLog::open(config.audit_path()) {
        Ok(audit) => Ok(pipeline.with_audit(Arc::new(audit))),
        Err(e) => {
            tracing::warn!("Audit log unavailable, continuing without it: {}", e);
            Ok(pipeline)
        }
    }
}

fn completion_client(config: &AppConfig) -> AppResult<Arc<dyn LlmClient>> {
    let provider_config = config.get_provider_config(&config.provider);

    if let Some(ProviderConfig::Ollama {
        endpoint,
        timeout: Some(secs),
        ..
    }) = provider_config
    {
        tracing::debug!("Using Ollama at {} with {}s timeout", endpoint, secs);
        return Ok(Arc::new(OllamaClient::with_timeout(
            endpoint.clone(),
            Duration::from_secs(*secs),
        )));
    }

    let endpoint = provider_config.and_then(ProviderConfig::endpoint);
    let api_key = config.resolve_api_key(&config.provider);
    create_client(&config.provider, endpoint, api_key.as_deref())
}

/// Print streamed answer text to stdout as it arrives.
///
/// The task ends when every sender is dropped.
pub(crate) fn print_stream(mut rx: UnboundedReceiver<String>) -> JoinHandle<bool> {
    tokio::spawn(async move {
        let mut printed = false;
        while let Some(text) = rx.recv().await {
            print!("{}", text);
            std::io::stdout().flush().ok();
            printed = true;
        }
        printed
    })
}
