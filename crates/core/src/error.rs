//! Error types for the agricultural advisory pipeline.
//!
//! Every external-call site in the pipeline has a defined degraded output, so
//! most of these variants are recovered inside the orchestrator and only show
//! up in logs and reasoning traces. The CLI and ingestion paths propagate them.

use thiserror::Error;

/// Unified error type shared by all workspace crates.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors (invalid files, unknown providers, bad overrides)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Completion service transport or protocol errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Completion service failed while classifying a question's domain
    #[error("Intent classification error: {0}")]
    IntentClassification(String),

    /// Vector index or embedding service unreachable or malformed
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Answer generation failed
    #[error("Synthesis error: {0}")]
    Synthesis(String),

    /// Collection storage and ingestion errors
    #[error("Knowledge error: {0}")]
    Knowledge(String),

    /// Prompt template errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Audit log write failures
    #[error("Logging error: {0}")]
    Logging(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
