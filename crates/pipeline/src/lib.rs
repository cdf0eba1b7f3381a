//! Agricultural advisory retrieval pipeline.
//!
//! Answers farmers' questions from two curated collections, a Golden set of
//! question/answer records and package-of-practices (PoPs) guidelines,
//! falling back to generation when neither answers confidently:
//! - intent check with a keyword heuristic and an optional classifier call
//! - region-prioritized retrieval with recomputed cosine, threshold and
//!   keyword gating
//! - conversation memory with buffer, summary and hybrid strategies
//! - answer synthesis with streaming cleanup of planning text
//! - an append-only audit log
//!
//! # Example
//!
//! ```no_run
//! use agri_pipeline::{Pipeline, PipelineRequest};
//!
//! # async fn example(pipeline: Pipeline) {
//! let request = PipelineRequest::new("What is the seed rate for wheat?").with_region("Punjab");
//! let result = pipeline.run(&request).await;
//! println!("[{}] {}", result.source, result.answer);
//! # }
//! ```

pub mod audit;
pub mod clarification;
pub mod entities;
pub mod intent;
pub mod keywords;
pub mod memory;
pub mod orchestrator;
pub mod region;
pub mod retriever;
pub mod sanitizer;
pub mod synthesizer;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use audit::{AuditLog, AuditRecord};
pub use memory::ConversationContext;
pub use orchestrator::{Pipeline, REFUSAL_MESSAGE, SERVICE_UNAVAILABLE_MESSAGE};
pub use region::prioritize_regions;
pub use types::{
    Diagnostics, Exchange, IntentDecision, PipelineRequest, PipelineResult, ResultMetadata,
    RetrieverHit, SourceDiagnostics, SourceLabel, SourceOutcome,
};
