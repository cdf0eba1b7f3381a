//! Completion provider crate for the agricultural advisor.
//!
//! A provider-agnostic [`LlmClient`] trait with blocking and streaming
//! completion, and two implementations:
//! - **Ollama**: Local runtime (default)
//! - **OpenAI**: Any OpenAI-compatible chat completions server
//!
//! # Example
//! ```no_run
//! use agri_llm::{LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new("When is kharif sowing?", "llama3.2");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;
pub mod types;

// Re-export main types
pub use client::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmUsage, StreamEvent};
pub use factory::create_client;
pub use providers::{OllamaClient, OpenAiClient};
pub use types::ProviderType;
