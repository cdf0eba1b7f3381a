//! Prompt system for the agricultural advisor.
//!
//! This crate provides structured prompt management with:
//! - YAML-based prompt definitions
//! - Built-in defaults for every prompt the pipeline issues
//! - Workspace overrides under `.agri/prompts/<id>.yml`
//! - Handlebars template rendering

pub mod builder;
pub mod defaults;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::build_prompt;
pub use defaults::{ANSWER_SYNTHESIZE, CLARIFY_QUESTIONS, INTENT_CLASSIFY};
pub use loader::{list_prompts, load_prompt, PromptLibrary};
pub use types::{BuiltPrompt, BuiltPromptMetadata, PromptBehavior, PromptDefinition, PromptOutputSpec};
