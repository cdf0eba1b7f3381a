//! Agri Advisor Core Library
//!
//! Foundational utilities shared by every crate in the workspace:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Application and pipeline configuration

pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline_config;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use pipeline_config::{
    ConfigOverrides, GenerationSettings, MemorySettings, MemoryStrategy, PipelineConfig,
    SourceSettings, SourceThresholds,
};
