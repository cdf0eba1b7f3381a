//! Ask command handler.
//!
//! Runs one question through the pipeline and prints the answer with its
//! source.

use super::{build_pipeline, print_stream};
use agri_core::{config::AppConfig, AppError, AppResult, ConfigOverrides};
use agri_pipeline::{PipelineRequest, PipelineResult};
use clap::Args;
use std::path::PathBuf;

/// Ask an agricultural question
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: Option<String>,

    /// Read the question from a file
    #[arg(short, long, conflicts_with = "question")]
    pub file: Option<PathBuf>,

    /// State or district to prioritize
    #[arg(short, long)]
    pub region: Option<String>,

    /// Skip the Golden collection
    #[arg(long)]
    pub no_golden: bool,

    /// Skip the PoPs collection
    #[arg(long)]
    pub no_pops: bool,

    /// Require keyword overlap between question and passage
    #[arg(long)]
    pub strict: bool,

    /// Do not generate clarifying questions
    #[arg(long)]
    pub no_clarify: bool,

    /// Minimum cosine for Golden hits
    #[arg(long)]
    pub golden_min_cosine: Option<f32>,

    /// Minimum cosine for PoPs hits
    #[arg(long)]
    pub pops_min_cosine: Option<f32>,

    /// Answer generation temperature (0.0-2.0)
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Disable streaming
    #[arg(long)]
    pub no_stream: bool,

    /// Print the reasoning trace
    #[arg(long)]
    pub trace: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    /// Execute the ask command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        let question = self
            .get_question()?
            .ok_or_else(|| AppError::Config("No question provided".to_string()))?;

        let pipeline = build_pipeline(config).await?;

        let mut request = PipelineRequest::new(question).with_overrides(self.overrides());
        if let Some(ref region) = self.region {
            request = request.with_region(region.clone());
        }

        let result = if self.is_streaming() {
            let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
            let printer = print_stream(rx);
            let result = pipeline.run_streaming(&request, tx).await;
            if printer.await.unwrap_or(false) {
                println!();
            } else {
                println!("{}", result.answer);
            }
            result
        } else {
            let result = pipeline.run(&request).await;
            if !self.json {
                println!("{}", result.answer);
            }
            result
        };

        if self.json {
            let json = serde_json::to_string_pretty(&result)
                .map_err(|e| AppError::Serialization(e.to_string()))?;
            println!("{}", json);
        } else {
            self.print_details(&result);
        }

        Ok(())
    }

    fn print_details(&self, result: &PipelineResult) {
        println!();
        match result.distance {
            Some(distance) => println!(
                "Source: {} (similarity {:.2}, distance {:.3})",
                result.source, result.similarity, distance
            ),
            None => println!("Source: {}", result.source),
        }

        if !result.clarifying_questions.is_empty() {
            println!("\nTo give a better answer, it would help to know:");
            for question in &result.clarifying_questions {
                println!("  - {}", question);
            }
        }

        if self.trace {
            println!("\nTrace:");
            for (i, line) in result.trace.iter().enumerate() {
                println!("  {}. {}", i + 1, line);
            }
        }
    }

    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            golden_enabled: self.no_golden.then_some(false),
            pops_enabled: self.no_pops.then_some(false),
            golden_min_cosine: self.golden_min_cosine,
            pops_min_cosine: self.pops_min_cosine,
            strict_validation: self.strict.then_some(true),
            clarification_enabled: self.no_clarify.then_some(false),
            temperature: self.temperature,
            ..Default::default()
        }
    }

    /// Get the question text from the argument or a file.
    fn get_question(&self) -> AppResult<Option<String>> {
        if let Some(ref question) = self.question {
            return Ok(Some(question.clone()));
        }
        match self.file {
            Some(ref path) => Ok(Some(std::fs::read_to_string(path)?.trim().to_string())),
            None => Ok(None),
        }
    }

    /// JSON output is printed whole, never streamed.
    pub fn is_streaming(&self) -> bool {
        !self.no_stream && !self.json
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        ask: AskCommand,
    }

    #[test]
    fn test_flags_become_overrides() {
        let cmd = Harness::parse_from(["agri", "seed rate?", "--no-golden", "--strict", "--temperature", "0.1"]).ask;
        let overrides = cmd.overrides();
        assert_eq!(overrides.golden_enabled, Some(false));
        assert_eq!(overrides.pops_enabled, None);
        assert_eq!(overrides.strict_validation, Some(true));
        assert_eq!(overrides.temperature, Some(0.1));
    }

    #[test]
    fn test_no_flags_no_overrides() {
        let cmd = Harness::parse_from(["agri", "seed rate?"]).ask;
        assert!(cmd.overrides().is_empty());
        assert!(cmd.is_streaming());
    }

    #[test]
    fn test_json_disables_streaming() {
        let cmd = Harness::parse_from(["agri", "seed rate?", "--json"]).ask;
        assert!(!cmd.is_streaming());
    }
}
