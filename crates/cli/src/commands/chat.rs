//! Chat command handler.
//!
//! Multi-turn session over stdin. Each answered turn is remembered, so
//! follow-ups like "what about Haryana?" keep the earlier topic.

use super::{build_pipeline, print_stream};
use agri_core::{config::AppConfig, AppError, AppResult, MemoryStrategy};
use agri_pipeline::{ConversationContext, PipelineRequest};
use clap::Args;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Start an interactive session
#[derive(Args, Debug)]
pub struct ChatCommand {
    /// State or district to prioritize for every turn
    #[arg(short, long)]
    pub region: Option<String>,

    /// Memory strategy (buffer, summary, hybrid, auto)
    #[arg(long)]
    pub memory: Option<String>,

    /// Disable streaming
    #[arg(long)]
    pub no_stream: bool,
}

impl ChatCommand {
    /// Execute the chat command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing chat command");
        tracing::debug!("Chat command options: {:?}", self);

        let strategy = self.strategy()?;
        let pipeline = build_pipeline(config).await?;

        let mut settings = pipeline.config().memory.clone();
        if let Some(strategy) = strategy {
            settings.strategy = strategy;
        }
        let mut session = ConversationContext::new(settings);

        println!("Ask about crops, soil, pests or weather. Type 'exit' to leave, '/reset' to forget the conversation.");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("\n> ");
            std::io::stdout().flush().ok();

            let Some(line) = lines.next_line().await? else {
                break;
            };
            let question = line.trim();

            match question {
                "" => continue,
                "exit" | "quit" => break,
                "/reset" => {
                    session = ConversationContext::new(session.settings().clone());
                    println!("Conversation cleared.");
                    continue;
                }
                "/context" => {
                    println!("{}", session.get_formatted_context());
                    continue;
                }
                _ => {}
            }

            let mut request = PipelineRequest::new(question);
            if let Some(ref region) = self.region {
                request = request.with_region(region.clone());
            }

            let result = if self.no_stream {
                let result = pipeline.run_in_session(&request, &mut session, None).await;
                println!("{}", result.answer);
                result
            } else {
                let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
                let printer = print_stream(rx);
                let result = pipeline.run_in_session(&request, &mut session, Some(&tx)).await;
                drop(tx);
                if printer.await.unwrap_or(false) {
                    println!();
                } else {
                    println!("{}", result.answer);
                }
                result
            };

            println!("[{}]", result.source);
            for question in &result.clarifying_questions {
                println!("  ? {}", question);
            }
            tracing::debug!(
                "Session at {} turn(s), strategy {:?}",
                session.turns(),
                session.active_strategy()
            );
        }

        Ok(())
    }

    fn strategy(&self) -> AppResult<Option<MemoryStrategy>> {
        self.memory
            .as_deref()
            .map(|name| {
                MemoryStrategy::parse(name).ok_or_else(|| {
                    AppError::Config(format!(
                        "Unknown memory strategy: {}. Supported: buffer, summary, hybrid, auto",
                        name
                    ))
                })
            })
            .transpose()
    }
}
