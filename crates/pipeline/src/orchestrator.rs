//! Request orchestration.
//!
//! One request moves through
//! `INTENT_CHECK → (REFUSED | RETRIEVE_GOLDEN) → [RETRIEVE_POPS] → SYNTHESIZE → DONE`.
//! Every external call has a degraded output, so [`Pipeline::run`] always
//! returns a well-formed [`PipelineResult`]; failures surface only in the
//! reasoning trace and metadata.
//!
//! Per-request overrides are applied to a copy of the shared configuration.
//! Concurrent requests share nothing mutable except the audit log.

use crate::audit::AuditLog;
use crate::clarification::ClarificationGenerator;
use crate::intent::IntentClassifier;
use crate::keywords::extract_keywords;
use crate::memory::ConversationContext;
use crate::region::prioritize_regions;
use crate::retriever::{evaluate, Evaluation, Retriever};
use crate::synthesizer::{direct_answer, AnswerSynthesizer, SynthesisInput};
use crate::types::{
    Diagnostics, PipelineRequest, PipelineResult, RetrieverHit, SourceDiagnostics, SourceLabel,
    SourceOutcome,
};
use agri_core::{AppResult, PipelineConfig, SourceSettings};
use agri_knowledge::{EmbeddingProvider, VectorStore, WILDCARD_REGION};
use agri_llm::LlmClient;
use agri_prompt::{PromptLibrary, ANSWER_SYNTHESIZE, CLARIFY_QUESTIONS, INTENT_CLASSIFY};
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::Instrument;

/// Answer for questions outside the agricultural domain.
pub const REFUSAL_MESSAGE: &str = "I can only help with agricultural questions, such as crops, \
soil, irrigation, pests, diseases, fertilizers, livestock and farm schemes. Please ask a \
farming-related question.";

/// Answer when generation fails.
pub const SERVICE_UNAVAILABLE_MESSAGE: &str = "The advisory service is temporarily unavailable. \
Please try again in a few minutes, or contact your local Krishi Vigyan Kendra for urgent help.";

/// Audit reasons
const REASON_REFUSED: &str = "refused";
const REASON_GOLDEN_DIRECT: &str = "golden_direct";
const REASON_POPS_DIRECT: &str = "pops_direct";
const REASON_SYNTHESIZED: &str = "synthesized";
const REASON_SYNTHESIZED_WITHOUT_CONTEXT: &str = "synthesized_without_context";
const REASON_SERVICE_UNAVAILABLE: &str = "service_unavailable";

/// One question as the later states see it.
struct Query<'a> {
    question: &'a str,
    regions: &'a [String],
    keywords: &'a BTreeSet<String>,
    follow_up: bool,
}

/// Verdicts from both sources.
struct Retrieved {
    golden: Evaluation,
    pops: Evaluation,
}

/// The agricultural advisory pipeline.
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    intent: IntentClassifier,
    golden: Retriever,
    pops: Retriever,
    clarifier: ClarificationGenerator,
    synthesizer: AnswerSynthesizer,
    audit: Arc<AuditLog>,
}

impl Pipeline {
    /// Assemble a pipeline. Fails only if a prompt is missing from `prompts`.
    pub fn new(
        config: Arc<PipelineConfig>,
        llm: Arc<dyn LlmClient>,
        model: impl Into<String>,
        embedder: Arc<dyn EmbeddingProvider>,
        golden_store: Arc<dyn VectorStore>,
        pops_store: Arc<dyn VectorStore>,
        prompts: &PromptLibrary,
    ) -> AppResult<Self> {
        let model = model.into();

        Ok(Self {
            intent: IntentClassifier::new(
                Arc::clone(&llm),
                model.clone(),
                prompts.get(INTENT_CLASSIFY)?.clone(),
            ),
            golden: Retriever::new(SourceLabel::Golden, golden_store, Arc::clone(&embedder)),
            pops: Retriever::new(SourceLabel::Pops, pops_store, embedder),
            clarifier: ClarificationGenerator::new(
                Arc::clone(&llm),
                model.clone(),
                prompts.get(CLARIFY_QUESTIONS)?.clone(),
            ),
            synthesizer: AnswerSynthesizer::new(llm, model, prompts.get(ANSWER_SYNTHESIZE)?.clone()),
            audit: Arc::new(AuditLog::disabled()),
            config,
        })
    }

    /// Record terminal answers to `audit`.
    pub fn with_audit(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = audit;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Answer one request. Conversation memory is rebuilt from the request's
    /// history.
    pub async fn run(&self, request: &PipelineRequest) -> PipelineResult {
        let memory = ConversationContext::from_history(&request.history, self.config.memory.clone());
        self.execute(request, &memory, None).await
    }

    /// Like [`run`](Self::run), forwarding sanitized answer text to `sink`
    /// as it is produced.
    pub async fn run_streaming(
        &self,
        request: &PipelineRequest,
        sink: UnboundedSender<String>,
    ) -> PipelineResult {
        let memory = ConversationContext::from_history(&request.history, self.config.memory.clone());
        self.execute(request, &memory, Some(&sink)).await
    }

    /// Answer a turn of a live session and record it in the session.
    ///
    /// The session supplies conversation memory; `request.history` is
    /// ignored. Refusals are not recorded.
    pub async fn run_in_session(
        &self,
        request: &PipelineRequest,
        session: &mut ConversationContext,
        sink: Option<&UnboundedSender<String>>,
    ) -> PipelineResult {
        let result = self.execute(request, session, sink).await;
        if result.source != SourceLabel::Refusal {
            session.add_exchange(request.question.trim(), &result.answer);
        }
        result
    }

    async fn execute(
        &self,
        request: &PipelineRequest,
        memory: &ConversationContext,
        sink: Option<&UnboundedSender<String>>,
    ) -> PipelineResult {
        let config: Cow<'_, PipelineConfig> = if request.overrides.is_empty() {
            Cow::Borrowed(self.config.as_ref())
        } else {
            Cow::Owned(self.config.with_overrides(&request.overrides))
        };

        let span = tracing::info_span!(
            "pipeline",
            question_len = request.question.len(),
            user_region = request.user_region.as_deref().unwrap_or("-"),
        );

        async {
            let (result, reason) = self.answer(request, &config, memory, sink).await;
            self.finish(request, &config, result, reason).await
        }
        .instrument(span)
        .await
    }

    async fn answer(
        &self,
        request: &PipelineRequest,
        config: &PipelineConfig,
        memory: &ConversationContext,
        sink: Option<&UnboundedSender<String>>,
    ) -> (PipelineResult, &'static str) {
        let question = request.question.trim();
        let mut trace = Vec::new();

        if question.is_empty() {
            trace.push("refused: empty question".to_string());
            return (refusal(trace, sink), REASON_REFUSED);
        }

        // INTENT_CHECK
        let follow_up = memory.is_follow_up(question);
        let intent = self
            .intent
            .classify(question, memory.last_question(), follow_up, config)
            .await;
        trace.push(format!(
            "intent: heuristic={}, classifier={}, follow_up={}",
            intent.heuristic,
            intent
                .llm
                .map_or("n/a", |label| if label { "yes" } else { "no" }),
            intent.follow_up
        ));

        if !intent.is_agricultural() {
            tracing::info!("Refusing out-of-domain question");
            trace.push("refused: outside the agricultural domain, no retrieval performed".to_string());
            let mut result = refusal(trace, sink);
            result.metadata.intent = Some(intent);
            return (result, REASON_REFUSED);
        }

        let regions = prioritize_regions(question, request.user_region.as_deref());
        let keywords = extract_keywords(question);
        trace.push(format!("regions: {}", regions.join(" > ")));
        let query = Query {
            question,
            regions: &regions,
            keywords: &keywords,
            follow_up,
        };

        // RETRIEVE_GOLDEN
        tracing::info!("Retrieving from Golden");
        let golden = self.consult(&self.golden, &config.golden, config, &query, &mut trace).await;

        // RETRIEVE_POPS, only when Golden did not answer
        let pops = if golden.accepted().is_some() {
            trace.push("PoPs: skipped, Golden answer accepted".to_string());
            skipped(SourceOutcome::Skipped)
        } else {
            tracing::info!("Retrieving from PoPs");
            self.consult(&self.pops, &config.pops, config, &query, &mut trace).await
        };

        let diagnostics = Diagnostics {
            golden: golden.diagnostics.clone(),
            pops: pops.diagnostics.clone(),
        };
        let retrieved_sources: Vec<SourceLabel> =
            [(SourceLabel::Golden, &golden), (SourceLabel::Pops, &pops)]
                .into_iter()
                .filter(|(_, eval)| eval.diagnostics.candidates > 0)
                .map(|(label, _)| label)
                .collect();

        let retrieved = Retrieved { golden, pops };
        let (mut result, reason) = self
            .respond(&query, config, memory, &retrieved, sink, &mut trace)
            .await;

        result.metadata.intent = Some(intent);
        result.metadata.retrieved_sources = retrieved_sources;
        if config.diagnostics_enabled {
            result.metadata.diagnostics = Some(diagnostics);
        }
        result.metadata.regions = regions;
        result.trace = trace;
        (result, reason)
    }

    /// Fast paths, then SYNTHESIZE.
    async fn respond(
        &self,
        query: &Query<'_>,
        config: &PipelineConfig,
        memory: &ConversationContext,
        retrieved: &Retrieved,
        sink: Option<&UnboundedSender<String>>,
        trace: &mut Vec<String>,
    ) -> (PipelineResult, &'static str) {
        let Retrieved { golden, pops } = retrieved;
        let question = query.question;

        // A curated answer needs no generation
        if let Some(hit) = golden.accepted() {
            tracing::info!("Answering directly from Golden");
            trace.push("answer: Golden record returned directly".to_string());
            return (direct(hit, sink), REASON_GOLDEN_DIRECT);
        }
        // PoPs is the only source consulted
        if !config.golden.enabled {
            if let Some(hit) = pops.accepted() {
                tracing::info!("Answering directly from PoPs");
                trace.push("answer: PoPs passage returned directly".to_string());
                return (direct(hit, sink), REASON_POPS_DIRECT);
            }
        }

        let passages = &pops.passing;
        let context_note = passages.is_empty();
        let conversation =
            (query.follow_up && !memory.is_empty()).then(|| memory.get_formatted_context());
        let region = query
            .regions
            .first()
            .map(String::as_str)
            .filter(|r| *r != WILDCARD_REGION);

        // An accepted curated record returned above, so only guidelines remain
        let input = SynthesisInput {
            question,
            golden: None,
            pops: passages,
            conversation: conversation.as_deref(),
            region,
        };

        let want_clarification = context_note && config.clarification_enabled;
        let clarify = async {
            if want_clarification {
                self.clarifier
                    .generate(
                        question,
                        region,
                        config.max_clarifications,
                        config.generation.clarification_max_tokens,
                    )
                    .await
            } else {
                Vec::new()
            }
        };
        let synthesize = async {
            match sink {
                Some(sink) => self.synthesizer.stream(&input, &config.generation, sink).await,
                None => self.synthesizer.complete(&input, &config.generation).await,
            }
        };

        tracing::info!(
            "Synthesizing from {} passage(s), clarification {}",
            passages.len(),
            if want_clarification { "requested" } else { "skipped" }
        );
        let (clarifying_questions, generated) = tokio::join!(clarify, synthesize);

        if want_clarification {
            trace.push(match clarifying_questions.len() {
                0 => "clarification: none suggested".to_string(),
                n => format!("clarification: suggested {} question(s)", n),
            });
        }

        let (mut result, reason) = match generated {
            Ok(answer) => {
                let best = passages.first();
                let source = if best.is_some() { SourceLabel::Pops } else { SourceLabel::Llm };
                trace.push(match best {
                    Some(_) => format!(
                        "answer: synthesized from {} PoPs passage(s)",
                        passages.len().min(config.generation.max_pops_passages)
                    ),
                    None => "answer: synthesized without reference material".to_string(),
                });

                let result = PipelineResult::new(answer, source);
                match best {
                    Some(hit) => (result.with_hit(hit), REASON_SYNTHESIZED),
                    None => (result, REASON_SYNTHESIZED_WITHOUT_CONTEXT),
                }
            }
            Err(e) => {
                tracing::warn!("Generation failed: {}", e);
                trace.push(format!("generation failed: {}", e));
                emit(sink, SERVICE_UNAVAILABLE_MESSAGE);

                let mut result = PipelineResult::new(SERVICE_UNAVAILABLE_MESSAGE, SourceLabel::Fallback);
                result.metadata.generation_error = Some(e.to_string());
                (result, REASON_SERVICE_UNAVAILABLE)
            }
        };

        result.metadata.context_note = context_note;
        result.metadata.conversation_attached = conversation.is_some();
        result.clarifying_questions = clarifying_questions;
        (result, reason)
    }

    /// Retrieve from one source and judge the hits.
    async fn consult(
        &self,
        retriever: &Retriever,
        settings: &SourceSettings,
        config: &PipelineConfig,
        query: &Query<'_>,
        trace: &mut Vec<String>,
    ) -> Evaluation {
        let label = retriever.label();
        if !settings.enabled {
            trace.push(format!("{}: disabled", label));
            return skipped(SourceOutcome::Disabled);
        }

        let search = retriever.search(query.question, query.regions, settings.k).await;
        if let Some(error) = &search.error {
            trace.push(format!("{}: retrieval failed ({})", label, error));
        }

        let multiplier = config.effective_multiplier(settings);
        let eval = evaluate(&search, settings, multiplier, query.keywords);
        trace.push(describe(label, &eval, settings, multiplier));
        eval
    }

    async fn finish(
        &self,
        request: &PipelineRequest,
        config: &PipelineConfig,
        mut result: PipelineResult,
        reason: &str,
    ) -> PipelineResult {
        tracing::info!("Answered with source {}", result.source);

        if config.audit_enabled {
            if let Err(e) = self
                .audit
                .append_async(request.question.trim(), &result.answer, reason)
                .await
            {
                result.trace.push(format!("audit: {}", e));
            }
        }
        result
    }
}

fn skipped(outcome: SourceOutcome) -> Evaluation {
    Evaluation {
        outcome,
        diagnostics: SourceDiagnostics {
            outcome,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn refusal(trace: Vec<String>, sink: Option<&UnboundedSender<String>>) -> PipelineResult {
    emit(sink, REFUSAL_MESSAGE);
    let mut result = PipelineResult::new(REFUSAL_MESSAGE, SourceLabel::Refusal);
    result.trace = trace;
    result
}

fn direct(hit: &RetrieverHit, sink: Option<&UnboundedSender<String>>) -> PipelineResult {
    let answer = direct_answer(hit);
    emit(sink, &answer);
    PipelineResult::new(answer, hit.source).with_hit(hit)
}

fn emit(sink: Option<&UnboundedSender<String>>, text: &str) {
    if let Some(sink) = sink {
        if sink.send(text.to_string()).is_err() {
            tracing::debug!("Stream receiver dropped");
        }
    }
}

/// One trace line for a source's verdict.
fn describe(label: SourceLabel, eval: &Evaluation, settings: &SourceSettings, multiplier: f32) -> String {
    let region = eval.diagnostics.region_used.as_deref().unwrap_or("-");
    match eval.outcome {
        SourceOutcome::Accepted => {
            let mut line = eval
                .accepted()
                .map(|hit| {
                    format!(
                        "{}: accepted hit from region '{}' (cosine {:.2}, distance {:.2})",
                        label, region, hit.cosine, hit.distance
                    )
                })
                .unwrap_or_else(|| format!("{}: accepted", label));
            if !eval.filtered.is_empty() {
                line.push_str(&format!(
                    "; {} other candidate(s) filtered due to low keyword overlap",
                    eval.filtered.len()
                ));
            }
            line
        }
        SourceOutcome::FilteredByKeywords => format!(
            "{}: {} candidate(s) from region '{}' filtered due to low keyword overlap",
            label,
            eval.filtered.len(),
            region
        ),
        SourceOutcome::BelowThreshold => {
            let max_distance = settings
                .thresholds
                .max_distance
                .map(|d| format!(", max distance {:.2}", d * multiplier))
                .unwrap_or_default();
            format!(
                "{}: rejected, below threshold (best cosine {:.2}, distance {:.2}; min cosine {:.2}{})",
                label,
                eval.diagnostics.best_cosine.unwrap_or_default(),
                eval.diagnostics.best_distance.unwrap_or_default(),
                settings.thresholds.min_cosine,
                max_distance
            )
        }
        SourceOutcome::NoResults => format!(
            "{}: no results in regions [{}]",
            label,
            eval.diagnostics.regions_tried.join(", ")
        ),
        SourceOutcome::Disabled => format!("{}: disabled", label),
        SourceOutcome::Skipped | SourceOutcome::NotConsulted => format!("{}: not consulted", label),
    }
}
