//! End-to-end pipeline scenarios over in-crate fakes.


use crate::orchestrator::Pipeline;
use agri_core::{AppError, AppResult, PipelineConfig};
use agri_knowledge::{Document, DocumentMetadata, EmbeddingProvider, RegionTag, VectorStore};
use agri_llm::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmUsage, StreamEvent};
use agri_prompt::PromptLibrary;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Which prompt a completion request was rendered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallKind {
    Intent,
    Clarify,
    Answer,
}

fn route(request: &LlmRequest) -> CallKind {
    if request.prompt.contains("Reply with yes or no") {
        CallKind::Intent
    } else if request.prompt.contains("did not answer this confidently") {
        CallKind::Clarify
    } else {
        CallKind::Answer
    }
}

/// Completion client with canned replies per prompt kind.
#[derive(Debug)]
pub(crate) struct ScriptedLlm {
    intent: Result<String, String>,
    clarify: String,
    answer: Result<String, String>,
    calls: Mutex<Vec<(CallKind, LlmRequest)>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self {
            intent: Ok("no".to_string()),
            clarify: "none".to_string(),
            answer: Ok("Generated answer.".to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn intent(mut self, reply: &str) -> Self {
        self.intent = Ok(reply.to_string());
        self
    }

    pub fn failing_intent(mut self, error: &str) -> Self {
        self.intent = Err(error.to_string());
        self
    }

    pub fn clarify(mut self, reply: &str) -> Self {
        self.clarify = reply.to_string();
        self
    }

    pub fn answer(mut self, reply: &str) -> Self {
        self.answer = Ok(reply.to_string());
        self
    }

    pub fn failing_answer(mut self, error: &str) -> Self {
        self.answer = Err(error.to_string());
        self
    }

    pub fn count(&self, kind: CallKind) -> usize {
        self.calls.lock().unwrap().iter().filter(|(k, _)| *k == kind).count()
    }

    pub fn prompts(&self, kind: CallKind) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, request)| request.prompt.clone())
            .collect()
    }

    pub fn requests(&self, kind: CallKind) -> Vec<LlmRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, request)| request.clone())
            .collect()
    }

    fn record(&self, request: &LlmRequest) -> CallKind {
        let kind = route(request);
        self.calls.lock().unwrap().push((kind, request.clone()));
        kind
    }

    fn reply(&self, kind: CallKind) -> AppResult<String> {
        match kind {
            CallKind::Intent => self.intent.clone().map_err(AppError::Llm),
            CallKind::Clarify => Ok(self.clarify.clone()),
            CallKind::Answer => self.answer.clone().map_err(AppError::Llm),
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedLlm {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        let kind = self.record(request);
        Ok(LlmResponse {
            content: self.reply(kind)?,
            model: request.model.clone(),
            usage: LlmUsage::default(),
        })
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        let kind = self.record(request);
        let text = self.reply(kind)?;

        // Small uneven tokens, then a doubled terminal event
        let mut events: Vec<StreamEvent> = text
            .split_inclusive(' ')
            .map(|token| StreamEvent::Token(token.to_string()))
            .collect();
        events.push(StreamEvent::Done(None));
        events.push(StreamEvent::Done(Some(LlmUsage::new(10, 5))));
        Ok(Box::pin(futures::stream::iter(events)))
    }
}

/// In-memory collection that counts searches.
#[derive(Debug)]
pub(crate) struct CountingStore {
    name: String,
    docs: Vec<(Document, f32)>,
    fail: bool,
    calls: AtomicUsize,
}

impl CountingStore {
    pub fn new(name: &str, docs: Vec<(Document, f32)>) -> Self {
        Self {
            name: name.to_string(),
            docs,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            fail: true,
            ..Self::new(name, Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl VectorStore for CountingStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn similarity_search_with_score(
        &self,
        _query_embedding: &[f32],
        k: usize,
        region_filter: Option<&str>,
    ) -> AppResult<Vec<(Document, f32)>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AppError::Retrieval("index unreachable".to_string()));
        }

        let key = region_filter.map(|region| RegionTag::parse(region).key());
        let mut hits: Vec<(Document, f32)> = self
            .docs
            .iter()
            .filter(|(doc, _)| key.as_ref().is_none_or(|key| doc.metadata.region.key() == *key))
            .cloned()
            .collect();
        hits.sort_by(|a, b| a.1.total_cmp(&b.1));
        hits.truncate(k);
        Ok(hits)
    }
}

/// Embeds every query as the unit x-axis, so a stored document embedding
/// `[c, sqrt(1 - c²)]` has cosine exactly `c`.
#[derive(Debug)]
pub(crate) struct AxisEmbedder;

#[async_trait::async_trait]
impl EmbeddingProvider for AxisEmbedder {
    fn provider_name(&self) -> &str {
        "axis"
    }

    fn model_name(&self) -> &str {
        "axis-v1"
    }

    fn dimensions(&self) -> usize {
        2
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
    }
}

/// A stored passage with the given cosine to any query, and index distance.
pub(crate) fn doc(content: &str, region: &str, topic: Option<&str>, cosine: f32, distance: f32) -> (Document, f32) {
    let metadata = DocumentMetadata::new(RegionTag::parse(region), topic.map(str::to_string));
    let embedding = vec![cosine, (1.0 - cosine * cosine).max(0.0).sqrt()];
    (Document::new(content, metadata).with_embedding(embedding), distance)
}

pub(crate) struct Harness {
    pub pipeline: Pipeline,
    pub llm: Arc<ScriptedLlm>,
    pub golden: Arc<CountingStore>,
    pub pops: Arc<CountingStore>,
}

pub(crate) fn harness_with(
    config: PipelineConfig,
    llm: ScriptedLlm,
    golden: CountingStore,
    pops: CountingStore,
) -> Harness {
    let llm = Arc::new(llm);
    let golden = Arc::new(golden);
    let pops = Arc::new(pops);

    let pipeline = Pipeline::new(
        Arc::new(config),
        llm.clone(),
        "test-model",
        Arc::new(AxisEmbedder),
        golden.clone(),
        pops.clone(),
        &PromptLibrary::builtin().unwrap(),
    )
    .unwrap();

    Harness {
        pipeline,
        llm,
        golden,
        pops,
    }
}

pub(crate) fn harness(
    llm: ScriptedLlm,
    golden: Vec<(Document, f32)>,
    pops: Vec<(Document, f32)>,
) -> Harness {
    harness_with(
        PipelineConfig::default(),
        llm,
        CountingStore::new("golden", golden),
        CountingStore::new("pops", pops),
    )
}

pub(crate) fn punjab_wheat_golden() -> (Document, f32) {
    doc(
        "Question: What is the seed rate for wheat?\nAnswer: Use 40 kg seed per acre for timely sown wheat.",
        "Punjab",
        Some("wheat"),
        0.82,
        0.2,
    )
}

pub(crate) fn general_wheat_pops() -> (Document, f32) {
    doc(
        "Sow wheat seed at 100 kg per hectare in rows 20 cm apart during the first fortnight of November.",
        "All India",
        Some("wheat"),
        0.7,
        0.6,
    )
}
