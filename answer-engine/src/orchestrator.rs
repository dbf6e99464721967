use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use common::{
    error::AppError,
    types::{
        answer::{AnswerResult, SourceAttribution},
        candidate::SearchCandidate,
        profile::ProfileStore,
    },
};
use quota_pool::{CredentialLease, QuotaPool};
use retrieval_pipeline::{
    context::assemble,
    embedding::Embedder,
    pipeline::run_search,
    selection::{select_best_for_display, select_for_context, SelectedChunk},
    ChunkStore, SearchFilter, SearchMethod,
};
use tokio_retry::{strategy::FixedInterval, Retry};
use tracing::{debug, info, instrument, warn};

use crate::{
    generation::{estimate_tokens, Generator},
    prompt::chunks_to_context_json,
};

/// How many characters of a source chunk to surface in attributions.
const SOURCE_PREVIEW_CHARS: usize = 160;

/// One question against the corpus.
#[derive(Debug, Clone)]
pub struct AnswerRequest {
    pub query: String,
    /// Profile name; the engine's default profile when absent.
    pub profile: Option<String>,
    pub method: SearchMethod,
    pub filter: Option<SearchFilter>,
}

impl AnswerRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            profile: None,
            method: SearchMethod::default(),
            filter: None,
        }
    }
}

/// Engine-level knobs that are not per-profile tunables.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub max_query_chars: usize,
    pub default_profile: String,
    /// Extra acquire attempts after the first when the pool is exhausted.
    pub quota_retry_attempts: usize,
    pub quota_retry_backoff: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_query_chars: 2000,
            default_profile: "default".to_string(),
            quota_retry_attempts: 2,
            quota_retry_backoff: Duration::from_millis(250),
        }
    }
}

/// Ties retrieval, quota management and generation into the single `ask`
/// entry point.
pub struct AnswerEngine {
    store: Arc<dyn ChunkStore>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    quota: Arc<QuotaPool>,
    profiles: Arc<ProfileStore>,
    settings: EngineSettings,
}

impl AnswerEngine {
    pub fn new(
        store: Arc<dyn ChunkStore>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        quota: Arc<QuotaPool>,
        profiles: Arc<ProfileStore>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            embedder,
            generator,
            quota,
            profiles,
            settings,
        }
    }

    pub fn profiles(&self) -> &ProfileStore {
        &self.profiles
    }

    /// Answers one question end to end.
    ///
    /// Finding nothing relevant is a successful outcome with a fixed answer
    /// text and no sources. Failures are upstream outages, exhausted quota
    /// that outlasted the retry budget, or invalid input.
    #[instrument(skip_all, fields(method = %request.method))]
    pub async fn ask(&self, request: AnswerRequest) -> Result<AnswerResult, AppError> {
        let started = Instant::now();

        let query = request.query.trim();
        if query.is_empty() {
            return Err(AppError::Validation("query must not be empty".into()));
        }
        let query_chars = query.chars().count();
        if query_chars > self.settings.max_query_chars {
            return Err(AppError::Validation(format!(
                "query of {query_chars} chars exceeds the {} char limit",
                self.settings.max_query_chars
            )));
        }

        let profile_name = request
            .profile
            .as_deref()
            .unwrap_or(&self.settings.default_profile);
        let profile = self.profiles.get(profile_name)?;

        let search_started = Instant::now();
        let ranked = run_search(
            self.store.as_ref(),
            self.embedder.as_ref(),
            query,
            &profile,
            request.method,
            request.filter.as_ref(),
        )
        .await?;
        let search_ms = search_started.elapsed().as_millis() as u64;

        if ranked.is_empty() {
            info!(search_ms, profile = %profile.name, "no relevant context found");
            return Ok(AnswerResult::no_relevant_context(
                request.method.to_string(),
                profile.name,
                started.elapsed().as_millis() as u64,
            ));
        }

        let context_started = Instant::now();
        let selected = select_for_context(&ranked, profile.max_context_chars)?;
        let context = assemble(&selected, profile.max_context_chars)?;
        let context_ms = context_started.elapsed().as_millis() as u64;
        debug!(
            context_chars = context.chars().count(),
            chunks = %chunks_to_context_json(&selected),
            "context assembled"
        );

        let lease = self.acquire_with_retry().await?;

        let generation_started = Instant::now();
        let generation = self
            .generator
            .generate(&context, query, &profile, lease.credential())
            .await;
        let generation_ms = generation_started.elapsed().as_millis() as u64;

        let output = match generation {
            Ok(output) => {
                lease.record(output.tokens_used, true).await?;
                output
            }
            Err(error) => {
                // The upstream request was dispatched, so the slot is spent
                // even though it failed; account an estimate for the tokens.
                let estimated = estimate_tokens(&context, query, "");
                if let Err(record_error) = lease.record(estimated, false).await {
                    warn!(%record_error, "failed to record usage for failed call");
                }
                return Err(error);
            }
        };

        let sources = build_sources(&selected);
        let best_source = select_best_for_display(&ranked, query).map(attribution);
        let sources = merge_best_source(sources, best_source.as_ref());

        let response_time_ms = started.elapsed().as_millis() as u64;
        info!(
            search_ms,
            context_ms,
            generation_ms,
            response_time_ms,
            chunks_used = selected.len(),
            tokens_used = output.tokens_used,
            profile = %profile.name,
            "answer complete"
        );

        Ok(AnswerResult {
            answer_text: output.text,
            sources,
            best_source,
            search_method: request.method.to_string(),
            response_time_ms,
            profile_used: profile.name,
        })
    }

    /// Acquires a credential, retrying a bounded number of times while the
    /// pool is exhausted. A pool still exhausted after the retry budget
    /// surfaces as `ServiceUnavailable`.
    async fn acquire_with_retry(&self) -> Result<CredentialLease, AppError> {
        let strategy = FixedInterval::new(self.settings.quota_retry_backoff)
            .take(self.settings.quota_retry_attempts);

        let result = Retry::start(strategy, || {
            let quota = Arc::clone(&self.quota);
            async move { quota.acquire() }
        })
        .await;

        result.map_err(|error| match error {
            AppError::QuotaExhausted { retry_in_ms } => AppError::ServiceUnavailable(format!(
                "all credentials exhausted, retry in {retry_in_ms}ms"
            )),
            other => other,
        })
    }
}

fn attribution(candidate: &SearchCandidate) -> SourceAttribution {
    SourceAttribution {
        chunk_id: candidate.chunk.id.clone(),
        section_label: candidate.chunk.section_label.clone(),
        similarity: candidate.semantic_score,
        preview_text: candidate.chunk.preview(SOURCE_PREVIEW_CHARS),
    }
}

fn build_sources(selected: &[SelectedChunk]) -> Vec<SourceAttribution> {
    selected
        .iter()
        .map(|chunk| attribution(&chunk.candidate))
        .collect()
}

/// The display pick may sit below the context cut; the attribution list must
/// still contain it.
fn merge_best_source(
    mut sources: Vec<SourceAttribution>,
    best: Option<&SourceAttribution>,
) -> Vec<SourceAttribution> {
    if let Some(best) = best {
        if !sources.iter().any(|source| source.chunk_id == best.chunk_id) {
            sources.push(best.clone());
        }
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::GenerationOutput;
    use async_trait::async_trait;
    use common::types::{api_key::ApiKeyRecord, chunk::Chunk, profile::Profile};
    use quota_pool::{Clock, InMemoryRecorder, ManualClock, SystemClock, UsageRecorder};
    use std::sync::Mutex;

    struct ScriptedStore {
        candidates: Vec<SearchCandidate>,
    }

    #[async_trait]
    impl ChunkStore for ScriptedStore {
        async fn semantic_search(
            &self,
            _embedding: &[f32],
            _threshold: f32,
            limit: usize,
        ) -> Result<Vec<SearchCandidate>, AppError> {
            Ok(self.candidates.iter().take(limit).cloned().collect())
        }

        async fn keyword_search(
            &self,
            _query: &str,
            _limit: usize,
        ) -> Result<Vec<SearchCandidate>, AppError> {
            Ok(Vec::new())
        }
    }

    struct FixedEmbedder;

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, AppError> {
            Ok(vec![1.0, 0.0])
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    struct ScriptedGenerator {
        responses: Mutex<Vec<Result<GenerationOutput, AppError>>>,
    }

    impl ScriptedGenerator {
        fn ok(text: &str) -> Self {
            Self {
                responses: Mutex::new(vec![Ok(GenerationOutput {
                    text: text.to_string(),
                    tokens_used: 42,
                })]),
            }
        }

        fn failing() -> Self {
            Self {
                responses: Mutex::new(vec![Err(AppError::ExternalService(
                    "upstream 500".into(),
                ))]),
            }
        }
    }

    #[async_trait]
    impl Generator for ScriptedGenerator {
        async fn generate(
            &self,
            _context: &str,
            _query: &str,
            _profile: &Profile,
            _credential: &str,
        ) -> Result<GenerationOutput, AppError> {
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(AppError::ExternalService("script exhausted".into())))
        }
    }

    fn candidate(id: &str, text: &str, semantic: f32, position: u32) -> SearchCandidate {
        let mut candidate = SearchCandidate::new(Chunk {
            id: id.to_string(),
            document_id: "doc".to_string(),
            text: text.to_string(),
            embedding: vec![],
            section_label: Some("1.2".to_string()),
            position_index: position,
        });
        candidate.semantic_score = semantic;
        candidate
    }

    fn key_record() -> ApiKeyRecord {
        ApiKeyRecord {
            id: 1,
            credential: "sk-test-1".to_string(),
            daily_limit_tokens: 1_000_000,
            daily_limit_requests: 10_000,
            minute_limit_requests: 15,
        }
    }

    fn engine_with(
        candidates: Vec<SearchCandidate>,
        generator: ScriptedGenerator,
    ) -> (AnswerEngine, Arc<InMemoryRecorder>) {
        let recorder = Arc::new(InMemoryRecorder::default());
        let quota = QuotaPool::new(
            vec![key_record()],
            Arc::new(SystemClock) as Arc<dyn Clock>,
            Arc::clone(&recorder) as Arc<dyn UsageRecorder>,
        )
        .expect("pool");
        let engine = AnswerEngine::new(
            Arc::new(ScriptedStore { candidates }),
            Arc::new(FixedEmbedder),
            Arc::new(generator),
            quota,
            Arc::new(ProfileStore::new(vec![]).expect("profiles")),
            EngineSettings::default(),
        );
        (engine, recorder)
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let (engine, _) = engine_with(vec![], ScriptedGenerator::ok("unused"));
        let result = engine.ask(AnswerRequest::new("   ")).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn oversized_query_is_rejected() {
        let (engine, _) = engine_with(vec![], ScriptedGenerator::ok("unused"));
        let result = engine.ask(AnswerRequest::new("ש".repeat(2001))).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn unknown_profile_is_not_found() {
        let (engine, _) = engine_with(vec![], ScriptedGenerator::ok("unused"));
        let mut request = AnswerRequest::new("מה אומר סעיף 4?");
        request.profile = Some("nonexistent".to_string());
        assert!(matches!(
            engine.ask(request).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn no_candidates_yields_the_fixed_no_context_answer() {
        let (engine, recorder) = engine_with(vec![], ScriptedGenerator::ok("unused"));
        let result = engine
            .ask(AnswerRequest::new("מה אומר סעיף 4?"))
            .await
            .expect("ask");

        assert!(result.is_no_relevant_context());
        assert_eq!(result.search_method, "hybrid");
        assert_eq!(result.profile_used, "default");
        assert!(result.sources.is_empty());
        // No generation call, so no quota usage either.
        assert!(recorder.events().is_empty());
    }

    #[tokio::test]
    async fn happy_path_returns_answer_with_sources_and_records_usage() {
        let candidates = vec![
            candidate("c1", "סעיף 4 קובע חובת דיווח שנתית.", 0.9, 0),
            candidate("c2", "הוראות כלליות בדבר אחריות.", 0.7, 1),
        ];
        let (engine, recorder) =
            engine_with(candidates, ScriptedGenerator::ok("חובת דיווח שנתית."));

        let result = engine
            .ask(AnswerRequest::new("מה אומר סעיף 4?"))
            .await
            .expect("ask");

        assert_eq!(result.answer_text, "חובת דיווח שנתית.");
        assert_eq!(result.sources.len(), 2);
        assert_eq!(result.sources[0].chunk_id, "c1");
        let best = result.best_source.expect("best source");
        assert_eq!(best.chunk_id, "c1");
        assert!(result
            .sources
            .iter()
            .any(|source| source.chunk_id == best.chunk_id));
        assert_eq!(result.search_method, "hybrid");

        let events = recorder.events();
        assert_eq!(events.len(), 1);
        assert!(events[0].success);
        assert_eq!(events[0].tokens_used, 42);
    }

    #[tokio::test]
    async fn generation_failure_records_usage_and_surfaces_the_error() {
        let candidates = vec![candidate("c1", "סעיף 4 קובע חובת דיווח.", 0.9, 0)];
        let (engine, recorder) = engine_with(candidates, ScriptedGenerator::failing());

        let result = engine.ask(AnswerRequest::new("מה אומר סעיף 4?")).await;
        assert!(matches!(result, Err(AppError::ExternalService(_))));

        // A dispatched-but-failed call still consumed the reservation.
        let events = recorder.events();
        assert_eq!(events.len(), 1);
        assert!(!events[0].success);
        assert!(events[0].tokens_used > 0);
    }

    #[tokio::test]
    async fn exhausted_quota_becomes_service_unavailable_after_retries() {
        let recorder = Arc::new(InMemoryRecorder::default());
        use chrono::TimeZone;
        let clock = Arc::new(ManualClock::new(
            chrono::Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        ));
        let quota = QuotaPool::new(
            vec![key_record()],
            clock as Arc<dyn Clock>,
            Arc::clone(&recorder) as Arc<dyn UsageRecorder>,
        )
        .expect("pool");

        // Burn the usable minute-window capacity up front.
        let mut leases = Vec::new();
        loop {
            match quota.acquire() {
                Ok(lease) => leases.push(lease),
                Err(_) => break,
            }
        }
        for lease in leases {
            lease.record(1, true).await.expect("record");
        }

        let settings = EngineSettings {
            quota_retry_attempts: 1,
            quota_retry_backoff: Duration::from_millis(1),
            ..EngineSettings::default()
        };
        let engine = AnswerEngine::new(
            Arc::new(ScriptedStore {
                candidates: vec![candidate("c1", "סעיף 4 קובע חובת דיווח.", 0.9, 0)],
            }),
            Arc::new(FixedEmbedder),
            Arc::new(ScriptedGenerator::ok("unreachable")),
            quota,
            Arc::new(ProfileStore::new(vec![]).expect("profiles")),
            settings,
        );

        let result = engine.ask(AnswerRequest::new("מה אומר סעיף 4?")).await;
        assert!(matches!(result, Err(AppError::ServiceUnavailable(_))));
    }
}
