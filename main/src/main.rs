use std::{path::PathBuf, sync::Arc, time::Duration};

use answer_engine::{AnswerEngine, AnswerRequest, EngineSettings, OpenAiGenerator};
use clap::Parser;
use common::{
    types::profile::ProfileStore,
    utils::config::{get_config, AppConfig, EmbeddingBackendKind},
};
use quota_pool::{Clock, NoopRecorder, QuotaPool, SystemClock, UsageRecorder};
use retrieval_pipeline::{
    embedding::{Embedder, HashedEmbedder, OpenAiEmbedder},
    store::InMemoryChunkStore,
    SearchFilter, SearchMethod,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Ask a question against a pre-chunked document corpus.
#[derive(Debug, Parser)]
#[command(name = "ask", version)]
struct Args {
    /// The question to answer.
    #[arg(long)]
    query: Option<String>,

    /// Path to the corpus file (a JSON array of chunks).
    #[arg(long, default_value = "corpus.json")]
    corpus: PathBuf,

    /// Profile to answer with; the configured default when omitted.
    #[arg(long)]
    profile: Option<String>,

    #[arg(long, value_enum, default_value_t = SearchMethod::Hybrid)]
    method: SearchMethod,

    /// Restrict contextual search to one document.
    #[arg(long)]
    document: Option<String>,

    /// Restrict contextual search to sections under this prefix.
    #[arg(long)]
    section: Option<String>,

    /// Override the configured embedding backend.
    #[arg(long, value_enum)]
    embedding_backend: Option<BackendArg>,

    /// Print the configured profiles and exit.
    #[arg(long)]
    list_profiles: bool,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum BackendArg {
    Openai,
    Hashed,
}

impl From<BackendArg> for EmbeddingBackendKind {
    fn from(value: BackendArg) -> Self {
        match value {
            BackendArg::Openai => Self::Openai,
            BackendArg::Hashed => Self::Hashed,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let args = Args::parse();
    let config = get_config()?;

    let profiles = Arc::new(ProfileStore::new(config.profiles.clone())?);

    if args.list_profiles {
        println!("{}", serde_json::to_string_pretty(&profiles.list())?);
        return Ok(());
    }

    let query = args
        .query
        .ok_or("a --query is required unless --list-profiles is given")?;

    let store = Arc::new(InMemoryChunkStore::from_json_file(&args.corpus)?);
    info!(chunks = store.len(), corpus = %args.corpus.display(), "corpus loaded");

    let backend = args
        .embedding_backend
        .map_or(config.embedding_backend, Into::into);
    let embedder = build_embedder(&config, backend);
    let generator = Arc::new(OpenAiGenerator::new(
        config.openai_base_url.clone(),
        config.generation_max_tokens,
        Duration::from_secs(config.generation_timeout_secs),
    ));
    let quota = QuotaPool::new(
        config.credentials.clone(),
        Arc::new(SystemClock) as Arc<dyn Clock>,
        Arc::new(NoopRecorder) as Arc<dyn UsageRecorder>,
    )?;

    let engine = AnswerEngine::new(
        store,
        embedder,
        generator,
        quota,
        profiles,
        EngineSettings {
            max_query_chars: config.max_query_chars,
            default_profile: config.default_profile.clone(),
            quota_retry_attempts: config.quota_retry_attempts,
            quota_retry_backoff: Duration::from_millis(config.quota_retry_backoff_ms),
        },
    );

    let filter = (args.document.is_some() || args.section.is_some()).then(|| SearchFilter {
        document_id: args.document,
        section_prefix: args.section,
    });

    let result = engine
        .ask(AnswerRequest {
            query,
            profile: args.profile,
            method: args.method,
            filter,
        })
        .await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn build_embedder(config: &AppConfig, backend: EmbeddingBackendKind) -> Arc<dyn Embedder> {
    match backend {
        EmbeddingBackendKind::Hashed => Arc::new(HashedEmbedder::new(config.hashed_dimension)),
        EmbeddingBackendKind::Openai => {
            // Embedding calls are cheap and uncounted; the first configured
            // credential carries them.
            let mut openai_config =
                async_openai::config::OpenAIConfig::new().with_api_base(&config.openai_base_url);
            if let Some(record) = config.credentials.first() {
                openai_config = openai_config.with_api_key(&record.credential);
            }
            let client = Arc::new(async_openai::Client::with_config(openai_config));
            Arc::new(OpenAiEmbedder::new(
                client,
                config.embedding_model.clone(),
                config.embedding_dimensions,
            ))
        }
    }
}
