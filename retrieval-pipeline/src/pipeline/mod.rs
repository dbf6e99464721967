mod config;

pub use config::SearchMethod;

use common::{
    error::AppError,
    types::{candidate::SearchCandidate, profile::Profile},
};
use tracing::{info, instrument};

use crate::{
    embedding::Embedder,
    scoring::fuse_candidates,
    store::{merge_candidates, ChunkStore, SearchFilter},
};

/// How many candidates to pull from each store primitive relative to the
/// profile's final cap. Oversampling lets fusion see keyword-only hits that
/// a tight vector cut would have hidden.
const CANDIDATE_OVERSAMPLE: usize = 4;
const MIN_CANDIDATE_TAKE: usize = 20;

/// Runs the configured search method and returns the fused ranking.
///
/// The store is queried with a zero threshold; the profile's similarity
/// threshold is enforced by fusion, which owns the keyword-override policy.
#[instrument(skip_all, fields(method = %method, profile = %profile.name))]
pub async fn run_search(
    store: &dyn ChunkStore,
    embedder: &dyn Embedder,
    query: &str,
    profile: &Profile,
    method: SearchMethod,
    filter: Option<&SearchFilter>,
) -> Result<Vec<SearchCandidate>, AppError> {
    let query_chars = query.chars().count();
    let preview: String = query.chars().take(120).collect();
    let preview = preview.replace('\n', " ");
    info!(
        query_chars,
        preview_truncated = query_chars > preview.chars().count(),
        preview = %preview,
        "Starting search"
    );

    let effective = effective_profile(profile, method);
    let take = (effective.max_chunks * CANDIDATE_OVERSAMPLE).max(MIN_CANDIDATE_TAKE);

    let query_embedding = embedder.embed(query).await?;

    let candidates = match method {
        SearchMethod::Semantic => store.semantic_search(&query_embedding, 0.0, take).await?,
        SearchMethod::Hybrid | SearchMethod::Contextual => {
            let (semantic, keyword) = tokio::join!(
                store.semantic_search(&query_embedding, 0.0, take),
                store.keyword_search(query, take)
            );
            merge_candidates(semantic?, keyword?)
        }
    };

    let candidates: Vec<SearchCandidate> = match (method, filter) {
        (SearchMethod::Contextual, Some(filter)) => candidates
            .into_iter()
            .filter(|candidate| filter.matches(&candidate.chunk))
            .collect(),
        (SearchMethod::Contextual, None) => {
            return Err(AppError::Validation(
                "contextual search requires a filter".into(),
            ))
        }
        _ => candidates,
    };

    let ranked = fuse_candidates(candidates, &effective)?;
    info!(ranked = ranked.len(), "Search complete");
    Ok(ranked)
}

/// Semantic search is fusion with the keyword signal switched off; the other
/// methods use the profile weights as configured.
fn effective_profile(profile: &Profile, method: SearchMethod) -> Profile {
    match method {
        SearchMethod::Semantic => Profile {
            semantic_weight: 1.0,
            keyword_weight: 0.0,
            ..profile.clone()
        },
        SearchMethod::Hybrid | SearchMethod::Contextual => profile.clone(),
    }
}
