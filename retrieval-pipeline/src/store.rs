use std::{collections::HashMap, path::Path};

use async_trait::async_trait;
use common::{
    error::AppError,
    types::{candidate::SearchCandidate, chunk::Chunk},
};
use tracing::debug;

use crate::{scoring::clamp_unit, selection::query_tokens};

/// Retrieval primitives the engine consumes. The real corpus lives behind
/// this seam (a database, a vector index); the engine never assumes more
/// than these two lookups.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Vector-similarity candidates, `semantic_score` populated in `[0, 1]`.
    async fn semantic_search(
        &self,
        query_embedding: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<SearchCandidate>, AppError>;

    /// Keyword-match candidates, `keyword_score` populated in `[0, 1]`.
    async fn keyword_search(
        &self,
        query_text: &str,
        limit: usize,
    ) -> Result<Vec<SearchCandidate>, AppError>;
}

/// Caller-supplied predicate for the contextual search method, applied to
/// candidates before ranking.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub document_id: Option<String>,
    pub section_prefix: Option<String>,
}

impl SearchFilter {
    pub fn matches(&self, chunk: &Chunk) -> bool {
        if let Some(document_id) = &self.document_id {
            if &chunk.document_id != document_id {
                return false;
            }
        }
        if let Some(prefix) = &self.section_prefix {
            match &chunk.section_label {
                Some(label) => {
                    if !label.starts_with(prefix.as_str()) {
                        return false;
                    }
                }
                None => return false,
            }
        }
        true
    }
}

/// Joins semantic and keyword result sets by chunk id so each chunk carries
/// both signals into fusion. When both sides return the same chunk, the
/// higher value per signal wins.
pub fn merge_candidates(
    semantic: Vec<SearchCandidate>,
    keyword: Vec<SearchCandidate>,
) -> Vec<SearchCandidate> {
    let mut merged: HashMap<String, SearchCandidate> = HashMap::new();

    for candidate in semantic {
        merged.insert(candidate.chunk.id.clone(), candidate);
    }
    for candidate in keyword {
        merged
            .entry(candidate.chunk.id.clone())
            .and_modify(|existing| {
                existing.keyword_score = existing.keyword_score.max(candidate.keyword_score);
                existing.semantic_score = existing.semantic_score.max(candidate.semantic_score);
            })
            .or_insert(candidate);
    }

    merged.into_values().collect()
}

/// Corpus adapter holding every chunk in memory. Used by the CLI binary and
/// the test suites; production deployments put a real index behind
/// [`ChunkStore`] instead.
pub struct InMemoryChunkStore {
    chunks: Vec<Chunk>,
}

impl InMemoryChunkStore {
    pub fn new(chunks: Vec<Chunk>) -> Self {
        Self { chunks }
    }

    /// Loads a corpus from a JSON array of chunk objects.
    pub fn from_json_file(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)?;
        let chunks: Vec<Chunk> = serde_json::from_str(&raw)?;
        debug!(count = chunks.len(), path = %path.display(), "loaded corpus");
        Ok(Self::new(chunks))
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Share of distinctive query tokens found verbatim in the text.
fn keyword_match_ratio(query: &str, text: &str) -> f32 {
    let tokens = query_tokens(query);
    if tokens.is_empty() {
        return 0.0;
    }
    let haystack = text.to_lowercase();
    let hits = tokens
        .iter()
        .filter(|token| haystack.contains(token.as_str()))
        .count();
    hits as f32 / tokens.len() as f32
}

#[async_trait]
impl ChunkStore for InMemoryChunkStore {
    async fn semantic_search(
        &self,
        query_embedding: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<SearchCandidate>, AppError> {
        let mut candidates: Vec<SearchCandidate> = self
            .chunks
            .iter()
            .map(|chunk| {
                // Cosine output is normalized at this boundary so the core
                // never sees an out-of-range score.
                let score = clamp_unit(cosine_similarity(query_embedding, &chunk.embedding));
                SearchCandidate::new(chunk.clone()).with_semantic_score(score)
            })
            .filter(|candidate| candidate.semantic_score >= threshold)
            .collect();

        candidates.sort_by(|a, b| {
            b.semantic_score
                .partial_cmp(&a.semantic_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn keyword_search(
        &self,
        query_text: &str,
        limit: usize,
    ) -> Result<Vec<SearchCandidate>, AppError> {
        let mut candidates: Vec<SearchCandidate> = self
            .chunks
            .iter()
            .filter_map(|chunk| {
                let score = keyword_match_ratio(query_text, &chunk.text);
                if score > 0.0 {
                    Some(SearchCandidate::new(chunk.clone()).with_keyword_score(score))
                } else {
                    None
                }
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.keyword_score
                .partial_cmp(&a.keyword_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        candidates.truncate(limit);
        Ok(candidates)
    }
}
