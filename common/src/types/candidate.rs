use super::chunk::Chunk;

/// A chunk paired with its per-query retrieval scores.
///
/// Created fresh for every request at the `ChunkStore` boundary and never
/// persisted. Both raw scores live in `[0, 1]`; `combined_score` is filled in
/// by score fusion.
#[derive(Debug, Clone)]
pub struct SearchCandidate {
    pub chunk: Chunk,
    pub semantic_score: f32,
    pub keyword_score: f32,
    pub combined_score: f32,
}

impl SearchCandidate {
    pub fn new(chunk: Chunk) -> Self {
        Self {
            chunk,
            semantic_score: 0.0,
            keyword_score: 0.0,
            combined_score: 0.0,
        }
    }

    pub const fn with_semantic_score(mut self, score: f32) -> Self {
        self.semantic_score = score;
        self
    }

    pub const fn with_keyword_score(mut self, score: f32) -> Self {
        self.keyword_score = score;
        self
    }
}
