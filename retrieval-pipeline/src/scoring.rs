use std::cmp::Ordering;

use common::{
    error::AppError,
    types::{candidate::SearchCandidate, profile::Profile},
};

/// Keyword score at or above this bar rescues a candidate whose semantic
/// score falls below the profile threshold. Exact term and section-number
/// lookups routinely land here with mediocre embeddings, and dropping them
/// would blind the engine on precisely the high-precision queries.
pub const KEYWORD_OVERRIDE_BAR: f32 = 0.9;

pub const fn clamp_unit(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

fn validate_unit_score(chunk_id: &str, label: &str, value: f32) -> Result<(), AppError> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(AppError::Validation(format!(
            "candidate {chunk_id}: {label} score {value} outside [0, 1]"
        )));
    }
    Ok(())
}

/// Fuses semantic and keyword scores into one deterministic ranking.
///
/// Malformed inputs (scores outside `[0, 1]`) are upstream defects and raise
/// a validation error rather than being clamped into silence. An empty
/// candidate set is not an error; callers handle the no-context path.
pub fn fuse_candidates(
    candidates: Vec<SearchCandidate>,
    profile: &Profile,
) -> Result<Vec<SearchCandidate>, AppError> {
    profile.validate()?;

    for candidate in &candidates {
        validate_unit_score(&candidate.chunk.id, "semantic", candidate.semantic_score)?;
        validate_unit_score(&candidate.chunk.id, "keyword", candidate.keyword_score)?;
    }

    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let mut ranked: Vec<SearchCandidate> = candidates
        .into_iter()
        .filter(|candidate| {
            candidate.semantic_score >= profile.similarity_threshold
                || candidate.keyword_score >= KEYWORD_OVERRIDE_BAR
        })
        .map(|mut candidate| {
            candidate.combined_score = profile.semantic_weight * candidate.semantic_score
                + profile.keyword_weight * candidate.keyword_score;
            candidate
        })
        .collect();

    sort_by_combined_desc(&mut ranked);
    ranked.truncate(profile.max_chunks);

    Ok(ranked)
}

/// Sorts by combined score descending; ties fall back to semantic score
/// descending, then position index ascending so reruns are reproducible.
pub fn sort_by_combined_desc(candidates: &mut [SearchCandidate]) {
    candidates.sort_by(|a, b| {
        b.combined_score
            .partial_cmp(&a.combined_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                b.semantic_score
                    .partial_cmp(&a.semantic_score)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.chunk.position_index.cmp(&b.chunk.position_index))
    });
}
