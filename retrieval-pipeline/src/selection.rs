use common::{error::AppError, types::candidate::SearchCandidate};

/// A candidate admitted into the context window. `text` is usually the full
/// chunk text, but an oversized top chunk gets truncated to the budget.
#[derive(Debug, Clone)]
pub struct SelectedChunk {
    pub candidate: SearchCandidate,
    pub text: String,
    pub truncated: bool,
}

/// Greedily fills the character budget in rank order.
///
/// Guarantees: rank order is preserved, the budget is never exceeded, and a
/// non-empty ranked list always yields at least one chunk. If even the top
/// chunk is too large, its text is cut to the budget rather than returning an
/// empty context while candidates exist.
pub fn select_for_context(
    ranked: &[SearchCandidate],
    budget_chars: usize,
) -> Result<Vec<SelectedChunk>, AppError> {
    if budget_chars == 0 {
        return Err(AppError::Validation(
            "context budget must be greater than zero".into(),
        ));
    }

    let mut selected = Vec::new();
    let mut used_chars = 0usize;

    for candidate in ranked {
        let chunk_chars = candidate.chunk.char_len();
        if used_chars + chunk_chars <= budget_chars {
            used_chars += chunk_chars;
            selected.push(SelectedChunk {
                candidate: candidate.clone(),
                text: candidate.chunk.text.clone(),
                truncated: false,
            });
            continue;
        }
        if selected.is_empty() {
            // Top chunk alone exceeds the budget: keep its head rather than
            // answering with no context at all.
            let text: String = candidate.chunk.text.chars().take(budget_chars).collect();
            selected.push(SelectedChunk {
                candidate: candidate.clone(),
                text,
                truncated: true,
            });
        }
        break;
    }

    Ok(selected)
}

/// Picks the single chunk to present to a human as "the" source.
///
/// Literal containment of a distinctive query token beats rank: on
/// section-number and defined-term lookups the verbatim text is a stronger
/// correctness signal than embedding similarity. Falls back to the top-ranked
/// candidate when nothing contains a literal match.
pub fn select_best_for_display<'a>(
    ranked: &'a [SearchCandidate],
    query: &str,
) -> Option<&'a SearchCandidate> {
    for token in distinctive_tokens(query) {
        for candidate in ranked {
            if candidate.chunk.text.to_lowercase().contains(&token) {
                return Some(candidate);
            }
        }
    }
    ranked.first()
}

const MAX_DISTINCTIVE_TOKENS: usize = 3;
const MIN_TOKEN_CHARS: usize = 3;

/// Extracts the most distinctive query tokens, strongest first.
///
/// Tokens are lowercased runs of alphanumerics and dots (so "1.5.1" survives
/// as one token). Anything containing a digit is treated as a section-number
/// style token and outranks plain words; plain words compete by length.
/// Heuristic by design, tuned against observed query logs rather than a
/// fixed rule.
pub fn distinctive_tokens(query: &str) -> Vec<String> {
    let mut tokens = query_tokens(query);

    tokens.sort_by(|a, b| {
        let a_sectionish = a.chars().any(|c| c.is_ascii_digit());
        let b_sectionish = b.chars().any(|c| c.is_ascii_digit());
        b_sectionish
            .cmp(&a_sectionish)
            .then_with(|| b.chars().count().cmp(&a.chars().count()))
    });
    tokens.truncate(MAX_DISTINCTIVE_TOKENS);
    tokens
}

/// Lowercased query tokens worth matching on: runs of alphanumerics and dots,
/// at least three characters unless they carry a digit (section numbers).
pub fn query_tokens(query: &str) -> Vec<String> {
    let mut tokens: Vec<String> = query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '.')
        .map(|token| token.trim_matches('.'))
        .filter(|token| {
            let chars = token.chars().count();
            chars >= MIN_TOKEN_CHARS || (chars > 0 && token.chars().any(|c| c.is_ascii_digit()))
        })
        .map(str::to_owned)
        .collect();

    let mut seen = std::collections::HashSet::new();
    tokens.retain(|token| seen.insert(token.clone()));
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::types::chunk::Chunk;

    fn candidate_with_text(id: &str, position: u32, text: &str, combined: f32) -> SearchCandidate {
        let mut candidate = SearchCandidate::new(Chunk {
            id: id.to_string(),
            document_id: "doc".to_string(),
            text: text.to_string(),
            embedding: vec![],
            section_label: None,
            position_index: position,
        });
        candidate.combined_score = combined;
        candidate.semantic_score = combined;
        candidate
    }

    #[test]
    fn selection_preserves_rank_order_and_budget() {
        let ranked = vec![
            candidate_with_text("a", 0, "aaaaa", 0.9),
            candidate_with_text("b", 1, "bbbbb", 0.8),
            candidate_with_text("c", 2, "ccccc", 0.7),
        ];
        let selected = select_for_context(&ranked, 11).expect("selection");

        let total: usize = selected.iter().map(|s| s.text.chars().count()).sum();
        assert!(total <= 11);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].candidate.chunk.id, "a");
        assert_eq!(selected[1].candidate.chunk.id, "b");
    }

    #[test]
    fn oversized_top_chunk_is_truncated_not_dropped() {
        let ranked = vec![candidate_with_text("big", 0, "סעיף ".repeat(100).as_str(), 0.9)];
        let selected = select_for_context(&ranked, 40).expect("selection");

        assert_eq!(selected.len(), 1);
        assert!(selected[0].truncated);
        assert_eq!(selected[0].text.chars().count(), 40);
    }

    #[test]
    fn empty_ranked_list_yields_empty_selection() {
        let selected = select_for_context(&[], 100).expect("selection");
        assert!(selected.is_empty());
    }

    #[test]
    fn zero_budget_is_a_contract_violation() {
        let ranked = vec![candidate_with_text("a", 0, "text", 0.9)];
        assert!(matches!(
            select_for_context(&ranked, 0),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn later_small_chunk_does_not_jump_the_budget_cut() {
        // "c" would fit in the remaining budget but admitting it would break
        // the best-first contract, so the fill stops at the first overflow.
        let ranked = vec![
            candidate_with_text("a", 0, "aaaa", 0.9),
            candidate_with_text("b", 1, "bbbbbbbbbb", 0.8),
            candidate_with_text("c", 2, "cc", 0.7),
        ];
        let selected = select_for_context(&ranked, 8).expect("selection");
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].candidate.chunk.id, "a");
    }

    #[test]
    fn display_pick_prefers_literal_section_match_over_rank() {
        let ranked = vec![
            candidate_with_text("para", 0, "פסקה כללית על חובות הדיווח", 0.95),
            candidate_with_text("literal", 1, "סעיף 1.5.1 קובע כי יש לדווח", 0.55),
        ];
        let best = select_best_for_display(&ranked, "מה אומר סעיף 1.5.1?")
            .expect("non-empty ranked list");
        assert_eq!(best.chunk.id, "literal");
    }

    #[test]
    fn display_pick_falls_back_to_top_ranked() {
        let ranked = vec![
            candidate_with_text("top", 0, "general obligations apply", 0.95),
            candidate_with_text("other", 1, "more general text", 0.8),
        ];
        let best =
            select_best_for_display(&ranked, "what is required?").expect("non-empty ranked list");
        assert_eq!(best.chunk.id, "top");
    }

    #[test]
    fn display_pick_on_empty_list_is_none() {
        assert!(select_best_for_display(&[], "anything").is_none());
    }

    #[test]
    fn display_pick_matches_case_insensitively() {
        let ranked = vec![
            candidate_with_text("a", 0, "nothing relevant", 0.9),
            candidate_with_text("b", 1, "The REPORTING duty is defined here", 0.5),
        ];
        let best = select_best_for_display(&ranked, "reporting duty")
            .expect("non-empty ranked list");
        assert_eq!(best.chunk.id, "b");
    }

    #[test]
    fn distinctive_tokens_rank_section_numbers_first() {
        let tokens = distinctive_tokens("מה אומר סעיף 1.5.1 לגבי דיווח?");
        assert_eq!(tokens.first().map(String::as_str), Some("1.5.1"));
    }

    #[test]
    fn distinctive_tokens_drop_short_words_but_keep_digits() {
        let tokens = distinctive_tokens("is 42 ok");
        assert!(tokens.contains(&"42".to_string()));
        assert!(!tokens.contains(&"is".to_string()));
        assert!(!tokens.contains(&"ok".to_string()));
    }
}
