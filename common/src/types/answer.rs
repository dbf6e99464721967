use serde::{Deserialize, Serialize};

/// Attribution for one supporting chunk in an answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceAttribution {
    pub chunk_id: String,
    pub section_label: Option<String>,
    pub similarity: f32,
    pub preview_text: String,
}

/// The structured outcome of one answered query.
///
/// Built once per request and handed back to the caller; persistence, if any,
/// is the surrounding application's concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResult {
    pub answer_text: String,
    pub sources: Vec<SourceAttribution>,
    /// The single chunk chosen to represent the answer to a human reader.
    /// Always present in `sources` as well.
    pub best_source: Option<SourceAttribution>,
    /// Label of the search method actually attempted ("semantic", "hybrid",
    /// "contextual").
    pub search_method: String,
    pub response_time_ms: u64,
    pub profile_used: String,
}

/// Fixed answer text used when retrieval finds nothing relevant. A known,
/// successful outcome, distinct from any failure.
pub const NO_RELEVANT_CONTEXT_ANSWER: &str =
    "No relevant information was found in the document corpus for this question. \
     Try rephrasing, or referencing a specific section number.";

impl AnswerResult {
    pub fn no_relevant_context(
        search_method: String,
        profile_used: String,
        response_time_ms: u64,
    ) -> Self {
        Self {
            answer_text: NO_RELEVANT_CONTEXT_ANSWER.to_string(),
            sources: Vec::new(),
            best_source: None,
            search_method,
            response_time_ms,
            profile_used,
        }
    }

    pub fn is_no_relevant_context(&self) -> bool {
        self.answer_text == NO_RELEVANT_CONTEXT_ANSWER && self.sources.is_empty()
    }
}
