use retrieval_pipeline::SelectedChunk;
use serde_json::Value;

/// Default instructions for the answering model. Context blocks are labeled
/// "Context N", and the model is told to cite them by label.
pub const DEFAULT_QUERY_SYSTEM_PROMPT: &str = "\
You answer questions about a corpus of regulatory documents. \
Use only the numbered context passages provided. Cite the passages you \
relied on by their labels (for example: Context 2). If the passages do not \
contain the answer, say so plainly instead of guessing.";

pub fn create_user_message(context: &str, query: &str) -> String {
    format!(
        r"
        Context Information:
        ==================
        {context}

        User Question:
        ==================
        {query}
        "
    )
}

/// Serializes the selected chunks as a JSON block, handy for logging and for
/// structured prompt variants.
pub fn chunks_to_context_json(selected: &[SelectedChunk]) -> Value {
    fn round_score(value: f32) -> f64 {
        (f64::from(value) * 1000.0).round() / 1000.0
    }

    serde_json::json!(selected
        .iter()
        .map(|chunk| {
            serde_json::json!({
                "id": chunk.candidate.chunk.id,
                "section": chunk.candidate.chunk.section_label,
                "content": chunk.text,
                "score": round_score(chunk.candidate.combined_score),
            })
        })
        .collect::<Vec<_>>())
}
