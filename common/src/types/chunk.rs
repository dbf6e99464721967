use serde::{Deserialize, Serialize};

/// A bounded segment of a source document, the unit of retrieval.
///
/// Chunks are produced by the external ingestion pipeline together with their
/// embedding vectors; the engine only ever reads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub section_label: Option<String>,
    pub position_index: u32,
}

impl Chunk {
    /// Character count of the chunk text. The corpus is largely Hebrew, so
    /// budgets are counted in characters, never bytes.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// First `max_chars` characters of the text, for source previews.
    pub fn preview(&self, max_chars: usize) -> String {
        let preview: String = self.text.chars().take(max_chars).collect();
        preview.replace('\n', " ")
    }
}
