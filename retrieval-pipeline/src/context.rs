use common::error::AppError;
use tracing::warn;

use crate::selection::SelectedChunk;

/// Turns selected chunks into the bounded prompt context.
///
/// Each chunk is prefixed with a stable numbered label so the prompt can cite
/// deterministically. The selector already bounded the chunk texts, but this
/// is the last gate before the generation call, so the ceiling is enforced
/// again here.
pub fn assemble(selected: &[SelectedChunk], max_context_chars: usize) -> Result<String, AppError> {
    if max_context_chars == 0 {
        return Err(AppError::Validation(
            "max_context_chars must be greater than zero".into(),
        ));
    }

    let mut context = String::new();
    for (index, chunk) in selected.iter().enumerate() {
        let block = format!("Context {}:\n{}", index + 1, chunk.text);
        let block_chars = block.chars().count() + if context.is_empty() { 0 } else { 2 };
        if context.chars().count() + block_chars > max_context_chars {
            if context.is_empty() {
                // Labels pushed a budget-sized chunk over the ceiling; keep
                // the head of the first block instead of failing the request.
                warn!(
                    chunk_id = %chunk.candidate.chunk.id,
                    max_context_chars,
                    "context block exceeds ceiling on its own, truncating"
                );
                context = block.chars().take(max_context_chars).collect();
            }
            break;
        }
        if !context.is_empty() {
            context.push_str("\n\n");
        }
        context.push_str(&block);
    }

    debug_assert!(context.chars().count() <= max_context_chars);
    Ok(context)
}
