//! Context formatting for RAG prompts.

use crate::index::ScoredChunk;

/// Join retrieved chunks with single spaces, keeping rank order.
pub fn format_context(sources: &[ScoredChunk]) -> String {
    sources
        .iter()
        .map(|s| s.chunk.content.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Format retrieved chunks for display to the user.
pub fn format_sources_for_display(sources: &[ScoredChunk], preview_chars: usize) -> String {
    sources
        .iter()
        .enumerate()
        .map(|(i, source)| {
            let preview: String = source.chunk.content.chars().take(preview_chars).collect();
            let ellipsis = if source.chunk.char_len() > preview_chars { "..." } else { "" };
            format!(
                "[{}] chunk #{} (score: {:.2})\n  {}{}",
                i + 1,
                source.chunk.order,
                source.score,
                preview.replace('\n', " "),
                ellipsis
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
