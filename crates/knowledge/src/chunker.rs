//! Text chunking with configurable size and overlap.
//!
//! Splitting is delegated to `text-splitter`, which prefers semantic
//! boundaries (paragraphs, sentences, words) within the size budget.

use crate::types::ChunkCandidate;
use ragloop_core::{AppError, AppResult};
use text_splitter::{ChunkConfig, TextSplitter};

/// Chunk text into overlapping segments of at most `chunk_size` characters.
pub fn chunk_text(
    source_id: &str,
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> AppResult<Vec<ChunkCandidate>> {
    if chunk_size == 0 {
        return Err(AppError::Knowledge(
            "Chunk size must be greater than zero".to_string(),
        ));
    }

    let config = ChunkConfig::new(chunk_size)
        .with_overlap(overlap)
        .map_err(|e| AppError::Knowledge(format!("Invalid chunk configuration: {}", e)))?;
    let splitter = TextSplitter::new(config);

    let chunks: Vec<ChunkCandidate> = splitter
        .chunk_indices(text)
        .filter(|(_, chunk)| !chunk.trim().is_empty())
        .enumerate()
        .map(|(position, (offset, chunk))| ChunkCandidate {
            source_id: source_id.to_string(),
            position: position as u32,
            text: chunk.to_string(),
            metadata: serde_json::json!({
                "start": offset,
                "end": offset + chunk.len(),
            }),
        })
        .collect();

    tracing::debug!(
        "Chunked text into {} chunks (size: {}, overlap: {})",
        chunks.len(),
        chunk_size,
        overlap
    );

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_text_respects_size() {
        let text = "Agents use tools to act. ".repeat(100);
        let chunks = chunk_text("test-source", &text, 200, 50).unwrap();

        assert!(chunks.len() > 1);
        assert_eq!(chunks[0].position, 0);
        assert_eq!(chunks[1].position, 1);
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 200));
    }

    #[test]
    fn test_chunk_offsets_point_into_source() {
        let text = "First paragraph about prompts.\n\nSecond paragraph about attacks.";
        let chunks = chunk_text("s", text, 40, 0).unwrap();

        for chunk in &chunks {
            let start = chunk.metadata["start"].as_u64().unwrap() as usize;
            let end = chunk.metadata["end"].as_u64().unwrap() as usize;
            assert_eq!(&text[start..end], chunk.text);
        }
    }

    #[test]
    fn test_chunk_text_empty() {
        let chunks = chunk_text("test-source", "", 100, 10).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_invalid_overlap() {
        assert!(chunk_text("s", "text", 100, 100).is_err());
        assert!(chunk_text("s", "text", 0, 0).is_err());
    }
}
