//! Word-window chunking with configurable size and overlap.
//!
//! Windows are measured in Unicode words but sliced from the original text,
//! so punctuation, units and line breaks inside a window are preserved.

use crate::parser::ParsedSection;
use crate::types::ChunkCandidate;
use unicode_segmentation::UnicodeSegmentation;

/// Chunk each section into overlapping windows of `chunk_size` words.
///
/// Positions are numbered across the whole document. Windows never cross
/// section boundaries, so each chunk keeps a single section label.
pub fn chunk_sections(
    sections: &[ParsedSection],
    chunk_size: usize,
    overlap: usize,
) -> Vec<ChunkCandidate> {
    let mut chunks = Vec::new();

    for section in sections {
        for text in chunk_text(&section.text, chunk_size, overlap) {
            chunks.push(ChunkCandidate {
                position: chunks.len() as u32,
                section: section.label.clone(),
                text,
            });
        }
    }

    tracing::debug!(
        "Chunked {} sections into {} chunks (size: {} words, overlap: {})",
        sections.len(),
        chunks.len(),
        chunk_size,
        overlap
    );

    chunks
}

/// Split text into windows of at most `chunk_size` words, consecutive
/// windows sharing `overlap` words.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if chunk_size == 0 {
        return Vec::new();
    }

    // Byte span of every word
    let words: Vec<(usize, usize)> = text
        .split_word_bound_indices()
        .filter(|(_, w)| w.chars().any(char::is_alphanumeric))
        .map(|(start, w)| (start, start + w.len()))
        .collect();

    if words.is_empty() {
        return Vec::new();
    }

    let step = if overlap < chunk_size {
        chunk_size - overlap
    } else {
        chunk_size
    };

    let mut windows = Vec::new();
    let mut first = 0;
    loop {
        let last = (first + chunk_size).min(words.len()) - 1;
        let start = words[first].0;
        let end = window_end(text, words[last].1);
        windows.push(text[start..end].trim().to_string());

        if last + 1 >= words.len() {
            break;
        }
        first += step;
    }

    windows
}

// Extend past trailing punctuation up to the next whitespace.
fn window_end(text: &str, word_end: usize) -> usize {
    text[word_end..]
        .char_indices()
        .find(|(_, c)| c.is_whitespace())
        .map(|(i, _)| word_end + i)
        .unwrap_or(text.len())
}
