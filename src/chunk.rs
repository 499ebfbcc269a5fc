//! Sliding-window text chunker.
//!
//! Splits document text into overlapping spans of at most `size` characters,
//! advancing by `size − overlap` per step. Order is retrieval-significant:
//! `chunk_index` is derived from window position, and chunk ids are
//! `"{document_hash}_{index}"` so re-ingestion is idempotent and deletion can
//! cascade on the hash alone.

use crate::models::DocumentChunk;

/// Split text into overlapping spans. `overlap` must be < `size` (validated
/// at config load).
///
/// Each span is whitespace-trimmed; empty spans are dropped. Empty input
/// yields an empty sequence, and text shorter than `size` yields exactly one
/// span. The window stops once it reaches the end of the text, so no span is
/// fully contained in the previous span's overlap.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    if text.is_empty() || size == 0 {
        return Vec::new();
    }

    // Byte offset of every char boundary, so windows never split a code point.
    let mut boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    boundaries.push(text.len());
    let n_chars = boundaries.len() - 1;

    let step = size - overlap;
    let mut spans = Vec::new();
    let mut start = 0usize;

    loop {
        let end = (start + size).min(n_chars);
        let span = text[boundaries[start]..boundaries[end]].trim();
        if !span.is_empty() {
            spans.push(span.to_string());
        }
        if end >= n_chars {
            break;
        }
        start += step;
    }

    spans
}

/// Build the chunk batch for one document.
pub fn build_chunks(
    document_hash: &str,
    filename: &str,
    category: &str,
    source_path: &str,
    text: &str,
    size: usize,
    overlap: usize,
) -> Vec<DocumentChunk> {
    chunk_text(text, size, overlap)
        .into_iter()
        .enumerate()
        .map(|(i, span)| DocumentChunk {
            chunk_id: format!("{}_{}", document_hash, i),
            document_hash: document_hash.to_string(),
            text: span,
            chunk_index: i as i64,
            filename: filename.to_string(),
            category: category.to_string(),
            source_path: source_path.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_text("", 600, 150).is_empty());
    }

    #[test]
    fn whitespace_only_text_yields_no_chunks() {
        assert!(chunk_text("   \n\n  \t ", 600, 150).is_empty());
    }

    #[test]
    fn short_text_yields_single_trimmed_chunk() {
        let chunks = chunk_text("  hello world  ", 600, 150);
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }

    #[test]
    fn chunk_count_matches_window_formula() {
        // count = ceil((L − overlap) / (size − overlap)) for L > size
        let cases = [(10usize, 4usize, 1usize), (100, 30, 10), (601, 600, 150)];
        for (len, size, overlap) in cases {
            let text: String = std::iter::repeat('x').take(len).collect();
            let chunks = chunk_text(&text, size, overlap);
            let step = size - overlap;
            let expected = (len - overlap).div_ceil(step);
            assert_eq!(chunks.len(), expected, "L={} size={} ov={}", len, size, overlap);
        }
    }

    #[test]
    fn consecutive_chunks_share_overlap() {
        let text: String = ('a'..='z').cycle().take(100).collect();
        let chunks = chunk_text(&text, 40, 10);
        for pair in chunks.windows(2) {
            let tail: String = pair[0].chars().rev().take(10).collect::<String>();
            let tail: String = tail.chars().rev().collect();
            assert!(pair[1].starts_with(&tail));
        }
    }

    #[test]
    fn non_overlapping_portions_cover_the_text() {
        let text: String = ('a'..='z').cycle().take(95).collect();
        let size = 30;
        let overlap = 5;
        let chunks = chunk_text(&text, size, overlap);

        let mut rebuilt = chunks[0].clone();
        for chunk in &chunks[1..] {
            rebuilt.push_str(&chunk.chars().skip(overlap).collect::<String>());
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn multibyte_text_does_not_split_code_points() {
        let text = "héllo wörld ".repeat(30);
        let chunks = chunk_text(&text, 50, 10);
        assert!(!chunks.is_empty());
        // Slicing on a non-boundary would have panicked above; also check
        // content integrity of the first window.
        assert!(chunks[0].starts_with("héllo"));
    }

    #[test]
    fn build_chunks_assigns_deterministic_ids() {
        let text: String = std::iter::repeat('y').take(1500).collect();
        let a = build_chunks("abc123", "f.txt", "Code", "/s/f.txt", &text, 600, 150);
        let b = build_chunks("abc123", "f.txt", "Code", "/s/f.txt", &text, 600, 150);
        assert_eq!(a.len(), b.len());
        for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
            assert_eq!(x.chunk_id, format!("abc123_{}", i));
            assert_eq!(x.chunk_id, y.chunk_id);
            assert_eq!(x.chunk_index, i as i64);
        }
    }
}
