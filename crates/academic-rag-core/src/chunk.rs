//! Generic boundary-aware text chunker.
//!
//! Splits text into pieces of at most `max_chunk_size` characters,
//! preferring the largest natural boundary available, then re-includes the
//! tail of the previous piece at the head of the next as overlap.
//!
//! # Algorithm
//!
//! 1. If the text fits in `max_chunk_size` characters, it is one piece.
//! 2. Otherwise split at the first separator present, in order of
//!    preference: paragraph (`\n\n`), line (`\n`), sentence (`. `), word
//!    (` `). Each unit keeps its trailing separator.
//! 3. Greedily merge consecutive units while the merged piece fits.
//! 4. A unit that alone exceeds the limit is split recursively with the
//!    next separator; with none left it is cut at character boundaries.
//! 5. Every piece after the first is extended backwards by up to `overlap`
//!    characters, snapped forward to a word boundary, then trimmed.
//!
//! No chunk exceeds `max_chunk_size + overlap` characters and no chunk is
//! empty.
//!
//! # Example
//!
//! ```rust
//! use academic_rag_core::chunk::split_text;
//!
//! let chunks = split_text("Hello world.\n\nSecond paragraph.", 2000, 200);
//! assert_eq!(chunks.len(), 1);
//! ```

use std::ops::Range;

use crate::models::{ChunkDraft, PageRange};

/// Separators tried in order of preference.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " "];

/// Size limits shared by every chunking strategy.
#[derive(Debug, Clone)]
pub struct ChunkingParams {
    /// Maximum characters per chunk, before overlap.
    pub max_chunk_size: usize,
    /// Characters of the previous chunk repeated at the head of the next.
    pub overlap: usize,
    /// Characters of the document inspected by the family detectors.
    pub sample_chars: usize,
}

impl Default for ChunkingParams {
    fn default() -> Self {
        Self {
            max_chunk_size: 2000,
            overlap: 200,
            sample_chars: 5000,
        }
    }
}

/// Split `text` into trimmed chunk strings.
pub fn split_text(text: &str, max_chunk_size: usize, overlap: usize) -> Vec<String> {
    split_spans(text, max_chunk_size, overlap)
        .into_iter()
        .map(|r| text[r].to_string())
        .collect()
}

/// Split `text` into byte ranges of trimmed, non-empty chunks.
///
/// Ranges of consecutive chunks overlap by at most `overlap` characters.
pub fn split_spans(text: &str, max_chunk_size: usize, overlap: usize) -> Vec<Range<usize>> {
    let max_chars = max_chunk_size.max(1);
    let mut pieces = Vec::new();
    split_recursive(text, 0..text.len(), max_chars, SEPARATORS, &mut pieces);

    let mut spans = Vec::with_capacity(pieces.len());
    for piece in pieces {
        let start = if spans.is_empty() {
            piece.start
        } else {
            overlap_start(text, piece.start, overlap)
        };
        let span = trim_span(text, start..piece.end);
        if span.is_empty() {
            continue;
        }
        // A whitespace-only piece must not turn into a pure repeat of overlap.
        if text[piece.clone()].trim().is_empty() {
            continue;
        }
        spans.push(span);
    }
    spans
}

/// Generic strategy: chunk every page on its own so each chunk cites one page.
pub fn chunk_pages(pages: &[String], params: &ChunkingParams) -> Vec<ChunkDraft> {
    let mut drafts = Vec::new();
    for (i, page) in pages.iter().enumerate() {
        let page_range = PageRange::single(i as u32 + 1);
        for content in split_text(page, params.max_chunk_size, params.overlap) {
            drafts.push(ChunkDraft::text(content, page_range));
        }
    }
    drafts
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn split_recursive(
    text: &str,
    range: Range<usize>,
    max_chars: usize,
    separators: &[&str],
    out: &mut Vec<Range<usize>>,
) {
    let slice = &text[range.clone()];
    if char_len(slice) <= max_chars {
        out.push(range);
        return;
    }

    let Some((sep, rest)) = separators.split_first() else {
        hard_split(text, range, max_chars, out);
        return;
    };
    if !slice.contains(sep) {
        split_recursive(text, range, max_chars, rest, out);
        return;
    }

    let mut current: Option<Range<usize>> = None;
    let mut current_len = 0usize;
    let mut pos = range.start;

    for part in slice.split_inclusive(sep) {
        let unit = pos..pos + part.len();
        pos += part.len();
        let unit_len = char_len(part);

        if unit_len > max_chars {
            if let Some(c) = current.take() {
                out.push(c);
            }
            current_len = 0;
            split_recursive(text, unit, max_chars, rest, out);
            continue;
        }

        if current.is_some() && current_len + unit_len <= max_chars {
            if let Some(c) = current.as_mut() {
                c.end = unit.end;
            }
            current_len += unit_len;
        } else {
            if let Some(c) = current.take() {
                out.push(c);
            }
            current = Some(unit);
            current_len = unit_len;
        }
    }

    if let Some(c) = current {
        out.push(c);
    }
}

/// Last resort: cut every `max_chars` characters.
fn hard_split(text: &str, range: Range<usize>, max_chars: usize, out: &mut Vec<Range<usize>>) {
    let mut start = range.start;
    let mut count = 0usize;
    for (i, _) in text[range.clone()].char_indices() {
        if count == max_chars {
            out.push(start..range.start + i);
            start = range.start + i;
            count = 0;
        }
        count += 1;
    }
    if start < range.end {
        out.push(start..range.end);
    }
}

/// Walk back up to `overlap` characters from `start`, then forward to the
/// next word boundary so the overlap never begins mid-word.
fn overlap_start(text: &str, start: usize, overlap: usize) -> usize {
    if overlap == 0 || start == 0 {
        return start;
    }
    let back = text[..start]
        .char_indices()
        .rev()
        .take(overlap)
        .last()
        .map(|(i, _)| i)
        .unwrap_or(start);

    let at_boundary = back == 0
        || text[..back]
            .chars()
            .next_back()
            .map_or(true, char::is_whitespace);
    if at_boundary {
        return back;
    }
    match text[back..start].find(char::is_whitespace) {
        Some(offset) => back + offset,
        None => start,
    }
}

fn trim_span(text: &str, range: Range<usize>) -> Range<usize> {
    let slice = &text[range.clone()];
    let lead = slice.len() - slice.trim_start().len();
    if lead == slice.len() {
        return range.start..range.start;
    }
    let trail = slice.len() - slice.trim_end().len();
    range.start + lead..range.end - trail
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lorem(words: usize) -> String {
        (0..words)
            .map(|i| format!("kata{}", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = split_text("Hello, world!", 2000, 200);
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn test_empty_and_blank_text() {
        assert!(split_text("", 100, 10).is_empty());
        assert!(split_text("   \n\n  ", 100, 10).is_empty());
    }

    #[test]
    fn test_paragraphs_merge_under_limit() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = split_text(text, 2000, 0);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].contains("Third paragraph."));
    }

    #[test]
    fn test_prefers_paragraph_boundary() {
        let a = "a".repeat(30);
        let b = "b".repeat(30);
        let text = format!("{}\n\n{}", a, b);
        let chunks = split_text(&text, 40, 0);
        assert_eq!(chunks, vec![a, b]);
    }

    #[test]
    fn test_never_exceeds_max_plus_overlap() {
        let text = format!(
            "{}\n\n{}. {}\n{}",
            lorem(300),
            lorem(50),
            lorem(120),
            "x".repeat(900)
        );
        for &(max, overlap) in &[(50, 10), (120, 40), (300, 0), (64, 63)] {
            for chunk in split_text(&text, max, overlap) {
                assert!(
                    chunk.chars().count() <= max + overlap,
                    "chunk of {} chars exceeds {} + {}",
                    chunk.chars().count(),
                    max,
                    overlap
                );
                assert!(!chunk.trim().is_empty());
            }
        }
    }

    #[test]
    fn test_overlap_repeats_previous_tail() {
        let text = lorem(200);
        let chunks = split_text(&text, 100, 30);
        assert!(chunks.len() > 2);
        for pair in chunks.windows(2) {
            let first_word = pair[1].split_whitespace().next().unwrap();
            assert!(
                pair[0].split_whitespace().any(|w| w == first_word),
                "'{}' should repeat from the previous chunk",
                first_word
            );
        }
    }

    #[test]
    fn test_chunks_start_at_word_boundaries() {
        let text = lorem(150);
        for span in split_spans(&text, 70, 25) {
            let before = text[..span.start].chars().next_back();
            assert!(before.map_or(true, char::is_whitespace));
            let after = text[span.end..].chars().next();
            assert!(after.map_or(true, char::is_whitespace));
        }
    }

    #[test]
    fn test_hard_split_long_word() {
        let word = "é".repeat(95);
        let chunks = split_text(&word, 40, 0);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 40));
        assert_eq!(chunks.concat(), word);
    }

    #[test]
    fn test_multibyte_utf8_chars() {
        let text = "┌──────────────────┐\n│ Halo dunia       │\n└──────────────────┘";
        let chunks = split_text(text, 12, 4);
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(c.chars().count() <= 16);
        }
    }

    #[test]
    fn test_deterministic() {
        let text = lorem(400);
        assert_eq!(split_text(&text, 90, 20), split_text(&text, 90, 20));
    }

    #[test]
    fn test_chunk_pages_tracks_page_numbers() {
        let pages = vec!["page one".to_string(), String::new(), "page three".to_string()];
        let drafts = chunk_pages(&pages, &ChunkingParams::default());
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].page_range, PageRange::single(1));
        assert_eq!(drafts[1].page_range, PageRange::single(3));
    }
}
