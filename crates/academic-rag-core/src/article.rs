//! Article chunker for regulation documents.
//!
//! Regulations are organised in numbered articles (`Pasal 1`, `Pasal 2`, ...).
//! Each article becomes one chunk carrying its number; text before the first
//! article becomes a preamble chunk. Articles longer than the chunk size are
//! split further by the generic chunker and keep their number.
//!
//! # Boundary policy
//!
//! Bodies frequently cite other articles ("sebagaimana dimaksud dalam
//! Pasal 5"). A marker is only treated as a boundary when:
//!
//! 1. it starts a line, if any marker in the document starts a line, and
//! 2. its number is strictly greater than the previous boundary's number.
//!
//! Everything else stays in the body of the enclosing article.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

use crate::chunk::{self, split_spans, ChunkingParams};
use crate::models::{ChunkDraft, ChunkKind, PagedText, SourceDocument};

lazy_static! {
    static ref MARKER_RE: Regex = Regex::new(r"(?i)\bpasal\s+(\d+)\b").unwrap();
}

/// An article marker occurrence in the joined document text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    /// Byte offset of the marker.
    pub start: usize,
    /// Byte offset just past the marker (`Pasal 13`).
    pub end: usize,
    pub number: u32,
    pub line_start: bool,
}

/// Number of article markers in `text`, used by the regulation detector.
pub fn count_markers(text: &str) -> usize {
    MARKER_RE.find_iter(text).count()
}

fn find_markers(text: &str) -> Vec<Marker> {
    MARKER_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let m = caps.get(0)?;
            let number = caps[1].parse().ok()?;
            let line_start = text[..m.start()]
                .rsplit('\n')
                .next()
                .map_or(true, |prefix| prefix.trim().is_empty());
            Some(Marker {
                start: m.start(),
                end: m.end(),
                number,
                line_start,
            })
        })
        .collect()
}

/// Markers that open a new article, in document order.
pub fn article_boundaries(text: &str) -> Vec<Marker> {
    let markers = find_markers(text);
    let line_anchored = markers.iter().any(|m| m.line_start);

    let mut boundaries: Vec<Marker> = Vec::new();
    for marker in markers {
        if line_anchored && !marker.line_start {
            continue;
        }
        match boundaries.last() {
            Some(prev) if marker.number <= prev.number => {
                debug!(number = marker.number, "treating article marker as cross reference");
            }
            _ => boundaries.push(marker),
        }
    }
    boundaries
}

/// Regulation strategy: one chunk per article, plus an optional preamble.
pub fn chunk_articles(doc: &SourceDocument, params: &ChunkingParams) -> Vec<ChunkDraft> {
    let paged = PagedText::new(&doc.pages);
    let text = paged.text.as_str();
    let boundaries = article_boundaries(text);

    if boundaries.is_empty() {
        warn!(doc_id = %doc.doc_id, "no article markers found, chunking as plain text");
        return chunk::chunk_pages(&doc.pages, params);
    }

    let mut drafts = Vec::new();

    let preamble_end = boundaries[0].start;
    push_section(
        &mut drafts,
        &paged,
        0,
        preamble_end,
        ChunkKind::Preamble,
        None,
        params,
    );

    for (i, marker) in boundaries.iter().enumerate() {
        let end = boundaries
            .get(i + 1)
            .map(|next| next.start)
            .unwrap_or(text.len());

        if text[marker.end..end].trim().is_empty() {
            warn!(
                doc_id = %doc.doc_id,
                article = marker.number,
                "dropping article with no body text"
            );
            continue;
        }

        push_section(
            &mut drafts,
            &paged,
            marker.start,
            end,
            ChunkKind::Article,
            Some(marker.number),
            params,
        );
    }

    drafts
}

/// Emit `text[start..end]` as one draft, or several with `sub_index` when it
/// exceeds the chunk size.
fn push_section(
    drafts: &mut Vec<ChunkDraft>,
    paged: &PagedText,
    start: usize,
    end: usize,
    kind: ChunkKind,
    article_number: Option<u32>,
    params: &ChunkingParams,
) {
    let section = &paged.text[start..end];
    if section.trim().is_empty() {
        return;
    }

    let spans = if section.trim().chars().count() > params.max_chunk_size {
        split_spans(section, params.max_chunk_size, params.overlap)
    } else {
        let lead = section.len() - section.trim_start().len();
        vec![lead..lead + section.trim().len()]
    };
    let split = spans.len() > 1;

    for (i, span) in spans.into_iter().enumerate() {
        let abs_start = start + span.start;
        let abs_end = start + span.end;
        drafts.push(ChunkDraft {
            content: section[span].to_string(),
            kind,
            page_range: paged.page_range(abs_start, abs_end),
            article_number,
            sub_index: split.then_some(i as u32),
            month: None,
            dates: Vec::new(),
        });
    }
}
