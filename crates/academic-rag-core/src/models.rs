//! Core data models shared by ingestion and retrieval.
//!
//! A [`SourceDocument`] is split by one of the chunking strategies into
//! [`ChunkDraft`]s; the dispatcher then stamps each draft with its
//! document identity and position to produce an immutable [`Chunk`].

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Document family, decided once per document by the strategy dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    Regulation,
    Calendar,
    Generic,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regulation => "regulation",
            Self::Calendar => "calendar",
            Self::Generic => "generic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "regulation" => Some(Self::Regulation),
            "calendar" => Some(Self::Calendar),
            "generic" => Some(Self::Generic),
            _ => None,
        }
    }
}

/// Which chunker produced a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    /// Regulation text before the first article.
    Preamble,
    /// One article (or one part of an oversized article).
    Article,
    /// A month of calendar rows rendered as a table block.
    CalendarTable,
    /// Free text split by the generic chunker.
    Text,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preamble => "preamble",
            Self::Article => "article",
            Self::CalendarTable => "calendar_table",
            Self::Text => "text",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "preamble" => Some(Self::Preamble),
            "article" => Some(Self::Article),
            "calendar_table" => Some(Self::CalendarTable),
            "text" => Some(Self::Text),
            _ => None,
        }
    }
}

/// Inclusive, 1-based page span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    pub fn single(page: u32) -> Self {
        Self {
            start: page,
            end: page,
        }
    }

    /// Smallest range covering both `self` and `other`.
    pub fn union(self, other: PageRange) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// Metadata attached to every chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub doc_id: String,
    pub doc_type: DocType,
    pub kind: ChunkKind,
    pub page_range: PageRange,
    pub article_number: Option<u32>,
    /// Part index when an article or month block was split for size.
    pub sub_index: Option<u32>,
    pub month: Option<String>,
    /// Date cells covered by the chunk (calendar rows).
    pub dates: Vec<String>,
    pub position_index: u32,
}

/// An immutable unit of retrievable text.
///
/// Identity is `(doc_id, position_index)`; `id` is a UUIDv5 derived from
/// that pair so reingesting the same document reproduces the same ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    /// SHA-256 of `content`.
    pub hash: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn new(content: String, metadata: ChunkMetadata) -> Self {
        let id = chunk_id(&metadata.doc_id, metadata.position_index);
        let hash = sha256_hex(content.as_bytes());
        Self {
            id,
            content,
            hash,
            metadata,
        }
    }

    /// Human-readable source label, e.g. `kalender-2024.pdf (Page 3)`.
    pub fn source_label(&self) -> String {
        format!(
            "{} (Page {})",
            self.metadata.doc_id, self.metadata.page_range.start
        )
    }

    /// Corpus order key used for deterministic tie-breaks.
    pub fn corpus_order(&self) -> (&str, u32) {
        (&self.metadata.doc_id, self.metadata.position_index)
    }
}

/// Deterministic chunk id for `(doc_id, position_index)`.
pub fn chunk_id(doc_id: &str, position_index: u32) -> String {
    let name = format!("{}#{}", doc_id, position_index);
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()).to_string()
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Chunk content and metadata before document identity is assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDraft {
    pub content: String,
    pub kind: ChunkKind,
    pub page_range: PageRange,
    pub article_number: Option<u32>,
    pub sub_index: Option<u32>,
    pub month: Option<String>,
    pub dates: Vec<String>,
}

impl ChunkDraft {
    pub fn text(content: String, page_range: PageRange) -> Self {
        Self {
            content,
            kind: ChunkKind::Text,
            page_range,
            article_number: None,
            sub_index: None,
            month: None,
            dates: Vec::new(),
        }
    }
}

/// A raw source document: extracted text, one entry per page.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Path relative to the documents directory; also the citation name.
    pub doc_id: String,
    /// Page texts in order. Page numbers are 1-based indexes into this list.
    pub pages: Vec<String>,
}

impl SourceDocument {
    pub fn new(doc_id: impl Into<String>, pages: Vec<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            pages,
        }
    }

    /// File name component of `doc_id`, used by the family detectors.
    pub fn filename(&self) -> &str {
        self.doc_id
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.doc_id)
    }

    /// First `max_chars` characters of the document, for detection.
    pub fn sample(&self, max_chars: usize) -> String {
        let mut out = String::new();
        let mut remaining = max_chars;
        for page in &self.pages {
            if remaining == 0 {
                break;
            }
            if !out.is_empty() {
                out.push('\n');
            }
            let taken: String = page.chars().take(remaining).collect();
            remaining = remaining.saturating_sub(taken.chars().count());
            out.push_str(&taken);
        }
        out
    }

    /// SHA-256 over all pages, used to skip unchanged documents.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for page in &self.pages {
            hasher.update(page.as_bytes());
            hasher.update([0x0c]);
        }
        format!("{:x}", hasher.finalize())
    }

    /// Content hash combined with `settings`, a description of everything
    /// that shaped the indexed chunks and vectors (embedding model, dims,
    /// chunking limits). Two ingestions of the same pages under different
    /// settings never compare equal.
    pub fn ingest_hash(&self, settings: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.content_hash().as_bytes());
        hasher.update([0]);
        hasher.update(settings.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn is_blank(&self) -> bool {
        self.pages.iter().all(|p| p.trim().is_empty())
    }
}

/// All pages of a document joined into one string, with a map from byte
/// offsets back to page numbers.
#[derive(Debug, Clone)]
pub struct PagedText {
    pub text: String,
    page_starts: Vec<usize>,
}

/// Separator inserted between pages; also a paragraph boundary.
pub const PAGE_SEPARATOR: &str = "\n\n";

impl PagedText {
    pub fn new(pages: &[String]) -> Self {
        let mut text = String::new();
        let mut page_starts = Vec::with_capacity(pages.len());
        for (i, page) in pages.iter().enumerate() {
            if i > 0 {
                text.push_str(PAGE_SEPARATOR);
            }
            page_starts.push(text.len());
            text.push_str(page);
        }
        if page_starts.is_empty() {
            page_starts.push(0);
        }
        Self { text, page_starts }
    }

    /// 1-based page containing byte `offset`.
    pub fn page_at(&self, offset: usize) -> u32 {
        self.page_starts.partition_point(|&s| s <= offset).max(1) as u32
    }

    /// Pages covered by the byte span `start..end`.
    pub fn page_range(&self, start: usize, end: usize) -> PageRange {
        let last = if end > start { end - 1 } else { start };
        PageRange {
            start: self.page_at(start),
            end: self.page_at(last),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_id_deterministic() {
        assert_eq!(chunk_id("a.pdf", 3), chunk_id("a.pdf", 3));
        assert_ne!(chunk_id("a.pdf", 3), chunk_id("a.pdf", 4));
        assert_ne!(chunk_id("a.pdf", 3), chunk_id("b.pdf", 3));
    }

    #[test]
    fn test_paged_text_offsets() {
        let pages = vec!["first".to_string(), "second".to_string()];
        let paged = PagedText::new(&pages);
        assert_eq!(paged.text, "first\n\nsecond");
        assert_eq!(paged.page_at(0), 1);
        assert_eq!(paged.page_at(4), 1);
        assert_eq!(paged.page_at(7), 2);
        assert_eq!(paged.page_range(2, 10), PageRange { start: 1, end: 2 });
    }

    #[test]
    fn test_sample_spans_pages() {
        let doc = SourceDocument::new("x", vec!["abc".into(), "defgh".into()]);
        assert_eq!(doc.sample(5), "abc\nde");
        assert_eq!(doc.sample(2), "ab");
    }

    #[test]
    fn test_ingest_hash_depends_on_settings() {
        let doc = SourceDocument::new("x", vec!["Pasal 1".into()]);
        assert_eq!(doc.ingest_hash("hash:32"), doc.ingest_hash("hash:32"));
        assert_ne!(doc.ingest_hash("hash:32"), doc.ingest_hash("hash:64"));
        assert_ne!(doc.ingest_hash("hash:32"), doc.content_hash());
    }

    #[test]
    fn test_filename() {
        let doc = SourceDocument::new("2024/kalender-akademik.pdf", vec![]);
        assert_eq!(doc.filename(), "kalender-akademik.pdf");
    }
}
