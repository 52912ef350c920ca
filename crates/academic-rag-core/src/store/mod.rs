//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait defines every storage operation the ingestion
//! and query pipelines need, enabling pluggable backends (SQLite in the app
//! crate, [`memory::InMemoryIndex`] here).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;
use serde::Serialize;

use crate::dates::{any_date_covers, DayMonth};
use crate::error::Result;
use crate::models::{Chunk, ChunkMetadata, DocType};

/// Exact-match constraints on chunk metadata. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    pub doc_type: Option<DocType>,
    pub article_number: Option<u32>,
    /// Canonical month name.
    pub month: Option<String>,
    /// Matches chunks with a date cell whose span covers this day.
    pub date: Option<DayMonth>,
}

impl MetadataFilter {
    pub fn doc_type(doc_type: DocType) -> Self {
        Self {
            doc_type: Some(doc_type),
            ..Self::default()
        }
    }

    pub fn article(number: u32) -> Self {
        Self {
            article_number: Some(number),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.doc_type.is_none()
            && self.article_number.is_none()
            && self.month.is_none()
            && self.date.is_none()
    }

    pub fn matches(&self, meta: &ChunkMetadata) -> bool {
        if let Some(doc_type) = self.doc_type {
            if meta.doc_type != doc_type {
                return false;
            }
        }
        if let Some(n) = self.article_number {
            if meta.article_number != Some(n) {
                return false;
            }
        }
        if let Some(month) = &self.month {
            if meta.month.as_deref() != Some(month.as_str()) {
                return false;
            }
        }
        if let Some(date) = &self.date {
            if !any_date_covers(&meta.dates, date) {
                return false;
            }
        }
        true
    }
}

/// Document-level bookkeeping stored next to its chunks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentRecord {
    pub doc_id: String,
    pub doc_type: DocType,
    /// SHA-256 over the extracted pages and the ingestion settings, used to
    /// skip unchanged documents. See [`SourceDocument::ingest_hash`].
    ///
    /// [`SourceDocument::ingest_hash`]: crate::models::SourceDocument::ingest_hash
    pub content_hash: String,
    pub page_count: u32,
}

/// A chunk together with its embedding.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// A chunk returned by similarity search.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity to the query vector.
    pub score: f32,
}

/// Abstract vector index.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`replace_document`](VectorIndex::replace_document) | Swap a document's full chunk set |
/// | [`insert`](VectorIndex::insert) | Add or overwrite one chunk |
/// | [`search`](VectorIndex::search) | Cosine nearest neighbours, optionally filtered |
/// | [`filter`](VectorIndex::filter) | Exact metadata lookup in corpus order |
/// | [`chunk_count`](VectorIndex::chunk_count) | Number of indexed chunks |
/// | [`document_hash`](VectorIndex::document_hash) | Stored content hash of a document |
/// | [`clear`](VectorIndex::clear) | Drop everything |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Replace every chunk of `doc.doc_id` with `entries`, atomically.
    async fn replace_document(&self, doc: &DocumentRecord, entries: &[IndexEntry]) -> Result<()>;

    async fn insert(&self, chunk: &Chunk, vector: &[f32]) -> Result<()>;

    /// Highest-similarity chunks first; ties in corpus order.
    async fn search(
        &self,
        query_vec: &[f32],
        top_n: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredChunk>>;

    /// Chunks matching `filter`, in `(doc_id, position_index)` order.
    async fn filter(&self, filter: &MetadataFilter, limit: usize) -> Result<Vec<Chunk>>;

    async fn chunk_count(&self) -> Result<u64>;

    async fn document_hash(&self, doc_id: &str) -> Result<Option<String>>;

    async fn clear(&self) -> Result<()>;
}

/// Sort search hits by descending score, then corpus order.
pub fn sort_scored(hits: &mut [ScoredChunk]) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.corpus_order().cmp(&b.chunk.corpus_order()))
    });
}
