//! Chunking strategy dispatch.
//!
//! Each document family is a [`Strategy`]: a detector and a chunker. The
//! [`Dispatcher`] keeps them in priority order, runs the first strategy whose
//! detector accepts the document, and stamps the resulting drafts with
//! positions and ids. The generic strategy is always last and accepts
//! everything, so adding a family never changes the dispatch loop.

use tracing::{debug, info};

use crate::article::{chunk_articles, count_markers};
use crate::calendar::chunk_calendar;
use crate::chunk::{chunk_pages, ChunkingParams};
use crate::dates::count_full_dates;
use crate::models::{Chunk, ChunkDraft, ChunkMetadata, DocType, SourceDocument};

/// `(filename, content_sample) -> accepts`
pub type DetectFn = fn(&str, &str) -> bool;
/// `(document, params) -> drafts`
pub type ChunkFn = fn(&SourceDocument, &ChunkingParams) -> Vec<ChunkDraft>;

/// A document family: how to recognise it and how to chunk it.
#[derive(Clone, Copy)]
pub struct Strategy {
    pub doc_type: DocType,
    pub detect: DetectFn,
    pub chunk: ChunkFn,
}

impl std::fmt::Debug for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strategy")
            .field("doc_type", &self.doc_type)
            .finish_non_exhaustive()
    }
}

const REGULATION_MIN_MARKERS: usize = 3;
const CALENDAR_MIN_DATES: usize = 5;

fn detect_regulation(filename: &str, sample: &str) -> bool {
    let name = filename.to_lowercase();
    name.contains("peraturan")
        || name.contains("regulation")
        || count_markers(sample) >= REGULATION_MIN_MARKERS
}

fn detect_calendar(filename: &str, sample: &str) -> bool {
    let name = filename.to_lowercase();
    name.contains("kalender")
        || name.contains("calendar")
        || count_full_dates(sample) >= CALENDAR_MIN_DATES
}

fn detect_any(_: &str, _: &str) -> bool {
    true
}

/// Page-by-page generic chunking for a whole document.
pub fn chunk_generic(doc: &SourceDocument, params: &ChunkingParams) -> Vec<ChunkDraft> {
    chunk_pages(&doc.pages, params)
}

pub const REGULATION: Strategy = Strategy {
    doc_type: DocType::Regulation,
    detect: detect_regulation,
    chunk: chunk_articles,
};

pub const CALENDAR: Strategy = Strategy {
    doc_type: DocType::Calendar,
    detect: detect_calendar,
    chunk: chunk_calendar,
};

pub const GENERIC: Strategy = Strategy {
    doc_type: DocType::Generic,
    detect: detect_any,
    chunk: chunk_generic,
};

/// Priority-ordered strategy table.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    strategies: Vec<Strategy>,
    params: ChunkingParams,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(ChunkingParams::default())
    }
}

impl Dispatcher {
    /// Regulation, then calendar, then generic.
    pub fn new(params: ChunkingParams) -> Self {
        Self {
            strategies: vec![REGULATION, CALENDAR, GENERIC],
            params,
        }
    }

    /// Register a new family ahead of the generic fallback.
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        let at = self.strategies.len().saturating_sub(1);
        self.strategies.insert(at, strategy);
        self
    }

    pub fn params(&self) -> &ChunkingParams {
        &self.params
    }

    /// The first strategy whose detector accepts the document.
    pub fn select(&self, doc: &SourceDocument) -> Strategy {
        let sample = doc.sample(self.params.sample_chars);
        let filename = doc.filename();
        let chosen = self
            .strategies
            .iter()
            .find(|s| (s.detect)(filename, &sample))
            .copied()
            .unwrap_or(GENERIC);
        if chosen.doc_type == DocType::Generic {
            info!(doc_id = %doc.doc_id, "no document family matched, using generic chunking");
        }
        chosen
    }

    /// Classify and chunk a document. Positions run 0..N in draft order.
    pub fn chunk_document(&self, doc: &SourceDocument) -> (DocType, Vec<Chunk>) {
        let strategy = self.select(doc);
        let drafts = (strategy.chunk)(doc, &self.params);
        debug!(
            doc_id = %doc.doc_id,
            doc_type = strategy.doc_type.as_str(),
            chunks = drafts.len(),
            "document chunked"
        );

        let chunks = drafts
            .into_iter()
            .filter(|d| !d.content.trim().is_empty())
            .enumerate()
            .map(|(i, d)| {
                Chunk::new(
                    d.content,
                    ChunkMetadata {
                        doc_id: doc.doc_id.clone(),
                        doc_type: strategy.doc_type,
                        kind: d.kind,
                        page_range: d.page_range,
                        article_number: d.article_number,
                        sub_index: d.sub_index,
                        month: d.month,
                        dates: d.dates,
                        position_index: i as u32,
                    },
                )
            })
            .collect();
        (strategy.doc_type, chunks)
    }
}
