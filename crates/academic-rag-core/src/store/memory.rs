//! In-memory [`VectorIndex`] implementation for tests and embedding.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock` for thread safety.
//! Search is brute-force cosine similarity over all stored vectors.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{Error, Result};
use crate::models::Chunk;

use super::{sort_scored, DocumentRecord, IndexEntry, MetadataFilter, ScoredChunk, VectorIndex};

struct StoredChunk {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// In-memory index for tests and embedding in other programs.
pub struct InMemoryIndex {
    docs: RwLock<HashMap<String, DocumentRecord>>,
    chunks: RwLock<Vec<StoredChunk>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            chunks: RwLock::new(Vec::new()),
        }
    }

    fn read_chunks(&self) -> Result<RwLockReadGuard<'_, Vec<StoredChunk>>> {
        self.chunks.read().map_err(|_| poisoned())
    }

    fn write_chunks(&self) -> Result<RwLockWriteGuard<'_, Vec<StoredChunk>>> {
        self.chunks.write().map_err(|_| poisoned())
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> Error {
    Error::IndexUnavailable("in-memory index lock poisoned".to_string())
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn replace_document(&self, doc: &DocumentRecord, entries: &[IndexEntry]) -> Result<()> {
        let mut docs = self.docs.write().map_err(|_| poisoned())?;
        let mut stored = self.write_chunks()?;
        stored.retain(|sc| sc.chunk.metadata.doc_id != doc.doc_id);
        for entry in entries {
            stored.push(StoredChunk {
                chunk: entry.chunk.clone(),
                vector: entry.vector.clone(),
            });
        }
        docs.insert(doc.doc_id.clone(), doc.clone());
        Ok(())
    }

    async fn insert(&self, chunk: &Chunk, vector: &[f32]) -> Result<()> {
        let mut stored = self.write_chunks()?;
        stored.retain(|sc| sc.chunk.id != chunk.id);
        stored.push(StoredChunk {
            chunk: chunk.clone(),
            vector: vector.to_vec(),
        });
        Ok(())
    }

    async fn search(
        &self,
        query_vec: &[f32],
        top_n: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredChunk>> {
        let stored = self.read_chunks()?;
        let mut hits: Vec<ScoredChunk> = stored
            .iter()
            .filter(|sc| filter.map_or(true, |f| f.matches(&sc.chunk.metadata)))
            .map(|sc| ScoredChunk {
                chunk: sc.chunk.clone(),
                score: cosine_similarity(query_vec, &sc.vector),
            })
            .collect();
        sort_scored(&mut hits);
        hits.truncate(top_n);
        Ok(hits)
    }

    async fn filter(&self, filter: &MetadataFilter, limit: usize) -> Result<Vec<Chunk>> {
        let stored = self.read_chunks()?;
        let mut chunks: Vec<Chunk> = stored
            .iter()
            .filter(|sc| filter.matches(&sc.chunk.metadata))
            .map(|sc| sc.chunk.clone())
            .collect();
        chunks.sort_by(|a, b| a.corpus_order().cmp(&b.corpus_order()));
        chunks.truncate(limit);
        Ok(chunks)
    }

    async fn chunk_count(&self) -> Result<u64> {
        Ok(self.read_chunks()?.len() as u64)
    }

    async fn document_hash(&self, doc_id: &str) -> Result<Option<String>> {
        let docs = self.docs.read().map_err(|_| poisoned())?;
        Ok(docs.get(doc_id).map(|d| d.content_hash.clone()))
    }

    async fn clear(&self) -> Result<()> {
        self.docs.write().map_err(|_| poisoned())?.clear();
        self.write_chunks()?.clear();
        Ok(())
    }
}
