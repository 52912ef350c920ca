//! Deterministic reranking of retrieval candidates.
//!
//! ```text
//! combined = raw_score × semantic_weight
//!          + filter_match_bonus            (exact filter hit)
//!          − duplicate_penalty × n         (n = chunks already picked from the same page)
//! ```
//!
//! Selection is greedy: after each pick the page penalties are recomputed
//! for the remaining candidates. Ties are broken by `(doc_id,
//! position_index)`, so the same pool always yields the same ranking.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Serialize;

use crate::models::Chunk;
use crate::retrieve::RetrievalCandidate;

#[derive(Debug, Clone)]
pub struct RerankParams {
    pub top_k: usize,
    pub semantic_weight: f32,
    pub filter_match_bonus: f32,
    pub duplicate_penalty: f32,
}

impl Default for RerankParams {
    fn default() -> Self {
        Self {
            top_k: 5,
            semantic_weight: 1.0,
            filter_match_bonus: 0.5,
            duplicate_penalty: 0.15,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedChunk {
    pub chunk: Chunk,
    pub raw_score: f32,
    pub combined_score: f32,
    pub matched_filter: bool,
}

fn page_key(chunk: &Chunk) -> (&str, u32) {
    (&chunk.metadata.doc_id, chunk.metadata.page_range.start)
}

fn base_score(c: &RetrievalCandidate, params: &RerankParams) -> f32 {
    let bonus = if c.matched_filter {
        params.filter_match_bonus
    } else {
        0.0
    };
    c.raw_score * params.semantic_weight + bonus
}

/// Higher score first, then corpus order.
fn rank_order(a_score: f32, a: &Chunk, b_score: f32, b: &Chunk) -> Ordering {
    b_score
        .partial_cmp(&a_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.corpus_order().cmp(&b.corpus_order()))
}

/// Select the top `params.top_k` candidates.
pub fn rerank(candidates: &[RetrievalCandidate], params: &RerankParams) -> Vec<RankedChunk> {
    let pages: Vec<(&str, u32)> = candidates.iter().map(|c| page_key(&c.chunk)).collect();
    let mut remaining: Vec<usize> = (0..candidates.len()).collect();
    let mut picked_per_page: HashMap<(&str, u32), u32> = HashMap::new();
    let mut selected: Vec<RankedChunk> = Vec::new();

    while selected.len() < params.top_k && !remaining.is_empty() {
        let score = |i: usize| {
            let n = picked_per_page.get(&pages[i]).copied().unwrap_or(0);
            base_score(&candidates[i], params) - params.duplicate_penalty * n as f32
        };

        let mut best = 0;
        let mut best_score = score(remaining[0]);
        for (slot, &i) in remaining.iter().enumerate().skip(1) {
            let s = score(i);
            let current = &candidates[remaining[best]].chunk;
            if rank_order(s, &candidates[i].chunk, best_score, current) == Ordering::Less {
                best = slot;
                best_score = s;
            }
        }

        let chosen = remaining.remove(best);
        *picked_per_page.entry(pages[chosen]).or_insert(0) += 1;
        let c = &candidates[chosen];
        selected.push(RankedChunk {
            chunk: c.chunk.clone(),
            raw_score: c.raw_score,
            combined_score: best_score,
            matched_filter: c.matched_filter,
        });
    }

    selected.sort_by(|a, b| rank_order(a.combined_score, &a.chunk, b.combined_score, &b.chunk));
    selected
}
