//! Hybrid retrieval: exact metadata filters first, semantic search as the
//! fallback.
//!
//! | Intent | First attempt | Fallbacks |
//! |--------|---------------|-----------|
//! | ARTICLE | one filter group per article number | semantic search |
//! | CALENDAR | month + date | month only, then semantic (calendar docs first) |
//! | GENERAL | semantic (hinted doc type first) | semantic, unrestricted |
//!
//! Filter hits score `1.0`; semantic hits score their cosine similarity
//! clamped to `[0, 1]`. The question is only embedded when a semantic
//! search actually runs.

use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;

use crate::embedding::{embed_one, Embedder};
use crate::error::Result;
use crate::models::{Chunk, DocType};
use crate::query::{IntentKind, QueryIntent};
use crate::store::{MetadataFilter, VectorIndex};

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone)]
pub struct RetrievalParams {
    /// Semantic search pool size.
    pub candidate_pool: usize,
    /// Cap per exact-filter group.
    pub per_filter_limit: usize,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            candidate_pool: 10,
            per_filter_limit: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalCandidate {
    pub chunk: Chunk,
    pub raw_score: f32,
    /// True when the chunk came from an exact metadata filter.
    pub matched_filter: bool,
    /// Article number of the filter group, for multi-article questions.
    pub group: Option<u32>,
}

impl RetrievalCandidate {
    fn from_filter(chunk: Chunk, group: Option<u32>) -> Self {
        Self {
            chunk,
            raw_score: 1.0,
            matched_filter: true,
            group,
        }
    }
}

/// Bundles the collaborators of one retrieval.
pub struct Retriever<'a> {
    index: &'a dyn VectorIndex,
    embedder: &'a dyn Embedder,
    params: RetrievalParams,
}

impl<'a> Retriever<'a> {
    pub fn new(
        index: &'a dyn VectorIndex,
        embedder: &'a dyn Embedder,
        params: RetrievalParams,
    ) -> Self {
        Self {
            index,
            embedder,
            params,
        }
    }

    /// Retrieve unique candidates for `question` under `intent`.
    pub async fn retrieve(
        &self,
        intent: &QueryIntent,
        question: &str,
    ) -> Result<Vec<RetrievalCandidate>> {
        let mut query_vec: Option<Vec<f32>> = None;
        let filters = &intent.filters;

        let candidates = match intent.kind {
            IntentKind::Article => {
                let mut found = Vec::new();
                for &number in &filters.article_numbers {
                    let group = self
                        .index
                        .filter(&MetadataFilter::article(number), self.params.per_filter_limit)
                        .await?;
                    debug!(article = number, hits = group.len(), "article filter");
                    found.extend(
                        group
                            .into_iter()
                            .map(|c| RetrievalCandidate::from_filter(c, Some(number))),
                    );
                }
                if found.is_empty() {
                    debug!("no chunk for requested articles, falling back to semantic search");
                    self.semantic(question, None, &mut query_vec).await?
                } else {
                    found
                }
            }
            IntentKind::Calendar => {
                let mut filter = MetadataFilter {
                    month: filters.month.clone(),
                    date: filters.date.clone(),
                    ..MetadataFilter::default()
                };
                let mut hits = self
                    .index
                    .filter(&filter, self.params.candidate_pool)
                    .await?;
                if hits.is_empty() && filter.date.is_some() {
                    debug!("no chunk covers the date, retrying with month only");
                    filter.date = None;
                    hits = self
                        .index
                        .filter(&filter, self.params.candidate_pool)
                        .await?;
                }
                if hits.is_empty() || filter.is_empty() {
                    debug!("calendar filter empty, falling back to semantic search");
                    self.semantic(question, Some(DocType::Calendar), &mut query_vec)
                        .await?
                } else {
                    hits.into_iter()
                        .map(|c| RetrievalCandidate::from_filter(c, None))
                        .collect()
                }
            }
            IntentKind::General => {
                self.semantic(question, filters.doc_type_hint, &mut query_vec)
                    .await?
            }
        };

        let mut seen = HashSet::new();
        let unique: Vec<RetrievalCandidate> = candidates
            .into_iter()
            .filter(|c| seen.insert(c.chunk.id.clone()))
            .collect();
        debug!(candidates = unique.len(), "retrieval finished");
        Ok(unique)
    }

    /// Semantic search, restricted to `hint` first when one is given.
    async fn semantic(
        &self,
        question: &str,
        hint: Option<DocType>,
        query_vec: &mut Option<Vec<f32>>,
    ) -> Result<Vec<RetrievalCandidate>> {
        if query_vec.is_none() {
            *query_vec = Some(embed_one(self.embedder, question).await?);
        }
        let Some(qv) = query_vec.as_deref() else {
            return Ok(Vec::new());
        };

        let mut hits = Vec::new();
        if let Some(doc_type) = hint {
            hits = self
                .index
                .search(
                    qv,
                    self.params.candidate_pool,
                    Some(&MetadataFilter::doc_type(doc_type)),
                )
                .await?;
        }
        if hits.is_empty() {
            hits = self
                .index
                .search(qv, self.params.candidate_pool, None)
                .await?;
        }

        Ok(hits
            .into_iter()
            .map(|h| RetrievalCandidate {
                chunk: h.chunk,
                raw_score: h.score.clamp(0.0, 1.0),
                matched_filter: false,
                group: None,
            })
            .collect())
    }
}
