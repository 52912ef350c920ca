//! SQLite-backed [`VectorIndex`] implementation.
//!
//! Chunks and their metadata live in `chunks`, vectors as little-endian f32
//! BLOBs in `chunk_vectors`, and per-document bookkeeping in `documents`.
//! Similarity is brute-force cosine computed in process, restricted to
//! vectors produced by the configured embedding model.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use academic_rag_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use academic_rag_core::models::{Chunk, ChunkKind, ChunkMetadata, DocType, PageRange};
use academic_rag_core::store::{
    sort_scored, DocumentRecord, IndexEntry, MetadataFilter, ScoredChunk, VectorIndex,
};
use academic_rag_core::{Error, Result};

const CHUNK_COLUMNS: &str = "c.id, c.doc_id, c.position_index, c.content, c.hash, c.doc_type, \
     c.kind, c.page_start, c.page_end, c.article_number, c.sub_index, c.month, c.dates_json";

/// Columns that can be filtered in SQL; the date filter is applied in Rust.
const FILTER_CLAUSE: &str = "(? IS NULL OR c.doc_type = ?) \
     AND (? IS NULL OR c.article_number = ?) \
     AND (? IS NULL OR c.month = ?)";

/// SQLite implementation of the [`VectorIndex`] trait.
pub struct SqliteIndex {
    pool: SqlitePool,
    /// Embedding model whose vectors this index reads and writes.
    model: String,
}

impl SqliteIndex {
    pub fn new(pool: SqlitePool, model: impl Into<String>) -> Self {
        Self {
            pool,
            model: model.into(),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Stored document records, ordered by id.
    pub async fn documents(&self) -> Result<Vec<DocumentRecord>> {
        let rows = sqlx::query(
            "SELECT doc_id, doc_type, content_hash, page_count FROM documents ORDER BY doc_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;
        rows.iter()
            .map(|row| {
                let doc_type: String = row.get("doc_type");
                Ok(DocumentRecord {
                    doc_id: row.get("doc_id"),
                    doc_type: parse_doc_type(&doc_type)?,
                    content_hash: row.get("content_hash"),
                    page_count: row.get::<i64, _>("page_count") as u32,
                })
            })
            .collect()
    }
}

fn unavailable(e: impl std::fmt::Display) -> Error {
    Error::IndexUnavailable(e.to_string())
}

fn parse_doc_type(s: &str) -> Result<DocType> {
    DocType::parse(s).ok_or_else(|| unavailable(format!("unknown doc_type '{}' in index", s)))
}

fn row_to_chunk(row: &SqliteRow) -> Result<Chunk> {
    let doc_type: String = row.get("doc_type");
    let kind: String = row.get("kind");
    let dates_json: String = row.get("dates_json");
    let dates: Vec<String> = serde_json::from_str(&dates_json).map_err(unavailable)?;

    Ok(Chunk {
        id: row.get("id"),
        content: row.get("content"),
        hash: row.get("hash"),
        metadata: ChunkMetadata {
            doc_id: row.get("doc_id"),
            doc_type: parse_doc_type(&doc_type)?,
            kind: ChunkKind::parse(&kind)
                .ok_or_else(|| unavailable(format!("unknown chunk kind '{}' in index", kind)))?,
            page_range: PageRange {
                start: row.get::<i64, _>("page_start") as u32,
                end: row.get::<i64, _>("page_end") as u32,
            },
            article_number: row.get::<Option<i64>, _>("article_number").map(|n| n as u32),
            sub_index: row.get::<Option<i64>, _>("sub_index").map(|n| n as u32),
            month: row.get("month"),
            dates,
            position_index: row.get::<i64, _>("position_index") as u32,
        },
    })
}

async fn insert_chunk<'e, E>(executor: E, chunk: &Chunk) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let meta = &chunk.metadata;
    let dates_json = serde_json::to_string(&meta.dates).map_err(unavailable)?;
    sqlx::query(
        r#"
        INSERT INTO chunks (id, doc_id, position_index, content, hash, doc_type, kind,
                            page_start, page_end, article_number, sub_index, month, dates_json)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            content = excluded.content,
            hash = excluded.hash,
            doc_type = excluded.doc_type,
            kind = excluded.kind,
            page_start = excluded.page_start,
            page_end = excluded.page_end,
            article_number = excluded.article_number,
            sub_index = excluded.sub_index,
            month = excluded.month,
            dates_json = excluded.dates_json
        "#,
    )
    .bind(&chunk.id)
    .bind(&meta.doc_id)
    .bind(meta.position_index as i64)
    .bind(&chunk.content)
    .bind(&chunk.hash)
    .bind(meta.doc_type.as_str())
    .bind(meta.kind.as_str())
    .bind(meta.page_range.start as i64)
    .bind(meta.page_range.end as i64)
    .bind(meta.article_number.map(|n| n as i64))
    .bind(meta.sub_index.map(|n| n as i64))
    .bind(&meta.month)
    .bind(dates_json)
    .execute(executor)
    .await
    .map_err(unavailable)?;
    Ok(())
}

async fn insert_vector<'e, E>(executor: E, chunk: &Chunk, model: &str, vector: &[f32]) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO chunk_vectors (chunk_id, doc_id, model, dims, embedding)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(chunk_id) DO UPDATE SET
            doc_id = excluded.doc_id,
            model = excluded.model,
            dims = excluded.dims,
            embedding = excluded.embedding
        "#,
    )
    .bind(&chunk.id)
    .bind(&chunk.metadata.doc_id)
    .bind(model)
    .bind(vector.len() as i64)
    .bind(vec_to_blob(vector))
    .execute(executor)
    .await
    .map_err(unavailable)?;
    Ok(())
}

/// Bind the three nullable filter columns, each twice.
fn bind_filter<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    filter: &MetadataFilter,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    let doc_type = filter.doc_type.map(|d| d.as_str().to_string());
    let article = filter.article_number.map(|n| n as i64);
    let month = filter.month.clone();
    query
        .bind(doc_type.clone())
        .bind(doc_type)
        .bind(article)
        .bind(article)
        .bind(month.clone())
        .bind(month)
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn replace_document(&self, doc: &DocumentRecord, entries: &[IndexEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;

        sqlx::query("DELETE FROM chunk_vectors WHERE doc_id = ?")
            .bind(&doc.doc_id)
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?;

        sqlx::query("DELETE FROM chunks WHERE doc_id = ?")
            .bind(&doc.doc_id)
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?;

        for entry in entries {
            insert_chunk(&mut *tx, &entry.chunk).await?;
            insert_vector(&mut *tx, &entry.chunk, &self.model, &entry.vector).await?;
        }

        sqlx::query(
            r#"
            INSERT INTO documents (doc_id, doc_type, content_hash, page_count, ingested_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(doc_id) DO UPDATE SET
                doc_type = excluded.doc_type,
                content_hash = excluded.content_hash,
                page_count = excluded.page_count,
                ingested_at = excluded.ingested_at
            "#,
        )
        .bind(&doc.doc_id)
        .bind(doc.doc_type.as_str())
        .bind(&doc.content_hash)
        .bind(doc.page_count as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await
        .map_err(unavailable)?;

        tx.commit().await.map_err(unavailable)?;
        Ok(())
    }

    async fn insert(&self, chunk: &Chunk, vector: &[f32]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        insert_chunk(&mut *tx, chunk).await?;
        insert_vector(&mut *tx, chunk, &self.model, vector).await?;
        tx.commit().await.map_err(unavailable)?;
        Ok(())
    }

    async fn search(
        &self,
        query_vec: &[f32],
        top_n: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredChunk>> {
        let empty = MetadataFilter::default();
        let filter = filter.unwrap_or(&empty);
        let sql = format!(
            "SELECT {}, v.embedding FROM chunk_vectors v JOIN chunks c ON c.id = v.chunk_id \
             WHERE v.model = ? AND v.dims = ? AND {}",
            CHUNK_COLUMNS, FILTER_CLAUSE
        );
        let query = sqlx::query(&sql)
            .bind(&self.model)
            .bind(query_vec.len() as i64);
        let rows = bind_filter(query, filter)
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable)?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let chunk = row_to_chunk(row)?;
            if !filter.matches(&chunk.metadata) {
                continue;
            }
            let blob: Vec<u8> = row.get("embedding");
            let score = cosine_similarity(query_vec, &blob_to_vec(&blob));
            hits.push(ScoredChunk { chunk, score });
        }
        sort_scored(&mut hits);
        hits.truncate(top_n);
        Ok(hits)
    }

    async fn filter(&self, filter: &MetadataFilter, limit: usize) -> Result<Vec<Chunk>> {
        let sql = format!(
            "SELECT {} FROM chunks c WHERE {} ORDER BY c.doc_id, c.position_index",
            CHUNK_COLUMNS, FILTER_CLAUSE
        );
        let rows = bind_filter(sqlx::query(&sql), filter)
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable)?;

        let mut chunks = Vec::new();
        for row in &rows {
            let chunk = row_to_chunk(row)?;
            if filter.matches(&chunk.metadata) {
                chunks.push(chunk);
                if chunks.len() >= limit {
                    break;
                }
            }
        }
        Ok(chunks)
    }

    async fn chunk_count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(count as u64)
    }

    async fn document_hash(&self, doc_id: &str) -> Result<Option<String>> {
        sqlx::query_scalar("SELECT content_hash FROM documents WHERE doc_id = ?")
            .bind(doc_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)
    }

    async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        for table in ["chunk_vectors", "chunks", "documents"] {
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await
                .map_err(unavailable)?;
        }
        tx.commit().await.map_err(unavailable)?;
        Ok(())
    }
}
