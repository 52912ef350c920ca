//! Batch ingestion: scan → extract → classify/chunk → embed → index.
//!
//! Extraction and chunking are CPU-bound and run on blocking worker tasks,
//! at most `ingest.workers` at a time. Their results flow to a single
//! writer that embeds each document's chunks and replaces the document in
//! the index. A lock file next to the database keeps two ingestion runs
//! from writing the same index at once.
//!
//! Documents whose ingest hash matches the indexed one are skipped unless
//! `--full` is given, which clears the index first. The ingest hash covers
//! the extracted pages, the embedding model and dimensions, and the chunking
//! limits, so changing any of them re-ingests every document. A failing document is
//! recorded in the summary and never aborts the batch.

use anyhow::{anyhow, bail, Context, Result};
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use academic_rag_core::embedding::Embedder;
use academic_rag_core::models::{Chunk, DocType};
use academic_rag_core::store::{DocumentRecord, IndexEntry, VectorIndex};
use academic_rag_core::strategy::Dispatcher;

use crate::config::Config;
use crate::db;
use crate::embedding::{create_embedder, embed_batched};
use crate::extract::{load_document, scan_documents, DocumentFile};
use crate::sqlite_store::SqliteIndex;

/// Command-line switches for one ingestion run.
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Overrides `documents.dir`.
    pub dir: Option<PathBuf>,
    pub full: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFailure {
    pub doc_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub scanned: usize,
    pub ingested: usize,
    pub unchanged: usize,
    pub chunks_written: usize,
    /// Ingested documents per detected family.
    pub by_type: BTreeMap<&'static str, usize>,
    pub failures: Vec<DocumentFailure>,
}

/// A document after extraction and chunking, ready for the writer.
struct Prepared {
    record: DocumentRecord,
    chunks: Vec<Chunk>,
}

/// Exclusive lock on an index, held for the whole batch.
///
/// The lock file is created with `create_new` so a second run fails fast;
/// it is removed when the guard drops.
pub struct IngestLock {
    path: PathBuf,
}

impl IngestLock {
    pub fn acquire(db_path: &Path) -> Result<Self> {
        let mut name = db_path.as_os_str().to_owned();
        name.push(".lock");
        let path = PathBuf::from(name);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(_) => Ok(Self { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => bail!(
                "Another ingestion is running (lock file {} exists)",
                path.display()
            ),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to create lock file {}", path.display()))
            }
        }
    }
}

impl Drop for IngestLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove ingest lock");
        }
    }
}

/// `arag ingest`: run a batch against the configured SQLite index and print
/// the summary.
pub async fn run_ingest(config: &Config, opts: &IngestOptions) -> Result<IngestSummary> {
    let dir = opts.dir.clone().unwrap_or_else(|| config.documents.dir.clone());
    let files = scan_documents(
        &dir,
        &config.documents.include_globs,
        &config.documents.exclude_globs,
    )?;
    info!(dir = %dir.display(), files = files.len(), "scanned documents");

    if opts.dry_run {
        return dry_run(config, &dir, files).await;
    }

    let _lock = IngestLock::acquire(&config.db.path)?;
    let pool = db::connect(config).await?;
    let embedder = create_embedder(&config.embedding)?;
    let index = SqliteIndex::new(pool.clone(), embedder.model_name());

    if opts.full {
        info!("full ingest: clearing index");
        index.clear().await?;
    }

    let summary = ingest_files(config, &index, embedder.as_ref(), files).await?;
    let total = index.chunk_count().await?;

    println!("ingest {}", dir.display());
    print_summary(&summary);
    println!("  chunks in index: {}", total);
    println!("ok");

    pool.close().await;
    Ok(summary)
}

async fn dry_run(config: &Config, dir: &Path, files: Vec<DocumentFile>) -> Result<IngestSummary> {
    let mut summary = IngestSummary {
        scanned: files.len(),
        ..IngestSummary::default()
    };
    // Nothing is compared against the index, so the hash settings are irrelevant.
    let mut prepared = std::pin::pin!(prepare_all(config, "", files));
    while let Some((doc_id, result)) = prepared.next().await {
        match result {
            Ok(p) => {
                summary.ingested += 1;
                summary.chunks_written += p.chunks.len();
                *summary.by_type.entry(p.record.doc_type.as_str()).or_default() += 1;
            }
            Err(e) => summary.failures.push(DocumentFailure {
                doc_id,
                error: format!("{:#}", e),
            }),
        }
    }
    summary.failures.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));

    println!("ingest {} (dry-run)", dir.display());
    print_summary(&summary);
    Ok(summary)
}

/// Ingest `files` into `index`. The caller holds the [`IngestLock`].
pub async fn ingest_files(
    config: &Config,
    index: &dyn VectorIndex,
    embedder: &dyn Embedder,
    files: Vec<DocumentFile>,
) -> Result<IngestSummary> {
    let mut summary = IngestSummary {
        scanned: files.len(),
        ..IngestSummary::default()
    };

    let settings = ingest_settings(config, embedder);
    let mut prepared = std::pin::pin!(prepare_all(config, &settings, files));
    while let Some((doc_id, result)) = prepared.next().await {
        let outcome = match result {
            Ok(p) => write_document(index, embedder, config.embedding.batch_size, p).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(Written::Unchanged) => {
                debug!(doc_id = %doc_id, "unchanged, skipped");
                summary.unchanged += 1;
            }
            Ok(Written::Replaced { doc_type, chunks }) => {
                info!(doc_id = %doc_id, doc_type = doc_type.as_str(), chunks, "indexed document");
                summary.ingested += 1;
                summary.chunks_written += chunks;
                *summary.by_type.entry(doc_type.as_str()).or_default() += 1;
            }
            Err(e) => {
                warn!(doc_id = %doc_id, error = %format!("{:#}", e), "document failed");
                summary.failures.push(DocumentFailure {
                    doc_id,
                    error: format!("{:#}", e),
                });
            }
        }
    }

    summary.failures.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));
    Ok(summary)
}

/// Everything besides the pages that shapes a document's chunks and vectors.
fn ingest_settings(config: &Config, embedder: &dyn Embedder) -> String {
    let chunking = &config.chunking;
    format!(
        "model={};dims={};max_chunk_size={};overlap={};sample_chars={}",
        embedder.model_name(),
        embedder.dims(),
        chunking.max_chunk_size,
        chunking.overlap,
        chunking.sample_chars
    )
}

/// Extract and chunk every file on blocking workers, `ingest.workers` at a time.
fn prepare_all(
    config: &Config,
    settings: &str,
    files: Vec<DocumentFile>,
) -> impl futures::Stream<Item = (String, Result<Prepared>)> {
    let dispatcher = Arc::new(Dispatcher::new(config.chunking.params()));
    let settings: Arc<str> = Arc::from(settings);
    let workers = config.ingest.workers.max(1);

    stream::iter(files)
        .map(move |file| {
            let dispatcher = Arc::clone(&dispatcher);
            let settings = Arc::clone(&settings);
            async move {
                let doc_id = file.doc_id.clone();
                let result =
                    tokio::task::spawn_blocking(move || prepare(&file, &dispatcher, &settings))
                    .await
                    .map_err(|e| anyhow!("chunking worker failed: {}", e))
                    .and_then(|r| r);
                (doc_id, result)
            }
        })
        .buffer_unordered(workers)
}

fn prepare(file: &DocumentFile, dispatcher: &Dispatcher, settings: &str) -> Result<Prepared> {
    let doc = load_document(&file.path, &file.doc_id)?;
    if doc.is_blank() {
        bail!("no extractable text");
    }
    let (doc_type, chunks) = dispatcher.chunk_document(&doc);
    Ok(Prepared {
        record: DocumentRecord {
            doc_id: doc.doc_id.clone(),
            doc_type,
            content_hash: doc.ingest_hash(settings),
            page_count: doc.pages.len() as u32,
        },
        chunks,
    })
}

enum Written {
    Unchanged,
    Replaced { doc_type: DocType, chunks: usize },
}

async fn write_document(
    index: &dyn VectorIndex,
    embedder: &dyn Embedder,
    batch_size: usize,
    prepared: Prepared,
) -> Result<Written> {
    let Prepared { record, chunks } = prepared;

    if index.document_hash(&record.doc_id).await?.as_deref() == Some(record.content_hash.as_str())
    {
        return Ok(Written::Unchanged);
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
    let vectors = embed_batched(embedder, &texts, batch_size).await?;
    let entries: Vec<IndexEntry> = chunks
        .into_iter()
        .zip(vectors)
        .map(|(chunk, vector)| IndexEntry { chunk, vector })
        .collect();

    index.replace_document(&record, &entries).await?;
    Ok(Written::Replaced {
        doc_type: record.doc_type,
        chunks: entries.len(),
    })
}

fn print_summary(summary: &IngestSummary) {
    println!("  documents scanned: {}", summary.scanned);
    println!("  documents ingested: {}", summary.ingested);
    for (doc_type, count) in &summary.by_type {
        println!("    {}: {}", doc_type, count);
    }
    println!("  documents unchanged: {}", summary.unchanged);
    println!("  chunks written: {}", summary.chunks_written);
    println!("  failures: {}", summary.failures.len());
    for failure in &summary.failures {
        println!("    {}: {}", failure.doc_id, failure.error);
    }
}
