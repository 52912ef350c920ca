//! Question answering pipeline.
//!
//! `question → parse → retrieve → rerank → compose → generate`. The index,
//! embedder and language model are injected so the same service runs over
//! SQLite in the binary and over the in-memory index in tests.

use anyhow::Context;
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info, warn};

use academic_rag_core::embedding::Embedder;
use academic_rag_core::llm::LanguageModel;
use academic_rag_core::prompt::{char_budget, compose, ComposedPrompt};
use academic_rag_core::query::{QueryIntent, QueryParser};
use academic_rag_core::rerank::{rerank, RankedChunk, RerankParams};
use academic_rag_core::retrieve::{RetrievalParams, Retriever};
use academic_rag_core::store::VectorIndex;
use academic_rag_core::{Error, Result};

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::llm::create_language_model;
use crate::sqlite_store::SqliteIndex;

/// Answer returned by `POST /chat` and `arag ask`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatAnswer {
    pub answer: String,
    /// `"<doc_id> (Page P)"` labels of the context used, in rank order.
    pub sources: Vec<String>,
}

/// The ranked context for a question, before generation.
#[derive(Debug, Clone, Serialize)]
pub struct Ranked {
    pub intent: QueryIntent,
    pub chunks: Vec<RankedChunk>,
}

pub struct ChatService {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn LanguageModel>,
    parser: QueryParser,
    retrieval: RetrievalParams,
    rerank: RerankParams,
    max_input_tokens: usize,
}

impl ChatService {
    pub fn new(
        config: &Config,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LanguageModel>,
    ) -> Self {
        Self {
            index,
            embedder,
            llm,
            parser: QueryParser::new(config.retrieval.precedence),
            retrieval: config.retrieval.params(),
            rerank: config.rerank.params(),
            max_input_tokens: config.llm.max_input_tokens,
        }
    }

    pub fn parse(&self, question: &str) -> QueryIntent {
        self.parser.parse(question)
    }

    /// Parse, retrieve and rerank without calling the language model.
    pub async fn rank(&self, question: &str) -> Result<Ranked> {
        let question = validate(question)?;
        let intent = self.parser.parse(question);
        debug!(intent = ?intent.kind, filters = ?intent.filters, "parsed question");

        let retriever = Retriever::new(
            self.index.as_ref(),
            self.embedder.as_ref(),
            self.retrieval.clone(),
        );
        let candidates = retriever.retrieve(&intent, question).await?;
        let chunks = rerank(&candidates, &self.rerank);
        debug!(
            candidates = candidates.len(),
            kept = chunks.len(),
            "reranked"
        );
        Ok(Ranked { intent, chunks })
    }

    /// Run the full pipeline.
    ///
    /// A timed-out or transiently failed generation is retried once with a
    /// prompt composed at half the input budget. Rejected requests are not.
    pub async fn answer(&self, question: &str) -> Result<ChatAnswer> {
        let Ranked { intent, chunks } = self.rank(question).await?;
        let question = question.trim();

        let budget = char_budget(self.max_input_tokens);
        let composed = compose(question, &intent, &chunks, budget);
        info!(
            template = ?composed.template,
            used_chunks = composed.used_chunks,
            model = self.llm.model_name(),
            "generating answer"
        );

        match self.llm.generate(&composed.prompt).await {
            Ok(answer) => Ok(finish(answer, composed)),
            Err(e @ (Error::GenerationTimeout(_) | Error::Generation(_))) => {
                warn!(error = %e, "generation failed, retrying with a smaller prompt");
                let smaller = compose(question, &intent, &chunks, budget / 2);
                let answer = self.llm.generate(&smaller.prompt).await?;
                Ok(finish(answer, smaller))
            }
            Err(e) => Err(e),
        }
    }
}

fn validate(question: &str) -> Result<&str> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput("question must not be empty".to_string()));
    }
    Ok(trimmed)
}

fn finish(answer: String, composed: ComposedPrompt) -> ChatAnswer {
    ChatAnswer {
        answer,
        sources: composed.sources,
    }
}

/// Wire the service to the configured SQLite index, embedder and model.
///
/// Returns the pool so the caller can close it on shutdown.
pub async fn open_service(config: &Config) -> anyhow::Result<(ChatService, SqlitePool)> {
    let pool = db::connect(config)
        .await
        .with_context(|| format!("Failed to open index at {}", config.db.path.display()))?;
    let embedder = create_embedder(&config.embedding)?;
    let index = SqliteIndex::new(pool.clone(), embedder.model_name());
    let llm = create_language_model(&config.llm)?;
    Ok((
        ChatService::new(config, Arc::new(index), embedder, llm),
        pool,
    ))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use academic_rag_core::embedding::HashEmbedder;
    use academic_rag_core::models::SourceDocument;
    use academic_rag_core::store::memory::InMemoryIndex;
    use academic_rag_core::store::{DocumentRecord, IndexEntry};
    use academic_rag_core::strategy::Dispatcher;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays scripted outcomes and records every prompt it receives.
    pub(crate) struct ScriptedModel {
        outcomes: Mutex<Vec<Result<String>>>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        pub(crate) fn new(mut outcomes: Vec<Result<String>>) -> Self {
            outcomes.reverse();
            Self {
                outcomes: Mutex::new(outcomes),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.outcomes
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok("default".to_string()))
        }
    }

    const REGULATION: &str = "PERATURAN REKTOR TENTANG PENYELENGGARAAN PENDIDIKAN\n\n\
        Pasal 1\nDalam peraturan ini yang dimaksud dengan mahasiswa adalah peserta didik.\n\n\
        Pasal 2\nMahasiswa wajib melakukan registrasi setiap semester.\n\n\
        Pasal 3\nCuti akademik diberikan paling lama dua semester.";

    const CALENDAR: &str = "KALENDER AKADEMIK 2024\nTanggal\tKegiatan\n\
        5 Februari 2024\tAwal perkuliahan semester genap\n\
        10 - 15 Februari 2024\tPengisian KRS\n\
        1 Maret 2024\tBatas pembayaran UKT";

    pub(crate) async fn seeded_index() -> Arc<InMemoryIndex> {
        let index = Arc::new(InMemoryIndex::new());
        let embedder = HashEmbedder::new(64);
        let dispatcher = Dispatcher::default();
        for doc in [
            SourceDocument::new("peraturan-akademik.pdf", vec![REGULATION.to_string()]),
            SourceDocument::new("kalender-akademik.pdf", vec![CALENDAR.to_string()]),
        ] {
            let (doc_type, chunks) = dispatcher.chunk_document(&doc);
            let entries: Vec<IndexEntry> = chunks
                .into_iter()
                .map(|chunk| {
                    let vector = embedder.embed_text(&chunk.content);
                    IndexEntry { chunk, vector }
                })
                .collect();
            let record = DocumentRecord {
                doc_id: doc.doc_id.clone(),
                doc_type,
                content_hash: doc.content_hash(),
                page_count: doc.pages.len() as u32,
            };
            index.replace_document(&record, &entries).await.unwrap();
        }
        index
    }

    pub(crate) async fn service(model: Arc<ScriptedModel>) -> ChatService {
        ChatService::new(
            &Config::default_for_tests(),
            seeded_index().await,
            Arc::new(HashEmbedder::new(64)),
            model,
        )
    }

    #[tokio::test]
    async fn test_article_question_cites_article() {
        let model = Arc::new(ScriptedModel::new(vec![Ok("Pasal 2 mengatur registrasi.".into())]));
        let chat = service(model.clone()).await;
        let answer = chat.answer("Apa isi Pasal 2?").await.unwrap();
        assert_eq!(answer.answer, "Pasal 2 mengatur registrasi.");
        assert_eq!(answer.sources[0], "peraturan-akademik.pdf (Page 1)");

        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Mahasiswa wajib melakukan registrasi"));
    }

    #[tokio::test]
    async fn test_calendar_question_uses_calendar_chunks() {
        let model = Arc::new(ScriptedModel::new(vec![Ok("10 - 15 Februari 2024".into())]));
        let chat = service(model.clone()).await;
        let ranked = chat.rank("Kapan pengisian KRS bulan Februari?").await.unwrap();
        assert!(ranked.chunks[0].chunk.content.contains("Pengisian KRS"));

        let answer = chat.answer("Kapan pengisian KRS bulan Februari?").await.unwrap();
        assert_eq!(answer.sources, vec!["kalender-akademik.pdf (Page 1)"]);
    }

    #[tokio::test]
    async fn test_timeout_retries_with_smaller_prompt() {
        let model = Arc::new(ScriptedModel::new(vec![
            Err(Error::GenerationTimeout(120)),
            Ok("jawaban".into()),
        ]));
        let chat = service(model.clone()).await;
        let answer = chat.answer("Berapa lama cuti akademik?").await.unwrap();
        assert_eq!(answer.answer, "jawaban");

        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        let budget = char_budget(Config::default_for_tests().llm.max_input_tokens);
        assert!(prompts[1].chars().count() <= budget / 2);
    }

    #[tokio::test]
    async fn test_rejected_generation_is_not_retried() {
        let model = Arc::new(ScriptedModel::new(vec![
            Err(Error::GenerationRejected("HTTP 404: model not found".into())),
            Ok("tidak terpakai".into()),
        ]));
        let chat = service(model.clone()).await;
        let err = chat.answer("Berapa lama cuti akademik?").await.unwrap_err();
        assert!(matches!(err, Error::GenerationRejected(_)));
        assert_eq!(model.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let model = Arc::new(ScriptedModel::new(vec![
            Err(Error::Generation("HTTP 503: loading".into())),
            Ok("jawaban".into()),
        ]));
        let chat = service(model.clone()).await;
        let answer = chat.answer("Berapa lama cuti akademik?").await.unwrap();
        assert_eq!(answer.answer, "jawaban");
        assert_eq!(model.prompts.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_repeated_timeout_surfaces() {
        let model = Arc::new(ScriptedModel::new(vec![
            Err(Error::GenerationTimeout(120)),
            Err(Error::GenerationTimeout(120)),
        ]));
        let chat = service(model.clone()).await;
        let err = chat.answer("Berapa lama cuti akademik?").await.unwrap_err();
        assert!(matches!(err, Error::GenerationTimeout(120)));
        assert_eq!(model.prompts.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_question_rejected() {
        let model = Arc::new(ScriptedModel::new(Vec::new()));
        let chat = service(model.clone()).await;
        let err = chat.answer("   ").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(model.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_index_uses_no_context_prompt() {
        let model = Arc::new(ScriptedModel::new(vec![Ok("tidak ditemukan".into())]));
        let chat = ChatService::new(
            &Config::default_for_tests(),
            Arc::new(InMemoryIndex::new()),
            Arc::new(HashEmbedder::new(64)),
            model.clone(),
        );
        let answer = chat.answer("Apa isi Pasal 99?").await.unwrap();
        assert!(answer.sources.is_empty());
        assert!(model.prompts.lock().unwrap()[0].contains("No relevant documents"));
    }
}
