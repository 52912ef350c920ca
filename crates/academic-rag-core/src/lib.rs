//! # Academic RAG Core
//!
//! Shared, runtime-agnostic logic for question answering over academic
//! regulations and calendars: document-aware chunking, query intent
//! parsing, hybrid retrieval, reranking and prompt composition.
//!
//! This crate contains no tokio, sqlx, filesystem or network I/O. The
//! embedding model, vector index and language model are injected through
//! the [`embedding::Embedder`], [`store::VectorIndex`] and
//! [`llm::LanguageModel`] traits.
//!
//! Ingestion: [`strategy::Dispatcher`] (with [`table`], [`article`],
//! [`calendar`] and [`chunk`]) → [`store::VectorIndex`].
//!
//! Query: [`query`] → [`retrieve`] → [`rerank`] → [`prompt`].

pub mod article;
pub mod calendar;
pub mod chunk;
pub mod dates;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod models;
pub mod prompt;
pub mod query;
pub mod rerank;
pub mod retrieve;
pub mod store;
pub mod strategy;
pub mod table;

pub use error::{Error, Result};
