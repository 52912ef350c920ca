//! # Academic RAG
//!
//! Question answering over university regulations and academic calendars.
//!
//! Documents are classified (regulation, calendar or generic), chunked
//! along their natural structure (articles, calendar table rows grouped by
//! month, or overlapping text windows), embedded and stored in SQLite.
//! Questions are parsed into an intent, answered from exact metadata
//! filters where possible and semantic search otherwise, reranked, and
//! passed to a language model inside an intent-specific prompt.
//!
//! The domain logic lives in the runtime-agnostic `academic-rag-core`
//! crate; this crate supplies the I/O around it.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────────┐   ┌──────────┐
//! │ documents/ │──▶│ classify + chunk │──▶│  SQLite   │
//! │ PDF / text │   │  embed (batched) │   │ chunks+vec│
//! └────────────┘   └──────────────────┘   └────┬─────┘
//!                                              │
//!                 parse → retrieve → rerank → compose → LLM
//!                          │                        │
//!                     ┌──────────┐           ┌──────────┐
//!                     │   CLI    │           │   HTTP   │
//!                     │  (arag)  │           │ /chat    │
//!                     └──────────┘           └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | SQLite connection pool |
//! | [`migrate`] | Index schema |
//! | [`sqlite_store`] | SQLite [`VectorIndex`](academic_rag_core::store::VectorIndex) |
//! | [`extract`] | Document discovery and page extraction |
//! | [`embedding`] | Embedding providers |
//! | [`llm`] | Language model clients |
//! | [`ingest`] | Batch ingestion |
//! | [`chat`] | Question answering pipeline |
//! | [`inspect`] | Classify / parse / retrieve / ask commands |
//! | [`server`] | HTTP API |

pub mod chat;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod ingest;
pub mod inspect;
pub mod llm;
pub mod migrate;
pub mod server;
pub mod sqlite_store;
