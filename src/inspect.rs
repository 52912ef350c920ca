//! `arag classify`, `arag parse`, `arag retrieve` and `arag ask`.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;

use academic_rag_core::query::QueryParser;
use academic_rag_core::strategy::Dispatcher;

use crate::chat::open_service;
use crate::config::Config;
use crate::extract::load_document;

const EXCERPT_CHARS: usize = 240;

/// Detect a single file's document family and show how it would be chunked.
pub fn run_classify(config: &Config, path: &Path) -> Result<()> {
    let doc_id = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .with_context(|| format!("Not a file: {}", path.display()))?;
    let doc = load_document(path, &doc_id)?;

    let dispatcher = Dispatcher::new(config.chunking.params());
    let (doc_type, chunks) = dispatcher.chunk_document(&doc);

    let mut by_kind: BTreeMap<&str, usize> = BTreeMap::new();
    for chunk in &chunks {
        *by_kind.entry(chunk.metadata.kind.as_str()).or_default() += 1;
    }

    println!("document: {}", doc.doc_id);
    println!("pages:    {}", doc.pages.len());
    println!("type:     {}", doc_type.as_str());
    println!("chunks:   {}", chunks.len());
    for (kind, count) in &by_kind {
        println!("  {}: {}", kind, count);
    }
    Ok(())
}

/// Print the parsed intent of `question` as JSON.
pub fn run_parse(config: &Config, question: &str) -> Result<()> {
    let intent = QueryParser::new(config.retrieval.precedence).parse(question);
    println!("{}", serde_json::to_string_pretty(&intent)?);
    Ok(())
}

/// Parse, retrieve and rerank without generation.
pub async fn run_retrieve(config: &Config, question: &str) -> Result<()> {
    let (chat, pool) = open_service(config).await?;
    let ranked = chat.rank(question).await?;

    println!("intent: {}", serde_json::to_string(&ranked.intent)?);
    if ranked.chunks.is_empty() {
        println!("No results.");
        pool.close().await;
        return Ok(());
    }

    for (i, r) in ranked.chunks.iter().enumerate() {
        let meta = &r.chunk.metadata;
        println!(
            "{}. [{:.2}] {}",
            i + 1,
            r.combined_score,
            r.chunk.source_label()
        );
        println!(
            "    kind: {}{}",
            meta.kind.as_str(),
            if r.matched_filter { " (filter match)" } else { "" }
        );
        if let Some(n) = meta.article_number {
            println!("    article: {}", n);
        }
        if let Some(ref month) = meta.month {
            println!("    month: {}", month);
        }
        println!("    excerpt: \"{}\"", excerpt(&r.chunk.content));
        println!();
    }

    pool.close().await;
    Ok(())
}

/// Answer `question` with the full pipeline.
pub async fn run_ask(config: &Config, question: &str) -> Result<()> {
    let (chat, pool) = open_service(config).await?;
    let answer = chat.answer(question).await?;

    println!("{}", answer.answer);
    if !answer.sources.is_empty() {
        println!();
        println!("Sources:");
        for source in &answer.sources {
            println!("  - {}", source);
        }
    }

    pool.close().await;
    Ok(())
}

fn excerpt(content: &str) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= EXCERPT_CHARS {
        flat
    } else {
        let cut: String = flat.chars().take(EXCERPT_CHARS).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excerpt_flattens_and_truncates() {
        assert_eq!(excerpt("Pasal 1\n\n  Ketentuan"), "Pasal 1 Ketentuan");
        let long = "kata ".repeat(100);
        let cut = excerpt(&long);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), EXCERPT_CHARS + 3);
    }
}
