//! Prompt composition.
//!
//! Picks an instruction template from the query intent, renders the ranked
//! chunks as a labelled context block, and trims the context from the
//! lowest-ranked end until the prompt fits the model's input budget.

use serde::Serialize;
use tracing::debug;

use crate::models::DocType;
use crate::query::{IntentKind, QueryIntent};
use crate::rerank::RankedChunk;

/// Rough characters-per-token ratio used to turn a token budget into a
/// character budget.
pub const CHARS_PER_TOKEN: usize = 4;

const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Character budget for a model accepting `max_input_tokens`.
pub fn char_budget(max_input_tokens: usize) -> usize {
    max_input_tokens.saturating_mul(CHARS_PER_TOKEN)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    Article,
    Comparison,
    Calendar,
    General,
    NoContext,
}

impl Template {
    pub fn for_intent(intent: &QueryIntent) -> Self {
        match intent.kind {
            IntentKind::Article if intent.is_comparison() => Self::Comparison,
            IntentKind::Article => Self::Article,
            IntentKind::Calendar => Self::Calendar,
            IntentKind::General if intent.filters.doc_type_hint == Some(DocType::Calendar) => {
                Self::Calendar
            }
            IntentKind::General => Self::General,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComposedPrompt {
    pub prompt: String,
    pub template: Template,
    /// Source labels of the chunks kept, deduplicated, in rank order.
    pub sources: Vec<String>,
    /// Number of ranked chunks that made it into the prompt.
    pub used_chunks: usize,
}

fn article_list(numbers: &[u32]) -> String {
    numbers
        .iter()
        .map(|n| format!("Pasal {}", n))
        .collect::<Vec<_>>()
        .join(", ")
}

fn instructions(template: Template, intent: &QueryIntent) -> String {
    match template {
        Template::Article => format!(
            "You are an academic assistant specialised in university regulations.\n\n\
             TASK:\nThe user asks about {}. You MUST:\n\
             1. Find the requested article in the CONTEXT.\n\
             2. Quote the article verbatim and completely, including every sub-section.\n\
             3. Only then explain it briefly.\n\
             4. Name the article number explicitly in your answer.",
            article_list(&intent.filters.article_numbers)
        ),
        Template::Comparison => format!(
            "You are an academic assistant specialised in university regulations.\n\n\
             TASK:\nThe user compares {}. You MUST:\n\
             1. Explain each article on its own, naming its number.\n\
             2. Compare their differences and similarities.\n\
             3. Keep the explanation structured.",
            article_list(&intent.filters.article_numbers)
        ),
        Template::Calendar => "You are an academic assistant specialised in the academic calendar.\n\n\
             TASK:\nThe user asks about academic schedules or events. You MUST:\n\
             1. Find the relevant dates and events in the CONTEXT.\n\
             2. List every event with its full date, in chronological order.\n\
             3. Do not invent dates that are not in the CONTEXT."
            .to_string(),
        Template::General => "You are an academic assistant specialised in university regulations.\n\n\
             TASK:\nAnswer the question using only the CONTEXT.\n\
             - Answer factually and concisely.\n\
             - Cite the relevant articles or sections when there are any.\n\
             - If the CONTEXT does not support a claim, say that it is unknown."
            .to_string(),
        Template::NoContext => "You are an academic assistant specialised in university regulations.\n\n\
             TASK:\nNo relevant documents were found for this question. Say that you could \
             not find the answer in the available documents and do not guess."
            .to_string(),
    }
}

fn render(template: Template, intent: &QueryIntent, question: &str, context: &str) -> String {
    let mut prompt = instructions(template, intent);
    if template != Template::NoContext {
        prompt.push_str("\n\nCONTEXT:\n");
        prompt.push_str(context);
    }
    prompt.push_str("\n\nQUESTION:\n");
    prompt.push_str(question.trim());
    prompt.push_str("\n\nAnswer in the language of the question.");
    prompt
}

fn context_entry(ranked: &RankedChunk) -> String {
    format!("[{}]\n{}", ranked.chunk.source_label(), ranked.chunk.content)
}

/// Compose the prompt for `question` within `max_chars` characters.
pub fn compose(
    question: &str,
    intent: &QueryIntent,
    ranked: &[RankedChunk],
    max_chars: usize,
) -> ComposedPrompt {
    let template = Template::for_intent(intent);
    let entries: Vec<String> = ranked.iter().map(context_entry).collect();

    let mut kept = entries.len();
    while kept > 0 {
        let context = entries[..kept].join(CONTEXT_SEPARATOR);
        let prompt = render(template, intent, question, &context);
        if prompt.chars().count() <= max_chars {
            if kept < entries.len() {
                debug!(kept, dropped = entries.len() - kept, "trimmed context to fit budget");
            }
            let mut sources: Vec<String> = Vec::new();
            for r in &ranked[..kept] {
                let label = r.chunk.source_label();
                if !sources.contains(&label) {
                    sources.push(label);
                }
            }
            return ComposedPrompt {
                prompt,
                template,
                sources,
                used_chunks: kept,
            };
        }
        kept -= 1;
    }

    debug!("no context fits, using the no-context template");
    ComposedPrompt {
        prompt: render(Template::NoContext, intent, question, ""),
        template: Template::NoContext,
        sources: Vec::new(),
        used_chunks: 0,
    }
}
