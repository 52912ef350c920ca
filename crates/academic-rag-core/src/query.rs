//! Query intent parsing.
//!
//! A question is classified by an ordered list of rules; the first rule that
//! recognises the question decides the intent and extracts its filters.
//! The general rule always matches, so parsing never fails.
//!
//! ```rust
//! use academic_rag_core::query::{parse_query, IntentKind};
//!
//! let intent = parse_query("Sebutkan pasal 13 peraturan akademik ITB");
//! assert_eq!(intent.kind, IntentKind::Article);
//! assert_eq!(intent.filters.article_numbers, vec![13]);
//! ```

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::dates::{canonical_month, find_day_month, find_month, DayMonth};
use crate::models::DocType;

lazy_static! {
    static ref ARTICLE_RE: Regex = Regex::new(
        r"(?i)\b(?:pasal|article)\s+\d+\b(?:\s*(?:,|&|\bdan\b|\band\b|\bserta\b|\batau\b|\bor\b)\s*\d+\b)*"
    )
    .unwrap();
    static ref NUMBER_RE: Regex = Regex::new(r"\d+").unwrap();
}

/// Words that suggest the answer lives in a calendar.
const CALENDAR_VOCABULARY: &[&str] = &[
    "jadwal", "kapan", "libur", "ujian", "kalender", "tanggal", "acara", "kegiatan", "event",
    "schedule", "when", "holiday",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IntentKind {
    Article,
    Calendar,
    General,
}

/// Metadata constraints extracted from the question.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryFilters {
    /// Requested article numbers, first-mention order, no duplicates.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub article_numbers: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DayMonth>,
    /// Preferred document family for semantic search.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_type_hint: Option<DocType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryIntent {
    #[serde(rename = "type")]
    pub kind: IntentKind,
    pub filters: QueryFilters,
}

impl QueryIntent {
    pub fn general() -> Self {
        Self {
            kind: IntentKind::General,
            filters: QueryFilters::default(),
        }
    }

    /// Whether the question compares several articles.
    pub fn is_comparison(&self) -> bool {
        self.kind == IntentKind::Article && self.filters.article_numbers.len() > 1
    }
}

/// Which specific intent wins when a question matches both, e.g.
/// "pasal 12 tentang ujian bulan Februari".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrecedencePolicy {
    #[default]
    ArticleFirst,
    CalendarFirst,
}

type RuleFn = fn(&str) -> Option<QueryIntent>;

#[derive(Clone, Copy)]
struct Rule {
    name: &'static str,
    apply: RuleFn,
}

const ARTICLE_RULE: Rule = Rule {
    name: "article",
    apply: article_rule,
};
const CALENDAR_RULE: Rule = Rule {
    name: "calendar",
    apply: calendar_rule,
};
const GENERAL_RULE: Rule = Rule {
    name: "general",
    apply: general_rule,
};

/// Ordered rule list, configured once and reused for every request.
#[derive(Clone)]
pub struct QueryParser {
    rules: Vec<Rule>,
}

impl Default for QueryParser {
    fn default() -> Self {
        Self::new(PrecedencePolicy::default())
    }
}

impl QueryParser {
    pub fn new(policy: PrecedencePolicy) -> Self {
        let rules = match policy {
            PrecedencePolicy::ArticleFirst => vec![ARTICLE_RULE, CALENDAR_RULE, GENERAL_RULE],
            PrecedencePolicy::CalendarFirst => vec![CALENDAR_RULE, ARTICLE_RULE, GENERAL_RULE],
        };
        Self { rules }
    }

    pub fn parse(&self, text: &str) -> QueryIntent {
        for rule in &self.rules {
            if let Some(intent) = (rule.apply)(text) {
                tracing::debug!(rule = rule.name, "query rule matched");
                return intent;
            }
        }
        QueryIntent::general()
    }
}

/// Parse with the default precedence.
pub fn parse_query(text: &str) -> QueryIntent {
    QueryParser::default().parse(text)
}

fn article_rule(text: &str) -> Option<QueryIntent> {
    let mut numbers: Vec<u32> = Vec::new();
    for m in ARTICLE_RE.find_iter(text) {
        for (i, n) in NUMBER_RE.find_iter(m.as_str()).enumerate() {
            // "pasal 13 dan 14 Februari": the list item is a date.
            if i > 0 && followed_by_month(&text[m.start() + n.end()..]) {
                continue;
            }
            if let Ok(n) = n.as_str().parse::<u32>() {
                if !numbers.contains(&n) {
                    numbers.push(n);
                }
            }
        }
    }
    if numbers.is_empty() {
        return None;
    }
    Some(QueryIntent {
        kind: IntentKind::Article,
        filters: QueryFilters {
            article_numbers: numbers,
            ..QueryFilters::default()
        },
    })
}

fn followed_by_month(rest: &str) -> bool {
    rest.split(|c: char| !c.is_alphanumeric())
        .find(|w| !w.is_empty())
        .is_some_and(|w| canonical_month(w).is_some())
}

fn calendar_rule(text: &str) -> Option<QueryIntent> {
    let date = find_day_month(text);
    let month = match &date {
        Some(d) => d.month.clone(),
        None => find_month(text)?.to_string(),
    };
    Some(QueryIntent {
        kind: IntentKind::Calendar,
        filters: QueryFilters {
            month: Some(month),
            date,
            doc_type_hint: Some(DocType::Calendar),
            ..QueryFilters::default()
        },
    })
}

fn general_rule(text: &str) -> Option<QueryIntent> {
    let lower = text.to_lowercase();
    let calendar_words = lower
        .split(|c: char| !c.is_alphanumeric())
        .any(|w| CALENDAR_VOCABULARY.contains(&w));
    let mut intent = QueryIntent::general();
    if calendar_words {
        intent.filters.doc_type_hint = Some(DocType::Calendar);
    }
    Some(intent)
}
