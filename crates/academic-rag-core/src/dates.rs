//! Month names and calendar date spans.
//!
//! Calendar documents and questions name months in Indonesian, sometimes in
//! English. Every month is normalised to its canonical Indonesian spelling
//! so metadata filters compare equal regardless of the source language.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical month names with accepted spellings (lowercase). English
/// "may" is not accepted.
const MONTHS: [(&str, &[&str]); 12] = [
    ("Januari", &["januari", "january"]),
    ("Februari", &["februari", "pebruari", "february"]),
    ("Maret", &["maret", "march"]),
    ("April", &["april"]),
    ("Mei", &["mei"]),
    ("Juni", &["juni", "june"]),
    ("Juli", &["juli", "july"]),
    ("Agustus", &["agustus", "august"]),
    ("September", &["september"]),
    ("Oktober", &["oktober", "october"]),
    ("November", &["november", "nopember"]),
    ("Desember", &["desember", "december"]),
];

fn month_alternation() -> String {
    let mut names: Vec<&str> = MONTHS.iter().flat_map(|(_, a)| a.iter().copied()).collect();
    // Longest first so "pebruari" never loses to a shorter prefix.
    names.sort_by_key(|n| std::cmp::Reverse(n.len()));
    names.join("|")
}

lazy_static! {
    static ref MONTH_RE: Regex =
        Regex::new(&format!(r"(?i)\b({})\b", month_alternation())).unwrap();
    static ref DATE_TOKEN_RE: Regex =
        Regex::new(&format!(r"(?i)\b(\d{{1,2}})\b|\b({})\b", month_alternation())).unwrap();
    static ref DAY_MONTH_RE: Regex =
        Regex::new(&format!(r"(?i)\b(\d{{1,2}})\s+({})\b", month_alternation())).unwrap();
    static ref FULL_DATE_RE: Regex =
        Regex::new(&format!(r"(?i)\b\d{{1,2}}\s+({})\s+\d{{4}}\b", month_alternation())).unwrap();
    static ref SECTION_RE: Regex = Regex::new(&format!(
        r"(?i)^\s*(?:bulan\s+)?({})(?:\s+\d{{4}})?\s*:?\s*$",
        month_alternation()
    ))
    .unwrap();
}

/// Canonical spelling for any accepted month name (case-insensitive).
pub fn canonical_month(name: &str) -> Option<&'static str> {
    month_index(name).map(|i| MONTHS[i].0)
}

/// Zero-based month index for any accepted month name.
pub fn month_index(name: &str) -> Option<usize> {
    let lower = name.trim().to_lowercase();
    MONTHS
        .iter()
        .position(|(_, aliases)| aliases.contains(&lower.as_str()))
}

/// First month mentioned in `text`, canonicalised.
pub fn find_month(text: &str) -> Option<&'static str> {
    MONTH_RE
        .find(text)
        .and_then(|m| canonical_month(m.as_str()))
}

/// First `<day> <month>` pattern in `text`.
pub fn find_day_month(text: &str) -> Option<DayMonth> {
    DAY_MONTH_RE.captures_iter(text).find_map(|caps| {
        let day: u32 = caps[1].parse().ok()?;
        let month = canonical_month(&caps[2])?;
        DayMonth::new(day, month)
    })
}

/// Number of full `<day> <month> <year>` dates in `text`.
pub fn count_full_dates(text: &str) -> usize {
    FULL_DATE_RE.find_iter(text).count()
}

/// If `line` is a calendar section heading (`FEBRUARI 2024`,
/// `Bulan Maret`), the month it introduces.
pub fn section_month(line: &str) -> Option<&'static str> {
    SECTION_RE
        .captures(line)
        .and_then(|caps| canonical_month(&caps[1]))
}

/// A day within a named month, e.g. `12 Februari`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayMonth {
    pub day: u32,
    pub month: String,
}

impl DayMonth {
    pub fn new(day: u32, month: &str) -> Option<Self> {
        if !(1..=31).contains(&day) {
            return None;
        }
        Some(Self {
            day,
            month: canonical_month(month)?.to_string(),
        })
    }

    fn ordinal(&self) -> Option<u32> {
        month_index(&self.month).map(|m| m as u32 * 32 + self.day)
    }
}

impl fmt::Display for DayMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.day, self.month)
    }
}

/// The days covered by a calendar date cell such as `10 - 15 Februari 2024`
/// or `28 Januari - 3 Februari 2024`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateSpan {
    start: u32,
    end: u32,
}

impl DateSpan {
    /// Parse the first and last day named in a date cell. Days without
    /// their own month take the next month mentioned (or the last one).
    pub fn parse(text: &str) -> Option<Self> {
        let mut points: Vec<(u32, Option<usize>)> = Vec::new();
        let mut pending = 0usize;
        for caps in DATE_TOKEN_RE.captures_iter(text) {
            if let Some(day) = caps.get(1) {
                let day: u32 = day.as_str().parse().ok()?;
                if (1..=31).contains(&day) {
                    points.push((day, None));
                    pending += 1;
                }
            } else if let Some(month) = caps.get(2) {
                let idx = month_index(month.as_str())?;
                let len = points.len();
                for point in &mut points[len - pending..] {
                    point.1 = Some(idx);
                }
                pending = 0;
            }
        }
        let last_month = points.iter().rev().find_map(|p| p.1)?;
        let ordinals: Vec<u32> = points
            .iter()
            .map(|(day, month)| month.unwrap_or(last_month) as u32 * 32 + day)
            .collect();
        Some(Self {
            start: *ordinals.first()?,
            end: *ordinals.last()?,
        })
    }

    /// Whether `date` falls inside the span (spans may wrap the year end).
    pub fn contains(&self, date: &DayMonth) -> bool {
        let Some(q) = date.ordinal() else {
            return false;
        };
        if self.start <= self.end {
            self.start <= q && q <= self.end
        } else {
            q >= self.start || q <= self.end
        }
    }
}

/// Whether any of the date cells covers `date`.
pub fn any_date_covers(dates: &[String], date: &DayMonth) -> bool {
    dates
        .iter()
        .filter_map(|d| DateSpan::parse(d))
        .any(|span| span.contains(date))
}
