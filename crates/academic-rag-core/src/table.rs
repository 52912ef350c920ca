//! Table extraction for calendar pages.
//!
//! PDF text extraction flattens calendar tables into lines whose columns are
//! separated by tabs, pipes or runs of spaces. [`TableExtractor`] finds the
//! header row, maps the date and event columns, and turns each following
//! line into a [`TableRow`]. Lines it cannot interpret are handed back as
//! free text so nothing is lost.
//!
//! The extractor is stateful across the pages of one document: a table
//! whose header is on page 2 keeps producing rows on page 3, and a month
//! section heading carries over the page break.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::dates::{find_month, section_month};
use crate::error::{Error, Result};

const DATE_KEYWORDS: &[&str] = &["tanggal", "date", "waktu", "periode", "jadwal"];
const EVENT_KEYWORDS: &[&str] = &["kegiatan", "acara", "event", "agenda", "keterangan", "uraian"];

lazy_static! {
    static ref CELL_SPLIT_RE: Regex = Regex::new(r"\s*[\t|]\s*|\s{2,}").unwrap();
    static ref RULE_RE: Regex = Regex::new(r"^[\s|:+=-]+$").unwrap();
    static ref DIGIT_RE: Regex = Regex::new(r"\d").unwrap();
}

/// One calendar row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRow {
    pub date_text: String,
    pub event_text: String,
    /// Canonical month the row belongs to.
    pub month: String,
    /// 1-based page the row was found on.
    pub page: u32,
}

/// Rows found on one page plus every line that was not part of a row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageTable {
    pub rows: Vec<TableRow>,
    pub free_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    date_col: usize,
    event_col: usize,
}

/// Split a line into cells at tabs, pipes or runs of two or more spaces.
///
/// A leading or trailing pipe does not create an empty edge cell.
pub fn split_cells(line: &str) -> Vec<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    let mut cells: Vec<String> = CELL_SPLIT_RE
        .split(trimmed)
        .map(|c| c.trim().to_string())
        .collect();
    if trimmed.starts_with('|') && cells.first().is_some_and(|c| c.is_empty()) {
        cells.remove(0);
    }
    if trimmed.ends_with('|') && cells.last().is_some_and(|c| c.is_empty()) {
        cells.pop();
    }
    cells
}

fn has_keyword(cell: &str, keywords: &[&str]) -> bool {
    cell.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| keywords.contains(&word))
}

fn looks_like_date(cell: &str) -> bool {
    DIGIT_RE.is_match(cell) || find_month(cell).is_some()
}

/// Stateful, per-document table extractor.
#[derive(Debug, Default)]
pub struct TableExtractor {
    header: Option<Header>,
    section_month: Option<&'static str>,
}

impl TableExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a header row has been seen so far.
    pub fn has_header(&self) -> bool {
        self.header.is_some()
    }

    /// Extract the rows of one page.
    ///
    /// Returns [`Error::Parse`] when the page's header row is ambiguous; the
    /// extractor state is left as it was before the page so the caller can
    /// keep the page as plain text and continue with the next one.
    pub fn extract_page(&mut self, page: u32, text: &str) -> Result<PageTable> {
        let mut header = self.header;
        let mut section = self.section_month;
        let mut table = PageTable::default();
        let mut free_lines: Vec<&str> = Vec::new();

        for line in text.lines() {
            if let Some(month) = section_month(line) {
                section = Some(month);
                free_lines.push(line);
                continue;
            }

            let cells = split_cells(line);
            if let Some(found) = detect_header(&cells).map_err(|message| Error::Parse {
                page,
                message: format!("{} in header {:?}", message, line.trim()),
            })? {
                header = Some(found);
                continue;
            }

            if RULE_RE.is_match(line) && line.contains(['-', '=']) {
                continue;
            }

            match header.and_then(|h| parse_row(h, &cells, section, page)) {
                Some(row) => table.rows.push(row),
                None => free_lines.push(line),
            }
        }

        self.header = header;
        self.section_month = section;
        table.free_text = free_lines.join("\n").trim().to_string();
        Ok(table)
    }
}

/// `Ok(Some)` for a header row, `Ok(None)` for any other row, `Err` when the
/// date and event keywords only resolve to the same column.
fn detect_header(cells: &[String]) -> std::result::Result<Option<Header>, String> {
    let non_empty = cells.iter().filter(|c| !c.is_empty()).count();
    if non_empty < 2 {
        return Ok(None);
    }
    // Header cells are short labels, not data.
    if cells.iter().any(|c| DIGIT_RE.is_match(c)) {
        return Ok(None);
    }

    let date_cols: Vec<usize> = (0..cells.len())
        .filter(|&i| has_keyword(&cells[i], DATE_KEYWORDS))
        .collect();
    let event_cols: Vec<usize> = (0..cells.len())
        .filter(|&i| has_keyword(&cells[i], EVENT_KEYWORDS))
        .collect();
    if date_cols.is_empty() || event_cols.is_empty() {
        return Ok(None);
    }

    for &date_col in &date_cols {
        if let Some(&event_col) = event_cols.iter().find(|&&e| e != date_col) {
            return Ok(Some(Header {
                date_col,
                event_col,
            }));
        }
    }
    Err("date and event keywords share one column".to_string())
}

fn parse_row(
    header: Header,
    cells: &[String],
    section: Option<&'static str>,
    page: u32,
) -> Option<TableRow> {
    let date_text = cells.get(header.date_col)?.trim();
    let event_text = cells.get(header.event_col)?.trim();
    if date_text.is_empty() || event_text.is_empty() || !looks_like_date(date_text) {
        return None;
    }
    let month = find_month(date_text).or(section)?;
    Some(TableRow {
        date_text: date_text.to_string(),
        event_text: event_text.to_string(),
        month: month.to_string(),
        page,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_cells_variants() {
        assert_eq!(split_cells("12 Februari 2024\tAwal kuliah"), vec!["12 Februari 2024", "Awal kuliah"]);
        assert_eq!(split_cells("| Tanggal | Kegiatan |"), vec!["Tanggal", "Kegiatan"]);
        assert_eq!(
            split_cells("1 Maret 2024     Ujian tengah semester"),
            vec!["1 Maret 2024", "Ujian tengah semester"]
        );
        assert!(split_cells("   ").is_empty());
    }

    #[test]
    fn test_extracts_rows_after_header() {
        let page = "KALENDER AKADEMIK 2023/2024\nNo  Tanggal  Kegiatan\n1  5 Februari 2024  Awal perkuliahan\n2  10 - 15 Februari 2024  Pengisian KRS";
        let mut ex = TableExtractor::new();
        let table = ex.extract_page(1, page).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].date_text, "5 Februari 2024");
        assert_eq!(table.rows[0].event_text, "Awal perkuliahan");
        assert_eq!(table.rows[1].month, "Februari");
        assert_eq!(table.free_text, "KALENDER AKADEMIK 2023/2024");
    }

    #[test]
    fn test_month_from_section_heading() {
        let page = "Tanggal | Kegiatan\nMARET 2024\n1-3 | Libur nasional\nminggu ke-2 | Evaluasi";
        let mut ex = TableExtractor::new();
        let table = ex.extract_page(1, page).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert!(table.rows.iter().all(|r| r.month == "Maret"));
    }

    #[test]
    fn test_row_without_month_kept_as_free_text() {
        let page = "Tanggal | Kegiatan\n1-3 | Libur\ncatatan | bebas";
        let mut ex = TableExtractor::new();
        let table = ex.extract_page(1, page).unwrap();
        assert!(table.rows.is_empty());
        assert!(table.free_text.contains("1-3 | Libur"));
        assert!(table.free_text.contains("catatan | bebas"));
    }

    #[test]
    fn test_header_carries_across_pages() {
        let mut ex = TableExtractor::new();
        let first = ex
            .extract_page(1, "Tanggal\tKegiatan\n2 Januari 2024\tRegistrasi")
            .unwrap();
        assert_eq!(first.rows.len(), 1);
        let second = ex.extract_page(2, "3 Januari 2024\tOrientasi").unwrap();
        assert_eq!(second.rows.len(), 1);
        assert_eq!(second.rows[0].page, 2);
    }

    #[test]
    fn test_ambiguous_header_is_parse_error() {
        let mut ex = TableExtractor::new();
        let err = ex
            .extract_page(4, "Jadwal Kegiatan | Semester")
            .unwrap_err();
        assert!(matches!(err, Error::Parse { page: 4, .. }));
        assert!(!ex.has_header());
    }

    #[test]
    fn test_no_header_means_free_text() {
        let mut ex = TableExtractor::new();
        let table = ex.extract_page(1, "5 Februari 2024  Awal perkuliahan").unwrap();
        assert!(table.rows.is_empty());
        assert_eq!(table.free_text, "5 Februari 2024  Awal perkuliahan");
    }

    #[test]
    fn test_markdown_rule_skipped() {
        let page = "| Tanggal | Kegiatan |\n|---|---|\n| 8 April 2024 | UTS |";
        let mut ex = TableExtractor::new();
        let table = ex.extract_page(1, page).unwrap();
        assert_eq!(table.rows.len(), 1);
        assert!(table.free_text.is_empty());
    }
}
