//! Calendar chunker.
//!
//! Rows recovered by the [`TableExtractor`] are grouped by month into
//! table blocks, one chunk per month (more when a month is too large).
//! Lines the extractor could not read as rows are chunked as text, split at
//! month section headings so each text chunk still knows its month.
//!
//! A block looks like:
//!
//! ```text
//! Kalender Akademik - Februari
//! | Tanggal | Kegiatan |
//! |---|---|
//! | 5 Februari 2024 | Awal perkuliahan |
//! ```

use tracing::{debug, warn};

use crate::chunk::{split_text, ChunkingParams};
use crate::dates::section_month;
use crate::models::{ChunkDraft, ChunkKind, PageRange, SourceDocument};
use crate::table::{TableExtractor, TableRow};

const TITLE_PREFIX: &str = "Kalender Akademik - ";
const HEADER_LINE: &str = "| Tanggal | Kegiatan |";
const RULE_LINE: &str = "|---|---|";

/// Calendar strategy: month table blocks first, then the remaining text.
pub fn chunk_calendar(doc: &SourceDocument, params: &ChunkingParams) -> Vec<ChunkDraft> {
    let mut extractor = TableExtractor::new();
    let mut rows: Vec<TableRow> = Vec::new();
    let mut text_drafts = Vec::new();
    let mut text_month: Option<&'static str> = None;

    for (i, page) in doc.pages.iter().enumerate() {
        let page_no = i as u32 + 1;
        let free_text = match extractor.extract_page(page_no, page) {
            Ok(table) => {
                rows.extend(table.rows);
                table.free_text
            }
            Err(err) => {
                warn!(doc_id = %doc.doc_id, error = %err, "skipping table parsing for page");
                page.clone()
            }
        };
        text_drafts.extend(chunk_calendar_text(
            &free_text,
            page_no,
            &mut text_month,
            params,
        ));
    }

    debug!(doc_id = %doc.doc_id, rows = rows.len(), "calendar rows extracted");
    let mut drafts = group_rows(rows, params);
    drafts.extend(text_drafts);
    drafts
}

/// Group rows by month, in order of first appearance, into table blocks.
pub fn group_rows(rows: Vec<TableRow>, params: &ChunkingParams) -> Vec<ChunkDraft> {
    let mut months: Vec<(String, Vec<TableRow>)> = Vec::new();
    for row in rows {
        match months.iter_mut().find(|(m, _)| *m == row.month) {
            Some((_, group)) => group.push(row),
            None => months.push((row.month.clone(), vec![row])),
        }
    }

    let mut drafts = Vec::new();
    for (month, group) in months {
        let parts = split_rows(&month, &group, params.max_chunk_size);
        let split = parts.len() > 1;
        for (i, part) in parts.into_iter().enumerate() {
            let page_range = part
                .iter()
                .map(|r| PageRange::single(r.page))
                .reduce(PageRange::union)
                .unwrap_or(PageRange::single(1));
            drafts.push(ChunkDraft {
                content: format_table_block(&month, part),
                kind: ChunkKind::CalendarTable,
                page_range,
                article_number: None,
                sub_index: split.then_some(i as u32),
                month: Some(month.clone()),
                dates: part.iter().map(|r| r.date_text.clone()).collect(),
            });
        }
    }
    drafts
}

/// Split one month's rows so that each block fits in `max_chars`. A single
/// row that alone exceeds the limit still gets its own block.
fn split_rows<'a>(month: &str, rows: &'a [TableRow], max_chars: usize) -> Vec<&'a [TableRow]> {
    let fixed = format_table_block(month, &[]).chars().count();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut size = fixed;
    for (i, row) in rows.iter().enumerate() {
        let row_len = format_row(row).chars().count() + 1;
        if i > start && size + row_len > max_chars {
            parts.push(&rows[start..i]);
            start = i;
            size = fixed;
        }
        size += row_len;
    }
    if start < rows.len() {
        parts.push(&rows[start..]);
    }
    parts
}

fn escape_cell(cell: &str) -> String {
    cell.replace('\\', "\\\\").replace('|', "\\|").replace('\n', " ")
}

fn format_row(row: &TableRow) -> String {
    format!(
        "| {} | {} |",
        escape_cell(&row.date_text),
        escape_cell(&row.event_text)
    )
}

/// Render rows of one month as a titled pipe table.
pub fn format_table_block(month: &str, rows: &[TableRow]) -> String {
    let mut out = format!("{}{}\n{}\n{}", TITLE_PREFIX, month, HEADER_LINE, RULE_LINE);
    for row in rows {
        out.push('\n');
        out.push_str(&format_row(row));
    }
    out
}

/// Split a table line at unescaped pipes, unescaping each cell.
fn split_escaped(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '|' => cells.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    cells.push(current);
    cells.into_iter().map(|c| c.trim().to_string()).collect()
}

/// Read a block produced by [`format_table_block`] back into
/// `(date, event)` cell pairs.
pub fn parse_table_block(block: &str) -> Vec<(String, String)> {
    block
        .lines()
        .skip_while(|l| l.trim() != RULE_LINE)
        .skip(1)
        .filter(|l| l.trim_start().starts_with('|'))
        .filter_map(|line| {
            let cells = split_escaped(line.trim());
            // Leading and trailing pipes leave empty edge cells.
            match cells.as_slice() {
                [_, date, event, _] => Some((date.clone(), event.clone())),
                _ => None,
            }
        })
        .collect()
}

/// Chunk calendar free text, splitting at month section headings. The
/// current month carries across pages through `month`.
pub fn chunk_calendar_text(
    text: &str,
    page: u32,
    month: &mut Option<&'static str>,
    params: &ChunkingParams,
) -> Vec<ChunkDraft> {
    let mut sections: Vec<(Option<&'static str>, String)> = vec![(*month, String::new())];
    for line in text.lines() {
        if let Some(m) = section_month(line) {
            *month = Some(m);
            sections.push((Some(m), String::new()));
        }
        if let Some((_, body)) = sections.last_mut() {
            body.push_str(line);
            body.push('\n');
        }
    }

    let mut drafts = Vec::new();
    for (section, body) in sections {
        for content in split_text(&body, params.max_chunk_size, params.overlap) {
            let mut draft = ChunkDraft::text(content, PageRange::single(page));
            draft.month = section.map(str::to_string);
            drafts.push(draft);
        }
    }
    drafts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(date: &str, event: &str, month: &str, page: u32) -> TableRow {
        TableRow {
            date_text: date.to_string(),
            event_text: event.to_string(),
            month: month.to_string(),
            page,
        }
    }

    #[test]
    fn test_groups_by_month_in_first_appearance_order() {
        let rows = vec![
            row("5 Maret 2024", "UTS", "Maret", 1),
            row("12 Februari 2024", "Kuliah", "Februari", 1),
            row("20 Maret 2024", "Libur", "Maret", 2),
        ];
        let drafts = group_rows(rows, &ChunkingParams::default());
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].month.as_deref(), Some("Maret"));
        assert_eq!(drafts[0].page_range, PageRange { start: 1, end: 2 });
        assert_eq!(drafts[0].dates, vec!["5 Maret 2024", "20 Maret 2024"]);
        assert_eq!(drafts[1].month.as_deref(), Some("Februari"));
        assert!(drafts.iter().all(|d| d.kind == ChunkKind::CalendarTable));
    }

    #[test]
    fn test_round_trip_with_escaped_pipes() {
        let rows = vec![
            row("10 - 15 Februari 2024", "Pengisian KRS | online", "Februari", 1),
            row("16 Februari 2024", r"Batas akhir \ revisi", "Februari", 1),
        ];
        let block = format_table_block("Februari", &rows);
        let parsed = parse_table_block(&block);
        let expected: Vec<(String, String)> = rows
            .iter()
            .map(|r| (r.date_text.clone(), r.event_text.clone()))
            .collect();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_oversized_month_split_with_sub_index() {
        let rows: Vec<TableRow> = (1..=28)
            .map(|d| row(&format!("{} Februari 2024", d), "Kegiatan harian mahasiswa", "Februari", 1))
            .collect();
        let params = ChunkingParams {
            max_chunk_size: 300,
            overlap: 0,
            sample_chars: 5000,
        };
        let drafts = group_rows(rows, &params);
        assert!(drafts.len() > 1);
        let total: usize = drafts.iter().map(|d| d.dates.len()).sum();
        assert_eq!(total, 28);
        for (i, d) in drafts.iter().enumerate() {
            assert_eq!(d.sub_index, Some(i as u32));
            assert!(d.content.chars().count() <= 300);
            assert!(d.content.contains(HEADER_LINE));
        }
    }

    #[test]
    fn test_text_sections_carry_month() {
        let mut month = None;
        let text = "Pengantar kalender.\nFEBRUARI 2024\n5 Februari 2024 Awal kuliah\nMARET 2024\n1 Maret 2024 UTS";
        let drafts = chunk_calendar_text(text, 1, &mut month, &ChunkingParams::default());
        assert_eq!(drafts.len(), 3);
        assert_eq!(drafts[0].month, None);
        assert_eq!(drafts[1].month.as_deref(), Some("Februari"));
        assert!(drafts[1].content.starts_with("FEBRUARI 2024"));
        assert_eq!(drafts[2].month.as_deref(), Some("Maret"));
        assert_eq!(month, Some("Maret"));

        let next = chunk_calendar_text("lanjutan UTS", 2, &mut month, &ChunkingParams::default());
        assert_eq!(next[0].month.as_deref(), Some("Maret"));
    }

    #[test]
    fn test_extractor_to_block_round_trip() {
        let doc = SourceDocument::new(
            "kalender-akademik.pdf",
            vec!["Tanggal\tKegiatan\n5 Februari 2024\tAwal perkuliahan\n10 - 15 Februari 2024\tPengisian KRS".to_string()],
        );
        let drafts = chunk_calendar(&doc, &ChunkingParams::default());
        assert_eq!(drafts.len(), 1);
        let parsed = parse_table_block(&drafts[0].content);
        assert_eq!(
            parsed,
            vec![
                ("5 Februari 2024".to_string(), "Awal perkuliahan".to_string()),
                ("10 - 15 Februari 2024".to_string(), "Pengisian KRS".to_string()),
            ]
        );
    }

    #[test]
    fn test_unparseable_page_kept_as_text() {
        let doc = SourceDocument::new(
            "kalender.pdf",
            vec!["Jadwal Kegiatan | Semester\n5 Februari 2024 | Awal".to_string()],
        );
        let drafts = chunk_calendar(&doc, &ChunkingParams::default());
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].kind, ChunkKind::Text);
        assert!(drafts[0].content.contains("Awal"));
    }
}
