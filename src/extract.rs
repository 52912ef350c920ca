//! Document discovery and page text extraction.
//!
//! PDFs are read page by page with `pdf-extract`. Plain-text and Markdown
//! files are split into pages at form feeds (`\x0c`), the page break that
//! `pdftotext` and similar tools emit; a file without form feeds is one page.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use academic_rag_core::models::SourceDocument;

const FORM_FEED: char = '\x0c';

/// A file selected for ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFile {
    pub path: PathBuf,
    /// Path relative to the documents root with `/` separators; used as `doc_id`.
    pub doc_id: String,
}

/// Walk `root` and return every file matching `include_globs` and none of
/// `exclude_globs`, sorted by `doc_id`.
pub fn scan_documents(
    root: &Path,
    include_globs: &[String],
    exclude_globs: &[String],
) -> Result<Vec<DocumentFile>> {
    if !root.is_dir() {
        bail!("Documents directory does not exist: {}", root.display());
    }

    let include_set = build_globset(include_globs)?;
    let mut excludes = vec!["**/.git/**".to_string()];
    excludes.extend(exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let doc_id = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if exclude_set.is_match(&doc_id) || !include_set.is_match(&doc_id) {
            continue;
        }
        files.push(DocumentFile {
            path: path.to_path_buf(),
            doc_id,
        });
    }

    files.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Read a file into a [`SourceDocument`], one entry per page.
pub fn load_document(path: &Path, doc_id: &str) -> Result<SourceDocument> {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let pages = match extension.as_str() {
        "pdf" => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            extract_pdf_pages(&bytes)
                .with_context(|| format!("PDF extraction failed for {}", path.display()))?
        }
        "txt" | "md" => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            split_pages(&text)
        }
        other => bail!("Unsupported document type '.{}': {}", other, path.display()),
    };

    Ok(SourceDocument::new(doc_id, pages))
}

fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<String>> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)?;
    Ok(pages.into_iter().map(|p| normalize_page(&p)).collect())
}

/// Split text at form feeds. A trailing form feed does not add an empty page.
pub fn split_pages(text: &str) -> Vec<String> {
    let mut pages: Vec<String> = text.split(FORM_FEED).map(normalize_page).collect();
    if pages.len() > 1 && pages.last().is_some_and(|p| p.is_empty()) {
        pages.pop();
    }
    pages
}

fn normalize_page(page: &str) -> String {
    page.replace("\r\n", "\n").trim_matches('\n').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_split_pages() {
        assert_eq!(split_pages("satu\x0cdua\x0c"), vec!["satu", "dua"]);
        assert_eq!(split_pages("tanpa halaman"), vec!["tanpa halaman"]);
        assert_eq!(split_pages("a\r\nb"), vec!["a\nb"]);
    }

    #[test]
    fn test_scan_documents_applies_globs() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("2024")).unwrap();
        std::fs::write(root.join("peraturan.txt"), "Pasal 1").unwrap();
        std::fs::write(root.join("2024/kalender.md"), "Januari").unwrap();
        std::fs::write(root.join("gambar.png"), [0u8; 4]).unwrap();
        std::fs::write(root.join("draft.txt"), "x").unwrap();

        let files = scan_documents(
            root,
            &["**/*.txt".to_string(), "**/*.md".to_string()],
            &["draft.txt".to_string()],
        )
        .unwrap();
        let ids: Vec<&str> = files.iter().map(|f| f.doc_id.as_str()).collect();
        assert_eq!(ids, vec!["2024/kalender.md", "peraturan.txt"]);
    }

    #[test]
    fn test_scan_missing_dir() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        assert!(scan_documents(&missing, &["**/*".to_string()], &[]).is_err());
    }

    #[test]
    fn test_load_text_document() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("peraturan.txt");
        std::fs::write(&path, "Halaman satu\x0cHalaman dua").unwrap();
        let doc = load_document(&path, "peraturan.txt").unwrap();
        assert_eq!(doc.doc_id, "peraturan.txt");
        assert_eq!(doc.pages, vec!["Halaman satu", "Halaman dua"]);
    }

    #[test]
    fn test_load_unsupported() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("x.docx");
        std::fs::write(&path, "x").unwrap();
        assert!(load_document(&path, "x.docx").is_err());
    }
}
